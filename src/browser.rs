mod browser_builder;
mod browser_config;
mod browser_utils;
mod temp_dir;

use anyhow::{Context, Result, anyhow};
use browser_config::BrowserConfig;
use log::{debug, warn};
use std::path::Path;
use std::process::Child;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use temp_dir::CustomTempDir;
use tokio::time::{self, Instant};

pub use browser_builder::BrowserBuilder;

use crate::exit_hook::ExitHook;
use crate::tab::Tab;
use crate::transport::Transport;
use crate::types::CaptureOptions;

/// How long `close_async` lets the browser exit on its own before killing it.
const GRACEFUL_EXIT: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct Process {
    child: Child,
    _temp_dir: CustomTempDir,
}

type ProcessSlot = Arc<Mutex<Option<Process>>>;

/// Kills and reaps the browser held in `slot`, if it is still there.
///
/// Returns `false` when another path already released it.
fn release_process(slot: &Mutex<Option<Process>>) -> Result<bool> {
    let mut guard = slot
        .lock()
        .map_err(|_| anyhow!("Failed to lock browser process"))?;

    let Some(mut process) = guard.take() else {
        return Ok(false);
    };

    if process
        .child
        .try_wait()
        .context("Failed to poll browser process")?
        .is_none()
    {
        process
            .child
            .kill()
            .context("Failed to kill browser process")?;
    }
    process
        .child
        .wait()
        .context("Failed to wait for browser process exit")?;
    debug!("Browser process {} released", process.child.id());

    // `_temp_dir` is dropped here, after the process is gone.
    Ok(true)
}

/// A browser instance.
///
/// The browser process is killed when the instance is closed or dropped,
/// whichever comes first.
#[derive(Debug)]
pub struct Browser {
    transport: Arc<Transport>,
    process: ProcessSlot,
}

impl Browser {
    /// Create a new browser instance with default configuration (headless).
    pub async fn new() -> Result<Self> {
        BrowserBuilder::new().build().await
    }

    /// Create a new browser instance with a visible window.
    pub async fn new_with_head() -> Result<Self> {
        BrowserBuilder::new().headless(false).build().await
    }

    /// Create a new headless browser instance from a specific executable.
    pub async fn new_with_path(path: impl AsRef<Path>) -> Result<Self> {
        BrowserBuilder::new()
            .executable(path.as_ref())
            .build()
            .await
    }

    /// Create browser instance with custom configuration.
    pub(crate) async fn create_browser(config: BrowserConfig) -> Result<Self> {
        debug!(
            "Launching {} (headless: {})",
            config.executable_path.display(),
            config.headless
        );

        let mut child = browser_utils::spawn_chrome_process(&config)?;
        let stderr = child
            .stderr
            .take()
            .context("Failed to get stderr from Chrome process")?;

        let process: ProcessSlot = Arc::new(Mutex::new(Some(Process {
            child,
            _temp_dir: config.temp_dir,
        })));

        // From here on the process is owned by `process`; any early return kills it.
        let connect = async {
            let ws_url = browser_utils::get_websocket_url(stderr).await?;
            debug!("DevTools endpoint {}", ws_url);
            Transport::new(&ws_url).await
        };

        match connect.await {
            Ok(transport) => Ok(Self {
                transport: Arc::new(transport),
                process,
            }),
            Err(e) => {
                if let Err(release_err) = release_process(&process) {
                    warn!("Failed to release browser after launch error: {:?}", release_err);
                }
                Err(e)
            }
        }
    }

    /// Opens a new blank tab.
    pub async fn new_tab(&self) -> Result<Tab> {
        Tab::new(self.transport.clone()).await
    }

    /// Opens a tab, loads `url` until the network is idle and screenshots it.
    ///
    /// Returns the base64 encoded image. The tab is closed on every path.
    pub async fn capture_url(&self, url: &str, options: CaptureOptions) -> Result<String> {
        let tab = self.new_tab().await?;

        let result = async {
            tab.goto(url).await?;
            tab.screenshot(options).await
        }
        .await;

        if let Err(e) = tab.close().await {
            warn!("Failed to close tab after capture: {:?}", e);
        }

        result
    }

    /// A Ctrl+C hook that releases this browser's process.
    pub fn exit_hook(&self) -> ExitHook {
        let process = self.process.clone();
        ExitHook::new(move || {
            if let Err(e) = release_process(&process) {
                warn!("Failed to release browser on exit: {:?}", e);
            }
        })
    }

    /// Close the browser, giving it a moment to exit before it is killed.
    pub async fn close_async(&self) -> Result<()> {
        self.transport.shutdown();

        let deadline = Instant::now() + GRACEFUL_EXIT;
        while Instant::now() < deadline {
            let exited = {
                let mut guard = self
                    .process
                    .lock()
                    .map_err(|_| anyhow!("Failed to lock browser process"))?;
                match guard.as_mut() {
                    Some(process) => process.child.try_wait()?.is_some(),
                    None => true,
                }
            };
            if exited {
                break;
            }
            time::sleep(Duration::from_millis(50)).await;
        }

        release_process(&self.process)?;
        Ok(())
    }

    /**
    Close the browser.
    */
    pub fn close(&self) -> Result<()> {
        // 1. Shutdown Transport
        self.transport.shutdown();

        // 2. Kill Process
        release_process(&self.process)?;

        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if let Err(e) = self.close()
            && !e.to_string().contains("Failed to lock")
        {
            warn!("Error closing browser in Drop: {:?}", e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    fn process(base: &Path, program: &str, args: &[&str]) -> Process {
        Process {
            child: Command::new(program).args(args).spawn().unwrap(),
            _temp_dir: CustomTempDir::new(base.to_path_buf(), "cdp-page-shot").unwrap(),
        }
    }

    #[test]
    fn release_kills_once() {
        let base = tempfile::tempdir().unwrap();
        let slot = Mutex::new(Some(process(base.path(), "sleep", &["30"])));

        assert!(release_process(&slot).unwrap());
        assert!(slot.lock().unwrap().is_none());
        assert!(!release_process(&slot).unwrap());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn release_reaps_already_exited_process() {
        let base = tempfile::tempdir().unwrap();
        let mut exited = process(base.path(), "true", &[]);
        exited.child.wait().unwrap();

        let slot = Mutex::new(Some(exited));
        assert!(release_process(&slot).unwrap());
    }

    #[test]
    fn exit_hook_releases_through_shared_slot() {
        let base = tempfile::tempdir().unwrap();
        let slot: ProcessSlot = Arc::new(Mutex::new(Some(process(base.path(), "sleep", &["30"]))));

        let hook_slot = slot.clone();
        let hook = ExitHook::new(move || {
            let _ = release_process(&hook_slot);
        });
        drop(hook);

        assert!(slot.lock().unwrap().is_none());
    }

    /// Writes an executable shell script standing in for the browser binary.
    fn fake_browser(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-chrome");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn pid_is_alive(pid: &str) -> bool {
        Command::new("kill")
            .args(["-0", pid])
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn launch_fails(script_body: &str) -> (anyhow::Error, String) {
        let bin_dir = tempfile::tempdir().unwrap();
        let profiles = tempfile::tempdir().unwrap();
        let pid_file = bin_dir.path().join("pid");
        let body = format!("echo $$ > {}\n{}", pid_file.display(), script_body);
        let exe = fake_browser(bin_dir.path(), &body);

        let config =
            BrowserConfig::with_profile_root(exe, profiles.path().to_path_buf()).unwrap();
        let err = Browser::create_browser(config).await.unwrap_err();

        assert_eq!(std::fs::read_dir(profiles.path()).unwrap().count(), 0);
        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        (err, pid)
    }

    #[tokio::test]
    async fn browser_exiting_without_devtools_url_fails_launch() {
        let (err, pid) = launch_fails("echo 'some unrelated output' >&2\nexit 0").await;

        assert!(err.to_string().contains("DevTools URL"));
        assert!(!pid_is_alive(&pid));
    }

    #[tokio::test]
    async fn unreachable_devtools_endpoint_kills_running_browser() {
        let (_err, pid) = launch_fails(
            "echo 'DevTools listening on ws://127.0.0.1:1/devtools/browser/gone' >&2\nexec sleep 30",
        )
        .await;

        assert!(!pid_is_alive(&pid));
    }
}
