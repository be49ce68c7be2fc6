use anyhow::{Context, Result, anyhow};
use log::trace;
use regex::Regex;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time;

use crate::browser::browser_config::BrowserConfig;

/// How long the browser gets to print its DevTools endpoint.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn ws_url_regex() -> Result<Regex> {
    Ok(Regex::new(r"listening on (.*/devtools/browser/.*)$")?)
}

pub(crate) fn spawn_chrome_process(config: &BrowserConfig) -> Result<Child> {
    #[cfg(windows)]
    let mut cmd = {
        use std::os::windows::process::CommandExt;
        let mut c = Command::new(&config.executable_path);
        c.creation_flags(0x08000000); // CREATE_NO_WINDOW
        c
    };
    #[cfg(not(windows))]
    let mut cmd = Command::new(&config.executable_path);

    cmd.args(config.get_browser_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| {
            format!(
                "Failed to launch browser at {}",
                config.executable_path.display()
            )
        })
}

/// Extracts the DevTools WebSocket URL from one line of browser stderr.
pub(crate) fn parse_ws_url(re: &Regex, line: &str) -> Option<String> {
    re.captures(line.trim_end())
        .map(|cap| cap[1].to_string())
}

/// Reads browser stderr until the WebSocket debugging URL shows up.
///
/// The reader thread keeps draining stderr afterwards so the browser never
/// blocks on a full pipe.
pub(crate) async fn get_websocket_url(stderr: ChildStderr) -> Result<String> {
    let re = ws_url_regex()?;
    let (tx, rx) = oneshot::channel::<Result<String>>();

    std::thread::spawn(move || {
        let mut tx = Some(tx);
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            trace!("browser: {}", line);
            if let Some(url) = parse_ws_url(&re, &line)
                && let Some(tx) = tx.take()
            {
                let _ = tx.send(Ok(url));
            }
        }
        if let Some(tx) = tx.take() {
            let _ = tx.send(Err(anyhow!(
                "Browser exited before printing its DevTools URL"
            )));
        }
    });

    time::timeout(LAUNCH_TIMEOUT, rx)
        .await
        .map_err(|_| anyhow!("Timeout waiting for the browser DevTools URL"))?
        .map_err(|_| anyhow!("Browser stderr reader stopped"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_devtools_url() {
        let re = ws_url_regex().unwrap();
        let line = "DevTools listening on ws://127.0.0.1:8123/devtools/browser/3f1c-aa\n";
        assert_eq!(
            parse_ws_url(&re, line).as_deref(),
            Some("ws://127.0.0.1:8123/devtools/browser/3f1c-aa")
        );
    }

    #[test]
    fn ignores_other_output() {
        let re = ws_url_regex().unwrap();
        assert_eq!(
            parse_ws_url(&re, "[0101/000000.000:ERROR:bus.cc(407)] Failed to connect to the bus"),
            None
        );
        assert_eq!(parse_ws_url(&re, ""), None);
    }
}
