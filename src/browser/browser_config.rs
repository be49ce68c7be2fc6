use anyhow::{Context, Result, anyhow};
use rand::prelude::SliceRandom;
use std::net;
use std::path::{Path, PathBuf};
use which::which;

#[cfg(windows)]
use winreg::{RegKey, enums::HKEY_LOCAL_MACHINE};

use crate::browser::temp_dir::CustomTempDir;

/// Where Alpine's chromium package installs the browser.
const SYSTEM_CHROMIUM: &str = "/usr/bin/chromium-browser";

static DEFAULT_ARGS: [&str; 19] = [
    // Containers usually lack the privileges the sandbox needs.
    "--no-sandbox",
    "--no-zygote",
    "--disable-dev-shm-usage",
    // No hardware acceleration; render in software.
    "--disable-gpu",
    "--use-gl=swiftshader",
    "--force-color-profile=srgb",
    "--disable-features=Translate,OptimizationHints,MediaRouter,DialMediaRouteProvider",
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-domain-reliability",
    "--disable-breakpad",
    "--disable-sync",
    "--hide-scrollbars",
    "--mute-audio",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-pings",
    "--metrics-recording-only",
    "--window-size=1200,1600",
];

#[derive(Debug)]
pub(crate) struct BrowserConfig {
    debug_port: u16,
    pub(crate) headless: bool,
    pub(crate) temp_dir: CustomTempDir,
    pub(crate) executable_path: PathBuf,
}

impl BrowserConfig {
    pub(crate) fn new() -> Result<Self> {
        Self::with_executable(default_executable()?)
    }

    pub(crate) fn with_executable(executable_path: PathBuf) -> Result<Self> {
        Self::with_profile_root(executable_path, std::env::temp_dir())
    }

    /// Like `with_executable`, with the user-data dir created under `root`.
    pub(crate) fn with_profile_root(executable_path: PathBuf, root: PathBuf) -> Result<Self> {
        Ok(Self {
            headless: true,
            executable_path,
            debug_port: get_available_port().context("Failed to get available port")?,
            temp_dir: CustomTempDir::new(root, "cdp-page-shot")
                .context("Failed to create custom temporary directory")?,
        })
    }

    pub(crate) fn get_browser_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.debug_port),
            format!("--user-data-dir={}", self.temp_dir.path().display()),
        ];

        args.extend(DEFAULT_ARGS.iter().map(|s| s.to_string()));
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.push("about:blank".to_string());

        args
    }
}

pub(crate) fn default_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME")
        && Path::new(&path).exists()
    {
        return Ok(path.into());
    }

    if Path::new(SYSTEM_CHROMIUM).exists() {
        return Ok(SYSTEM_CHROMIUM.into());
    }

    let apps = [
        "chromium-browser",
        "chromium",
        "google-chrome-stable",
        "google-chrome",
        "google-chrome-beta",
        "google-chrome-dev",
        "google-chrome-unstable",
        "microsoft-edge-stable",
        "microsoft-edge",
        "chrome",
        "msedge",
    ];
    for app in apps {
        if let Ok(path) = which(app) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "macos")]
    {
        let macos_apps = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];
        for path in macos_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(path) = get_chrome_path_from_registry().filter(|p| p.exists()) {
            return Ok(path);
        }

        let windows_apps = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for path in windows_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    Err(anyhow!(
        "Could not auto detect a chrome executable. Set the CHROME env var."
    ))
}

#[cfg(windows)]
fn get_chrome_path_from_registry() -> Option<PathBuf> {
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey("SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\App Paths\\chrome.exe")
        .and_then(|key| key.get_value::<String, _>(""))
        .map(PathBuf::from)
        .ok()
}

fn get_available_port() -> Option<u16> {
    let mut ports: Vec<u16> = (8000..9000).collect();
    ports.shuffle(&mut rand::thread_rng());
    ports.iter().find(|port| port_is_available(**port)).copied()
}

fn port_is_available(port: u16) -> bool {
    net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}
