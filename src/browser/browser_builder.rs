use anyhow::Result;
use std::path::PathBuf;

use crate::browser::Browser;
use crate::browser::browser_config::BrowserConfig;

/// Builder for launching a [`Browser`].
#[derive(Debug, Clone)]
pub struct BrowserBuilder {
    headless: bool,
    executable: Option<PathBuf>,
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
        }
    }
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Use this browser binary instead of auto-detecting one.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub async fn build(self) -> Result<Browser> {
        let mut config = match self.executable {
            Some(path) => BrowserConfig::with_executable(path)?,
            None => BrowserConfig::new()?,
        };
        config.headless = self.headless;

        Browser::create_browser(config).await
    }
}
