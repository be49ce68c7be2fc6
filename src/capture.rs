//! The capture command: one URL in, one full-page image out.

use anyhow::{Context, Result};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use log::{debug, warn};
use std::path::Path;

use crate::browser::Browser;
use crate::types::CaptureOptions;

/// Launches a headless browser, renders `url` once its network is idle and
/// writes a full-page screenshot to `output`.
///
/// The browser is shut down on every path. Errors from navigation, capture or
/// the file write are returned unchanged after shutdown.
pub async fn run(url: &str, output: &Path) -> Result<()> {
    let browser = Browser::new().await?;
    capture_with(&browser, url, output).await
}

/// Same as [`run`] with an already launched browser, which is closed afterwards.
pub async fn capture_with(browser: &Browser, url: &str, output: &Path) -> Result<()> {
    let hook = browser.exit_hook();
    if let Err(e) = hook.register() {
        warn!("{:?}", e);
    }

    let result = async {
        let options = CaptureOptions::for_output(output);
        debug!("Capturing {} as {}", url, options.format().as_str());

        let data = browser.capture_url(url, options).await?;
        write_image(output, &data).await
    }
    .await;

    if let Err(e) = browser.close_async().await {
        warn!("Failed to close browser: {:?}", e);
    }
    drop(hook);

    result
}

/// Decodes a base64 screenshot and writes it to `output`, replacing any existing file.
pub async fn write_image(output: &Path, data: &str) -> Result<()> {
    let bytes = BASE64_STANDARD
        .decode(data)
        .context("Screenshot data is not valid base64")?;
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    debug!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}
