/*!
Capture full-page screenshots of web pages with headless Chrome, driven over
the Chrome DevTools Protocol (CDP).

```no_run
# async fn demo() -> anyhow::Result<()> {
use cdp_page_shot::{Browser, CaptureOptions};

let browser = Browser::new().await?;
let base64_png = browser
    .capture_url("https://www.rust-lang.org/", CaptureOptions::new().with_full_page(true))
    .await?;
browser.close_async().await?;
# let _ = base64_png;
# Ok(())
# }
```
*/

pub mod capture;

mod browser;
mod exit_hook;
mod tab;
mod transport;
mod types;
mod utils;

pub use browser::{Browser, BrowserBuilder};
pub use exit_hook::{ExitHook, INTERRUPTED_EXIT_CODE};
pub use tab::{LayoutMetrics, NAVIGATION_TIMEOUT, Tab};
pub use types::{CaptureOptions, ClipRegion, ImageFormat};
