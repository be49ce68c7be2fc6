use crate::transport::{DEFAULT_TIMEOUT, Transport, TransportResponse, next_id};
use crate::types::{CaptureOptions, ClipRegion};
use crate::utils::{self, send_and_get_msg};
use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};

/// How long a navigation may take to reach network idle.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

const NETWORK_IDLE: &str = "networkIdle";

/// Represents a CDP browser tab (target) session.
pub struct Tab {
    pub(crate) transport: Arc<Transport>,
    pub(crate) session_id: String,
    pub(crate) target_id: String,
}

/// CSS size of the rendered document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    pub content_width: f64,
    pub content_height: f64,
}

impl LayoutMetrics {
    /// Reads the document size out of a `Page.getLayoutMetrics` result.
    ///
    /// Prefers `cssContentSize`; older browsers only report `contentSize`.
    pub(crate) fn from_result(result: &Value) -> Result<Self> {
        let size = result
            .get("cssContentSize")
            .or_else(|| result.get("contentSize"))
            .context("No content size in layout metrics")?;

        Ok(Self {
            content_width: size["width"].as_f64().context("No content width")?,
            content_height: size["height"].as_f64().context("No content height")?,
        })
    }
}

/// Whether a `Page.lifecycleEvent` marks network idle for the given navigation.
pub(crate) fn is_network_idle(params: &Value, frame_id: &str, loader_id: &str) -> bool {
    params["name"].as_str() == Some(NETWORK_IDLE)
        && params["frameId"].as_str() == Some(frame_id)
        && params["loaderId"].as_str() == Some(loader_id)
}

impl Tab {
    /// Creates a new blank tab and attaches to it.
    pub(crate) async fn new(transport: Arc<Transport>) -> Result<Self> {
        let TransportResponse::Response(res_create) = transport
            .send(json!({ "id": next_id(), "method": "Target.createTarget", "params": { "url": "about:blank" } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let target_id = res_create.result["targetId"]
            .as_str()
            .context("No targetId")?
            .to_string();

        let TransportResponse::Response(res_attach) = transport
            .send(json!({ "id": next_id(), "method": "Target.attachToTarget", "params": { "targetId": target_id } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let session_id = res_attach.result["sessionId"]
            .as_str()
            .context("No sessionId")?
            .to_string();

        debug!("Attached to target {} (session {})", target_id, session_id);

        Ok(Self {
            transport,
            session_id,
            target_id,
        })
    }

    pub(crate) async fn send_cmd(&self, method: &str, params: Value) -> Result<Value> {
        self.send_cmd_with_timeout(method, params, DEFAULT_TIMEOUT)
            .await
    }

    pub(crate) async fn send_cmd_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let msg_id = next_id();
        let msg = json!({
            "id": msg_id,
            "method": method,
            "params": params
        })
        .to_string();
        let res = send_and_get_msg(
            self.transport.clone(),
            msg_id,
            &self.session_id,
            msg,
            timeout,
        )
        .await?;
        utils::serde_msg(&res)
    }

    /// Navigates to `url` and waits until the page's network has been idle.
    ///
    /// Fails if the browser reports a navigation error or if the page does not
    /// settle within [`NAVIGATION_TIMEOUT`].
    pub async fn goto(&self, url: &str) -> Result<&Self> {
        let deadline = Instant::now() + NAVIGATION_TIMEOUT;

        self.send_cmd("Page.enable", json!({})).await?;
        self.send_cmd("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
            .await?;

        // Subscribe BEFORE navigating so no lifecycle event is missed.
        let mut events = self
            .transport
            .subscribe(&self.session_id, "Page.lifecycleEvent")
            .await?;

        debug!("Navigating to {}", url);
        let nav = self
            .send_cmd_with_timeout("Page.navigate", json!({ "url": url }), NAVIGATION_TIMEOUT)
            .await?;

        if let Some(error_text) = nav["result"]["errorText"].as_str() {
            bail!("Navigation to {} failed: {}", url, error_text);
        }

        let frame_id = nav["result"]["frameId"]
            .as_str()
            .context("No frameId in navigation result")?
            .to_string();

        // Same-document navigations have no loader and fire no lifecycle events.
        let Some(loader_id) = nav["result"]["loaderId"].as_str() else {
            return Ok(self);
        };

        time::timeout_at(deadline, async {
            while let Some(params) = events.recv().await {
                if is_network_idle(&params, &frame_id, loader_id) {
                    return Ok(());
                }
            }
            Err(anyhow!("Event channel closed"))
        })
        .await
        .map_err(|_| {
            anyhow!(
                "Navigation timeout of {} ms exceeded waiting for network idle",
                NAVIGATION_TIMEOUT.as_millis()
            )
        })??;

        debug!("Network idle on {}", url);
        Ok(self)
    }

    /// Returns the CSS size of the current document.
    pub async fn layout_metrics(&self) -> Result<LayoutMetrics> {
        let res = self.send_cmd("Page.getLayoutMetrics", json!({})).await?;
        LayoutMetrics::from_result(&res["result"])
    }

    /// Captures the page and returns the base64 encoded image.
    pub async fn screenshot(&self, opts: CaptureOptions) -> Result<String> {
        let mut params = json!({
            "format": opts.format.as_str(),
            "fromSurface": true,
            "captureBeyondViewport": opts.full_page,
        });

        if opts.format.is_lossy() {
            params["quality"] = json!(opts.quality.unwrap_or(90));
        }

        if opts.full_page {
            let metrics = self.layout_metrics().await?;
            let clip =
                ClipRegion::full_document(metrics.content_width, metrics.content_height);
            debug!("Full page clip {}x{}", clip.width, clip.height);
            params["clip"] = json!({
                "x": clip.x,
                "y": clip.y,
                "width": clip.width,
                "height": clip.height,
                "scale": clip.scale
            });
        }

        self.activate().await?;

        let result = self
            .send_cmd_with_timeout("Page.captureScreenshot", params, NAVIGATION_TIMEOUT)
            .await?;

        result["result"]["data"]
            .as_str()
            .map(|s| s.to_string())
            .context("No image data received")
    }

    /// Activates the target tab to bring it to the foreground.
    pub async fn activate(&self) -> Result<&Self> {
        self.send_cmd(
            "Target.activateTarget",
            json!({ "targetId": self.target_id }),
        )
        .await?;
        Ok(self)
    }

    /// Closes the target tab.
    pub async fn close(&self) -> Result<()> {
        self.send_cmd("Target.closeTarget", json!({ "targetId": self.target_id }))
            .await?;
        Ok(())
    }
}
