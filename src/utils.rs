use crate::transport::{TargetMessage, Transport, TransportResponse, cdp_error_message, next_id};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Parses the contained JSON message string from a `TargetMessage`.
///
/// A CDP error reply inside the envelope becomes an `Err`.
pub(crate) fn serde_msg(msg: &TargetMessage) -> Result<Value> {
    let str_msg = msg.params["message"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid message format"))?;
    let value: Value = serde_json::from_str(str_msg)?;
    if let Some(err) = value.get("error") {
        return Err(anyhow!("CDP error: {}", cdp_error_message(err)));
    }
    Ok(value)
}

/// Sends a message to a target and waits up to `timeout` for the corresponding response.
pub(crate) async fn send_and_get_msg(
    transport: Arc<Transport>,
    msg_id: usize,
    session_id: &str,
    msg: String,
    timeout: Duration,
) -> Result<TargetMessage> {
    let reply_rx = transport.listen_target_msg(msg_id).await?;

    transport
        .send(json!({
            "id": next_id(),
            "method": "Target.sendMessageToTarget",
            "params": { "sessionId": session_id, "message": msg }
        }))
        .await?;

    let target_msg = time::timeout(timeout, reply_rx)
        .await
        .map_err(|_| anyhow!("Timeout waiting for target message"))?
        .map_err(|_| anyhow!("Response channel closed"))??;

    match target_msg {
        TransportResponse::Target(res) => Ok(res),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_msg_unwraps_inner_json() {
        let msg = TargetMessage {
            params: json!({ "message": r#"{"id":3,"result":{"frameId":"F1"}}"# }),
        };
        let value = serde_msg(&msg).unwrap();
        assert_eq!(value["result"]["frameId"], "F1");
    }

    #[test]
    fn serde_msg_surfaces_cdp_errors() {
        let msg = TargetMessage {
            params: json!({ "message": r#"{"id":3,"error":{"code":-32000,"message":"Cannot navigate to invalid URL"}}"# }),
        };
        let err = serde_msg(&msg).unwrap_err();
        assert!(err.to_string().contains("Cannot navigate to invalid URL"));
    }

    #[test]
    fn serde_msg_rejects_missing_payload() {
        let msg = TargetMessage { params: json!({}) };
        assert!(serde_msg(&msg).is_err());
    }
}
