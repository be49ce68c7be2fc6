use anyhow::{Result, anyhow};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default time to wait for a reply to a single command.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Global atomic ID counter for generating unique message IDs.
pub(crate) static GLOBAL_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a unique incremental ID for request messages.
pub(crate) fn next_id() -> usize {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

/// Messages sent to the transport actor.
#[derive(Debug)]
pub(crate) enum TransportMessage {
    /// A request command with a response sender.
    Request(Value, oneshot::Sender<Result<TransportResponse>>),
    /// Listener for target messages with given ID.
    ListenTargetMessage(u64, oneshot::Sender<Result<TransportResponse>>),
    /// Stream every event `method` emitted by the session `session_id`.
    Subscribe {
        session_id: String,
        method: String,
        tx: mpsc::UnboundedSender<Value>,
    },
    /// Command to shut down the transport.
    Shutdown,
}

/// Responses produced by the transport actor.
#[derive(Debug)]
pub(crate) enum TransportResponse {
    Response(Response),
    Target(TargetMessage),
}

/// Represents a generic CDP response.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) result: Value,
    #[serde(default)]
    pub(crate) error: Option<Value>,
}

/// Represents messages sent from targets (such as received target messages).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TargetMessage {
    pub(crate) params: Value,
}

/// What an inner target message turned out to be once unwrapped.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    /// Reply to the inner command with this id.
    Reply(u64),
    /// Event `method` from session `session_id`, with its params.
    Event {
        session_id: String,
        method: String,
        params: Value,
    },
    Unknown,
}

/// Classifies the payload of a `Target.receivedMessageFromTarget` notification.
pub(crate) fn classify_target_message(msg: &TargetMessage) -> Inbound {
    let Some(inner) = msg
        .params
        .get("message")
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
    else {
        return Inbound::Unknown;
    };

    if let Some(id) = inner.get("id").and_then(|i| i.as_u64()) {
        return Inbound::Reply(id);
    }

    match (
        msg.params.get("sessionId").and_then(|s| s.as_str()),
        inner.get("method").and_then(|m| m.as_str()),
    ) {
        (Some(session_id), Some(method)) => Inbound::Event {
            session_id: session_id.to_string(),
            method: method.to_string(),
            params: inner.get("params").cloned().unwrap_or(Value::Null),
        },
        _ => Inbound::Unknown,
    }
}

/// Internal transport actor managing WebSocket communication and request-response handling.
struct TransportActor {
    pending_requests: HashMap<u64, oneshot::Sender<Result<TransportResponse>>>,
    subscribers: HashMap<(String, String), Vec<mpsc::UnboundedSender<Value>>>,
    ws_sink: SplitSink<WsStream, Message>,
    command_rx: mpsc::Receiver<TransportMessage>,
}

impl TransportActor {
    /// Event loop handling incoming/outgoing WebSocket messages and commands.
    async fn run(mut self, mut ws_stream: SplitStream<WsStream>) {
        loop {
            tokio::select! {
                msg = ws_stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                            debug!("CDP socket closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                Some(msg) = self.command_rx.recv() => {
                    match msg {
                        TransportMessage::Request(cmd, tx) => {
                            if let Some(id) = cmd["id"].as_u64()
                                && let Ok(text) = serde_json::to_string(&cmd)
                            {
                                trace!("-> {}", text);
                                if self.ws_sink.send(Message::Text(text)).await.is_ok() {
                                    self.pending_requests.insert(id, tx);
                                } else {
                                    let _ = tx.send(Err(anyhow!("WebSocket send failed")));
                                }
                            }
                        }
                        TransportMessage::ListenTargetMessage(id, tx) => {
                            self.pending_requests.insert(id, tx);
                        }
                        TransportMessage::Subscribe { session_id, method, tx } => {
                            self.subscribers.entry((session_id, method)).or_default().push(tx);
                        }
                        TransportMessage::Shutdown => {
                            let _ = self.ws_sink.send(Message::Text(json!({
                                "id": next_id(),
                                "method": "Browser.close",
                                "params": {}
                            }).to_string())).await;
                            let _ = self.ws_sink.close().await;
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        trace!("<- {}", text);
        if let Ok(response) = serde_json::from_str::<Response>(text) {
            if let Some(sender) = self.pending_requests.remove(&response.id) {
                let reply = match &response.error {
                    Some(err) => Err(anyhow!("CDP error: {}", cdp_error_message(err))),
                    None => Ok(TransportResponse::Response(response)),
                };
                let _ = sender.send(reply);
            }
        } else if let Ok(target_msg) = serde_json::from_str::<TargetMessage>(text) {
            // Handle "Target.receivedMessageFromTarget" notifications.
            match classify_target_message(&target_msg) {
                Inbound::Reply(id) => {
                    if let Some(sender) = self.pending_requests.remove(&id) {
                        let _ = sender.send(Ok(TransportResponse::Target(target_msg)));
                    }
                }
                Inbound::Event {
                    session_id,
                    method,
                    params,
                } => {
                    if let Some(subs) = self.subscribers.get_mut(&(session_id, method)) {
                        subs.retain(|tx| tx.send(params.clone()).is_ok());
                    }
                }
                Inbound::Unknown => {}
            }
        }
    }
}

/// Extracts a readable message from a CDP `error` object.
pub(crate) fn cdp_error_message(err: &Value) -> String {
    match err.get("message").and_then(|m| m.as_str()) {
        Some(msg) => match err.get("data").and_then(|d| d.as_str()) {
            Some(data) => format!("{} ({})", msg, data),
            None => msg.to_string(),
        },
        None => err.to_string(),
    }
}

/// Asynchronous transport interface to the Chrome DevTools Protocol over WebSocket.
#[derive(Debug)]
pub(crate) struct Transport {
    tx: mpsc::Sender<TransportMessage>,
}

impl Transport {
    /// Creates a new transport connected to the specified WebSocket URL.
    pub(crate) async fn new(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let actor = TransportActor {
                pending_requests: HashMap::new(),
                subscribers: HashMap::new(),
                ws_sink,
                command_rx: rx,
            };
            actor.run(ws_stream).await;
        });

        Ok(Self { tx })
    }

    /// Sends a command and awaits its response.
    pub(crate) async fn send(&self, command: Value) -> Result<TransportResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::Request(command, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        time::timeout(DEFAULT_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for response"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Registers interest in the target reply carrying `msg_id`.
    ///
    /// Must be called before the command is sent, otherwise a fast reply is lost.
    pub(crate) async fn listen_target_msg(
        &self,
        msg_id: usize,
    ) -> Result<oneshot::Receiver<Result<TransportResponse>>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::ListenTargetMessage(msg_id as u64, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    /// Streams events named `method` coming from the given session.
    pub(crate) async fn subscribe(
        &self,
        session_id: &str,
        method: &str,
    ) -> Result<mpsc::UnboundedReceiver<Value>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx
            .send(TransportMessage::Subscribe {
                session_id: session_id.to_string(),
                method: method.to_string(),
                tx,
            })
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    /// Initiates a graceful shutdown of the transport.
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.try_send(TransportMessage::Shutdown);
    }
}
