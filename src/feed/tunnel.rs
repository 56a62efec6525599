//! `logs` subscription over a websocket opened through a forward proxy.
//!
//! Filters go out and logs come back as alloy's RPC types; only the JSON-RPC
//! envelope is handled here.

use alloy::primitives::U64;
use alloy::rpc::types::Filter;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use super::{FeedError, forward};
use crate::proxy;
use crate::types::LogEntry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One decoded websocket text frame.
#[derive(Debug, PartialEq)]
pub enum Frame {
    Response {
        id: u64,
        result: Result<Value, (i64, String)>,
    },
    Notification {
        subscription: String,
        result: Value,
    },
    Other,
}

#[derive(Deserialize)]
struct RawFrame {
    id: Option<Value>,
    result: Option<Value>,
    error: Option<RawError>,
    method: Option<String>,
    params: Option<RawParams>,
}

#[derive(Deserialize)]
struct RawError {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RawParams {
    subscription: String,
    result: Value,
}

/// Classify a JSON-RPC text frame.
pub fn parse_frame(text: &str) -> Result<Frame, FeedError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| FeedError::Decode(format!("{e}: {text}")))?;

    if raw.method.as_deref() == Some("eth_subscription") {
        let params = raw
            .params
            .ok_or_else(|| FeedError::Decode(format!("notification without params: {text}")))?;
        return Ok(Frame::Notification {
            subscription: params.subscription,
            result: params.result,
        });
    }

    let Some(id) = raw.id.as_ref().and_then(Value::as_u64) else {
        return Ok(Frame::Other);
    };
    let result = match (raw.error, raw.result) {
        (Some(err), _) => Err((err.code, err.message)),
        (None, Some(value)) => Ok(value),
        (None, None) => Ok(Value::Null),
    };
    Ok(Frame::Response { id, result })
}

/// A websocket to the node, tunnelled through a proxy.
pub(super) struct Connection {
    ws: WsStream,
    next_id: u64,
}

impl Connection {
    pub(super) async fn open(endpoint: &str, proxy: &Url) -> Result<Self, FeedError> {
        let url = Url::parse(endpoint)
            .map_err(|e| FeedError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| FeedError::InvalidEndpoint(format!("{endpoint} has no host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FeedError::InvalidEndpoint(format!("{endpoint} has no port")))?;

        let stream = proxy::open_tunnel(proxy, host, port).await?;
        let (ws, _) = tokio_tungstenite::client_async_tls(endpoint, stream).await?;
        Ok(Self { ws, next_id: 1 })
    }

    pub(super) async fn chain_id(&mut self) -> Result<u64, FeedError> {
        let chain_id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(chain_id.to())
    }

    /// Send `eth_subscribe("logs", filter)` and return the subscription id.
    pub(super) async fn subscribe_logs(&mut self, filter: &Filter) -> Result<String, FeedError> {
        let filter = serde_json::to_value(filter)
            .map_err(|e| FeedError::Decode(format!("log filter: {e}")))?;
        self.request("eth_subscribe", json!(["logs", filter])).await
    }

    pub(super) async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    /// Send one request and wait for its response, skipping unrelated frames.
    async fn request<R: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<R, FeedError> {
        let id = self.next_id;
        self.next_id += 1;
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.ws.send(Message::Text(body.to_string().into())).await?;

        while let Some(msg) = self.ws.next().await {
            match msg? {
                Message::Text(text) => match parse_frame(text.as_str())? {
                    Frame::Response { id: got, result } if got == id => {
                        let value =
                            result.map_err(|(code, message)| FeedError::Rpc { code, message })?;
                        return serde_json::from_value(value)
                            .map_err(|e| FeedError::Decode(format!("{method} result: {e}")));
                    }
                    other => debug!(?other, method, "Skipping frame while awaiting response"),
                },
                Message::Close(frame) => {
                    return Err(FeedError::Closed(format!("{frame:?}")));
                }
                _ => {}
            }
        }
        Err(FeedError::Closed(format!("connection ended awaiting {method}")))
    }

    /// Forward notifications for `subscription_id` until the stream fails.
    pub(super) async fn pump(
        mut self,
        subscription_id: String,
        sink: mpsc::Sender<LogEntry>,
    ) -> FeedError {
        while let Some(msg) = self.ws.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => return FeedError::Closed(format!("{frame:?}")),
                Ok(_) => continue,
                Err(e) => return e.into(),
            };

            let (subscription, result) = match parse_frame(text.as_str()) {
                Ok(Frame::Notification {
                    subscription,
                    result,
                }) => (subscription, result),
                Ok(other) => {
                    debug!(?other, "Ignoring non-notification frame");
                    continue;
                }
                Err(e) => return e,
            };
            if subscription != subscription_id {
                debug!(%subscription, "Ignoring notification for another subscription");
                continue;
            }

            let entry: LogEntry = match serde_json::from_value(result) {
                Ok(entry) => entry,
                Err(e) => return FeedError::Decode(format!("log entry: {e}")),
            };
            if let Err(err) = forward(entry, &sink).await {
                return err;
            }
        }
        FeedError::Closed("connection ended".into())
    }
}
