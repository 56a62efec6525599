//! Node log feed over a websocket `logs` subscription.
//!
//! Direct connections go through an alloy pubsub provider. Proxied connections
//! go through [`tunnel`], since alloy's websocket connector always dials the
//! endpoint itself.

mod tunnel;

use std::future::Future;

use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::Filter;
use alloy::transports::{RpcError, TransportError};
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

pub use tunnel::{Frame, parse_frame};

use crate::types::LogEntry;

/// Any condition that ends (or prevents) a log subscription.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("proxy error: {0}")]
    Proxy(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("transport error: {0}")]
    Transport(TransportError),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("failed to decode feed message: {0}")]
    Decode(String),
    #[error("feed closed: {0}")]
    Closed(String),
    #[error("inbound queue closed")]
    QueueClosed,
}

impl From<TransportError> for FeedError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => FeedError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            other => FeedError::Transport(other),
        }
    }
}

/// Source of filtered log streams.
pub trait LogSource: Send + Sync + 'static {
    /// Start a subscription that writes matching entries into `sink`.
    ///
    /// Setup failures are returned directly; failures after setup are reported
    /// once through the returned [`Subscription`].
    fn subscribe(
        &self,
        filter: &Filter,
        sink: mpsc::Sender<LogEntry>,
    ) -> impl Future<Output = Result<Subscription, FeedError>> + Send;
}

/// Handle to a running subscription. Dropping it stops the subscription.
#[derive(Debug)]
pub struct Subscription {
    error: oneshot::Receiver<FeedError>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Handle whose terminal error arrives on `error`.
    pub fn new(error: oneshot::Receiver<FeedError>) -> Self {
        Self { error, task: None }
    }

    /// Handle for a forwarding task that reports its terminal error on `error`.
    fn spawn<F>(forward: F) -> Self
    where
        F: Future<Output = FeedError> + Send + 'static,
    {
        let (err_tx, err_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = err_tx.send(forward.await);
        });
        Self {
            error: err_rx,
            task: Some(task),
        }
    }

    /// Wait for the terminal error.
    pub async fn closed(mut self) -> FeedError {
        match (&mut self.error).await {
            Ok(err) => err,
            Err(_) => FeedError::Closed("subscription task ended without reporting".into()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Log source backed by a node websocket endpoint.
///
/// Every subscription opens its own connection, so one dropping does not affect
/// the others.
#[derive(Debug)]
pub struct WsLogSource {
    endpoint: String,
    proxy: Option<Url>,
}

impl WsLogSource {
    /// Dial the endpoint once and check it answers `eth_chainId`.
    pub async fn connect(endpoint: &str, proxy: Option<&str>) -> Result<Self, FeedError> {
        let proxy = proxy
            .map(|p| Url::parse(p).map_err(|e| FeedError::Proxy(format!("{p}: {e}"))))
            .transpose()?;
        let source = Self {
            endpoint: endpoint.to_string(),
            proxy,
        };

        let chain_id = match &source.proxy {
            None => {
                let provider = ProviderBuilder::new()
                    .connect_ws(WsConnect::new(endpoint))
                    .await?;
                provider.get_chain_id().await?
            }
            Some(proxy) => {
                let mut conn = tunnel::Connection::open(endpoint, proxy).await?;
                let chain_id = conn.chain_id().await?;
                conn.close().await;
                chain_id
            }
        };
        info!(endpoint, chain_id, proxied = source.proxy.is_some(), "Connected to node");
        Ok(source)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Subscribe through an alloy pubsub provider.
    ///
    /// The provider reconnects and re-subscribes on its own after a dropped
    /// socket; the stream only ends once it gives up.
    async fn subscribe_direct(
        &self,
        filter: &Filter,
        sink: mpsc::Sender<LogEntry>,
    ) -> Result<Subscription, FeedError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(self.endpoint.as_str()))
            .await?;
        let subscription = provider.subscribe_logs(filter).await?;
        info!(endpoint = %self.endpoint, "Subscribed to logs");

        let mut stream = subscription.into_stream().boxed();
        Ok(Subscription::spawn(async move {
            // The connection lives as long as the provider.
            let _provider = provider;
            while let Some(entry) = stream.next().await {
                if let Err(err) = forward(entry, &sink).await {
                    return err;
                }
            }
            FeedError::Closed("subscription stream ended".into())
        }))
    }
}

impl LogSource for WsLogSource {
    async fn subscribe(
        &self,
        filter: &Filter,
        sink: mpsc::Sender<LogEntry>,
    ) -> Result<Subscription, FeedError> {
        let Some(proxy) = &self.proxy else {
            return self.subscribe_direct(filter, sink).await;
        };

        let mut conn = tunnel::Connection::open(&self.endpoint, proxy).await?;
        let subscription_id = conn.subscribe_logs(filter).await?;
        info!(
            endpoint = %self.endpoint,
            subscription = %subscription_id,
            "Subscribed to logs through proxy"
        );
        Ok(Subscription::spawn(conn.pump(subscription_id, sink)))
    }
}

/// Hand one entry to the inbound queue, waiting while it is full.
async fn forward(entry: LogEntry, sink: &mpsc::Sender<LogEntry>) -> Result<(), FeedError> {
    if entry.removed {
        warn!(tx = ?entry.transaction_hash, "Log removed by chain reorg");
    }
    sink.send(entry).await.map_err(|_| FeedError::QueueClosed)
}
