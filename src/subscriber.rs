//! Retry-wrapped log subscription for one filter direction.
//!
//! Each attempt subscribes and waits for the subscription's terminal error.
//! Any error, at setup or mid-stream, produces one alert and a fixed wait before
//! the next attempt. There is no retry limit and no backoff growth.

use std::sync::Arc;
use std::time::Duration;

use alloy::rpc::types::Filter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::feed::{FeedError, LogSource};
use crate::telegram::MessageSink;
use crate::types::{Direction, LogEntry};

/// Default wait between a failure and the next subscription attempt.
pub const RETRY_DELAY: Duration = Duration::from_secs(60);

pub struct RetryingSubscriber<L, S> {
    source: Arc<L>,
    alerts: Arc<S>,
    direction: Direction,
    filter: Filter,
    queue: mpsc::Sender<LogEntry>,
    retry_delay: Duration,
}

impl<L: LogSource, S: MessageSink> RetryingSubscriber<L, S> {
    pub fn new(
        source: Arc<L>,
        alerts: Arc<S>,
        direction: Direction,
        filter: Filter,
        queue: mpsc::Sender<LogEntry>,
    ) -> Self {
        Self {
            source,
            alerts,
            direction,
            filter,
            queue,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Subscribe, and re-subscribe after every failure, until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let direction = self.direction();
        loop {
            let err = tokio::select! {
                _ = shutdown.cancelled() => break,
                err = self.attempt() => err,
            };

            warn!(%direction, "Log subscription failed: {err}");
            self.alert(&err).await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            info!(%direction, "Re-subscribing");
        }
        info!(%direction, "Subscriber shutting down");
    }

    /// One subscription lifetime, ending in its error.
    async fn attempt(&self) -> FeedError {
        match self.source.subscribe(&self.filter, self.queue.clone()).await {
            Ok(subscription) => subscription.closed().await,
            Err(err) => err,
        }
    }

    async fn alert(&self, err: &FeedError) {
        let text = format!("{} subscription error: {err}", self.direction());
        if let Err(e) = self.alerts.send(&text).await {
            error!(direction = %self.direction(), "Failed to send alert: {e}");
        }
    }
}
