use std::sync::Arc;
use std::time::Duration;

use alloy::rpc::types::Filter;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::QUEUE_CAPACITY;
use crate::config::Config;
use crate::feed::LogSource;
use crate::notifier::Notifier;
use crate::signatures::SignatureTable;
use crate::subscriber::{RETRY_DELAY, RetryingSubscriber};
use crate::telegram::MessageSink;
use crate::types::Direction;

/// Two directional subscribers feeding one notifier through a bounded queue.
pub struct Watcher<L, S> {
    source: Arc<L>,
    sink: Arc<S>,
    signatures: SignatureTable,
    filters: Vec<(Direction, Filter)>,
    retry_delay: Duration,
    queue_capacity: usize,
}

impl<L: LogSource, S: MessageSink> Watcher<L, S> {
    pub fn new(config: &Config, source: Arc<L>, sink: Arc<S>) -> Result<Self> {
        let addresses = config.addresses()?;
        let filters = Direction::ALL
            .into_iter()
            .map(|direction| (direction, direction.filter(&addresses)))
            .collect();

        Ok(Self {
            source,
            sink,
            signatures: SignatureTable::builtin(),
            filters,
            retry_delay: RETRY_DELAY,
            queue_capacity: QUEUE_CAPACITY,
        })
    }

    pub fn with_signatures(mut self, signatures: SignatureTable) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Run until `shutdown` fires, then wait for every task to stop.
    pub async fn run(self, shutdown: CancellationToken) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut tasks = JoinSet::new();

        for (direction, filter) in self.filters {
            let subscriber = RetryingSubscriber::new(
                self.source.clone(),
                self.sink.clone(),
                direction,
                filter,
                tx.clone(),
            )
            .with_retry_delay(self.retry_delay);
            info!(direction = %subscriber.direction(), "Starting subscriber");
            tasks.spawn(subscriber.run(shutdown.clone()));
        }
        drop(tx);

        let notifier = Notifier::new(self.sink, self.signatures);
        tasks.spawn(notifier.run(rx, shutdown.clone()));

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                warn!("Watcher task ended abnormally: {e}");
            }
        }
        info!("Watcher stopped");
    }
}
