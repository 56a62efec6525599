use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::signatures::SignatureTable;
use crate::telegram::MessageSink;
use crate::types::LogEntry;

/// Render a log entry as the four-line notification text.
///
/// Topic 0 is looked up in `signatures`; topics 1 and 2 are printed verbatim
/// as full 32-byte hex words. Missing topics or hash render as empty values.
pub fn format_message(entry: &LogEntry, signatures: &SignatureTable) -> String {
    let topics = entry.topics();
    let event = topics
        .first()
        .map(|t| signatures.label(t))
        .unwrap_or_default();
    let word = |i: usize| topics.get(i).map(|t| t.to_string()).unwrap_or_default();
    let hash = entry
        .transaction_hash
        .map(|h| h.to_string())
        .unwrap_or_default();

    format!(
        "from:{}\nto:{}\nevent:{event}\nhash:{hash}",
        word(1),
        word(2)
    )
}

/// Turns queued log entries into messages on a [`MessageSink`].
pub struct Notifier<S> {
    sink: Arc<S>,
    signatures: SignatureTable,
}

impl<S: MessageSink> Notifier<S> {
    pub fn new(sink: Arc<S>, signatures: SignatureTable) -> Self {
        Self { sink, signatures }
    }

    /// Format and deliver one entry. Delivery failures are logged and dropped.
    pub async fn notify(&self, entry: &LogEntry) {
        let message = format_message(entry, &self.signatures);
        match self.sink.send(&message).await {
            Ok(()) => debug!(tx = ?entry.transaction_hash, "Notification sent"),
            Err(e) => warn!(tx = ?entry.transaction_hash, "Failed to send notification: {e}"),
        }
    }

    /// Drain `queue` one entry at a time until it closes or `shutdown` fires.
    pub async fn run(self, mut queue: mpsc::Receiver<LogEntry>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Notifier shutting down");
                    break;
                }
                entry = queue.recv() => match entry {
                    Some(entry) => self.notify(&entry).await,
                    None => {
                        info!("Inbound queue closed");
                        break;
                    }
                },
            }
        }
    }
}
