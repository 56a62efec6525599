use std::fmt;

use alloy::primitives::{Address, B256};
use alloy::rpc::types::{Filter, Log};

/// A log as delivered by the node's `logs` subscription.
pub type LogEntry = Log;

/// Which indexed argument the watched addresses are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Watched addresses are the sender (topic 1).
    From,
    /// Watched addresses are the recipient (topic 2).
    To,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::From, Direction::To];

    pub fn label(self) -> &'static str {
        match self {
            Direction::From => "from",
            Direction::To => "to",
        }
    }

    /// Log filter binding this direction's topic slot to `addresses`.
    ///
    /// Slot 0 (the event signature) stays a wildcard, as does the other
    /// address slot.
    pub fn filter(self, addresses: &[Address]) -> Filter {
        let words: Vec<B256> = addresses.iter().map(|a| a.into_word()).collect();
        match self {
            Direction::From => Filter::new().topic1(words),
            Direction::To => Filter::new().topic2(words),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Entry carrying only the fields the notifier reads.
#[cfg(test)]
pub(crate) fn log_entry(topics: Vec<B256>, transaction_hash: Option<B256>) -> LogEntry {
    Log {
        inner: alloy::primitives::Log::new_unchecked(
            Address::ZERO,
            topics,
            alloy::primitives::Bytes::new(),
        ),
        transaction_hash,
        ..Default::default()
    }
}
