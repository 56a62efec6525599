pub mod config;
pub mod feed;
pub mod logging;
pub mod notifier;
pub mod proxy;
pub mod shutdown;
pub mod signatures;
pub mod subscriber;
pub mod supervisor;
pub mod telegram;
pub mod types;
pub mod watcher;

/// Telegram Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Capacity of the queue between the subscribers and the notifier
pub const QUEUE_CAPACITY: usize = 1024;
