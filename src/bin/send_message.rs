//! Send one message through the configured Telegram sink.
//!
//! Checks the bot token, chat id and proxy settings without touching the node.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use chain_log_notifier::config::{CONFIG_PATH, Config};
use chain_log_notifier::telegram::{MessageSink, TelegramSink};

#[derive(Parser)]
#[command(name = "send_message", about = "Send a test message to the configured chat")]
struct Args {
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Message text
    #[arg(default_value = "test")]
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let sink = TelegramSink::from_config(&config)?;
    println!("Sending to chat {}...", config.chat_id);
    sink.send(&args.text).await?;
    println!("Delivered.");
    Ok(())
}
