//! Dump the node log feed
//!
//! Connects to the configured node endpoint and:
//! - Subscribes to logs in both directions for the watched addresses
//! - Prints each entry as the notification text it would produce
//! - Sends nothing to Telegram
//! - Stops after --duration-secs or on the first subscription error

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use chain_log_notifier::QUEUE_CAPACITY;
use chain_log_notifier::config::{CONFIG_PATH, Config};
use chain_log_notifier::feed::{LogSource, WsLogSource};
use chain_log_notifier::notifier::format_message;
use chain_log_notifier::signatures::SignatureTable;
use chain_log_notifier::types::Direction;

#[derive(Parser)]
#[command(name = "dump_feed", about = "Print decoded logs for the watched addresses")]
struct Args {
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// How long to listen
    #[arg(long, default_value_t = 60)]
    duration_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;
    config.validate()?;

    println!("=== Node log feed ===");
    println!("Endpoint: {}", config.endpoint());
    println!("Addresses: {:?}", config.address);
    if let Some(proxy) = config.proxy() {
        println!("Proxy: {proxy}");
    }
    println!();

    let source = WsLogSource::connect(config.endpoint(), config.proxy())
        .await
        .context("initial connection failed")?;
    let addresses = config.addresses()?;

    let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let mut subscriptions = Vec::new();
    for direction in Direction::ALL {
        let filter = direction.filter(&addresses);
        let sub = source.subscribe(&filter, tx.clone()).await?;
        println!("Subscribed ({direction})");

        // Forward the terminal error, tagged with its direction.
        let err_tx = err_tx.clone();
        subscriptions.push(tokio::spawn(async move {
            let err = sub.closed().await;
            let _ = err_tx.send((direction, err));
        }));
    }
    drop(tx);

    let signatures = SignatureTable::builtin();
    let duration = Duration::from_secs(args.duration_secs);
    let start = Instant::now();
    let mut count = 0u64;

    println!("--- Listening for {}s ---", args.duration_secs);
    loop {
        let remaining = duration.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }
        tokio::select! {
            entry = rx.recv() => match entry {
                Some(entry) => {
                    count += 1;
                    println!(
                        "[{:.1}s] #{} block={}",
                        start.elapsed().as_secs_f64(),
                        count,
                        entry.block_number.map_or("?".to_string(), |n| n.to_string())
                    );
                    println!("{}", format_message(&entry, &signatures));
                    println!();
                }
                None => break,
            },
            Some((direction, err)) = err_rx.recv() => {
                println!("Subscription ({direction}) ended: {err}");
                break;
            }
            _ = tokio::time::sleep(remaining) => break,
        }
    }

    for handle in subscriptions {
        handle.abort();
    }

    println!();
    println!("--- Summary ---");
    println!("Entries received: {count}");
    println!("Duration: {:.1}s", start.elapsed().as_secs_f64());
    println!("=== Done ===");
    Ok(())
}
