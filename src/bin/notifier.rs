use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chain_log_notifier::config::{CONFIG_PATH, Config};
use chain_log_notifier::feed::WsLogSource;
use chain_log_notifier::logging::{self, LOG_PATH};
use chain_log_notifier::shutdown::cancel_on_signal;
use chain_log_notifier::supervisor::supervise;
use chain_log_notifier::telegram::TelegramSink;
use chain_log_notifier::watcher::Watcher;

#[derive(Parser)]
#[command(name = "notifier", about = "Forward on-chain transfer logs for watched addresses to Telegram")]
struct Args {
    /// Path to the JSON config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Append-only log file
    #[arg(long, default_value = LOG_PATH)]
    log_file: PathBuf,

    /// Seconds to wait before re-subscribing after a feed failure
    #[arg(long, default_value_t = 60)]
    retry_delay_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = logging::initialize(&args.log_file) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    // No sink can exist before the config loads, so these failures are log-only.
    let config = match Config::load(&args.config).and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            error!("Startup failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let sink = match TelegramSink::from_config(&config) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("Startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let retry_delay = Duration::from_secs(args.retry_delay_secs);
    let app = run(config, sink.clone(), retry_delay, shutdown);
    match supervise(sink.as_ref(), app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

async fn run(
    config: Config,
    sink: Arc<TelegramSink>,
    retry_delay: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(
        endpoint = config.endpoint(),
        test = config.test,
        addresses = config.address.len(),
        proxy = config.http_proxy,
        "Begin listening"
    );

    let source = WsLogSource::connect(config.endpoint(), config.proxy())
        .await
        .with_context(|| format!("failed to connect to {}", config.endpoint()))?;

    Watcher::new(&config, Arc::new(source), sink)?
        .with_retry_delay(retry_delay)
        .run(shutdown)
        .await;
    Ok(())
}
