//! Last-resort handling for the top-level task: an error return or a panic is
//! logged and reported through the alert sink exactly once.

use std::any::Any;
use std::future::Future;

use anyhow::{Result, anyhow};
use tracing::error;

use crate::telegram::MessageSink;

/// Run `task` on its own tokio task and report how it ended.
///
/// Returns the fatal message as an error after alerting; a clean return is
/// `Ok` and sends nothing.
pub async fn supervise<S, F>(alerts: &S, task: F) -> Result<()>
where
    S: MessageSink,
    F: Future<Output = Result<()>> + Send + 'static,
{
    let message = match tokio::spawn(task).await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => format!("{e:#}"),
        Err(e) if e.is_panic() => format!("panic: {}", panic_message(e.into_panic())),
        Err(e) => e.to_string(),
    };

    error!("Fatal: {message}");
    if let Err(e) = alerts.send(&message).await {
        error!("Failed to send fatal alert: {e}");
    }
    Err(anyhow!(message))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
