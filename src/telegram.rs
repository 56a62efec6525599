use std::future::Future;

use tracing::debug;

use crate::TELEGRAM_API_BASE;
use crate::config::Config;

/// Failure to hand a message to the messaging provider.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Destination for notification and alert text.
pub trait MessageSink: Send + Sync + 'static {
    fn send(&self, text: &str) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Telegram Bot API `sendMessage` sink.
#[derive(Debug, Clone)]
pub struct TelegramSink {
    http: reqwest::Client,
    base_url: String,
    token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn from_config(config: &Config) -> Result<Self, SinkError> {
        Self::new(
            TELEGRAM_API_BASE,
            &config.tg_bot_token,
            &config.chat_id,
            config.proxy(),
        )
    }

    pub fn new(
        base_url: &str,
        token: &str,
        chat_id: &str,
        proxy: Option<&str>,
    ) -> Result<Self, SinkError> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(SinkError::Client)?);
        }
        let http = builder.build().map_err(SinkError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

impl MessageSink for TelegramSink {
    async fn send(&self, text: &str) -> Result<(), SinkError> {
        let resp = self
            .http
            .get(self.endpoint())
            .query(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }
        debug!(chat_id = %self.chat_id, "Message delivered");
        Ok(())
    }
}
