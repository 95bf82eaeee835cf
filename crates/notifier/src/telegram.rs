//! Telegram delivery channel.
//!
//! HTTP 403 from the Bot API means the recipient blocked the bot — a
//! permanent rejection. Rate limits, server errors, and network failures are
//! retried with exponential backoff up to the configured attempt budget,
//! then surfaced as a transient failure for this tick.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use herald_common::channel::{Channel, SendError};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Base delay for the exponential backoff between retries.
const RETRY_BASE_DELAY_MS: u64 = 500;

/// `Channel` implementation over the Telegram Bot API `sendMessage` call.
pub struct TelegramChannel {
    client: reqwest::Client,
    token: String,
    max_retries: u32,
}

impl TelegramChannel {
    pub fn new(token: String, max_retries: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            max_retries,
        }
    }

    async fn send_once(&self, recipient_id: &str, text: &str) -> Result<(), SendError> {
        let url = format!("{TELEGRAM_API_BASE}/bot{}/sendMessage", self.token);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": recipient_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .map_err(|e| SendError::Transient(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::FORBIDDEN => {
                Err(SendError::Rejected("bot was blocked by the recipient".into()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SendError::Transient(format!("HTTP {status}: {body}")))
            }
        }
    }
}

impl Channel for TelegramChannel {
    fn send(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), SendError>> + Send {
        async move {
            let mut attempt = 0u32;
            loop {
                match self.send_once(recipient_id, text).await {
                    Ok(()) => return Ok(()),
                    Err(rejected @ SendError::Rejected(_)) => return Err(rejected),
                    Err(SendError::Transient(reason)) => {
                        if attempt >= self.max_retries {
                            return Err(SendError::Transient(reason));
                        }
                        let delay =
                            Duration::from_millis(RETRY_BASE_DELAY_MS << attempt.min(6));
                        tracing::debug!(
                            recipient_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            %reason,
                            "Transient delivery failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}
