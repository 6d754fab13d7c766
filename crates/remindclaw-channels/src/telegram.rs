//! Telegram Bot channel — long polling + message sending via Bot API.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use remindclaw_core::config::TelegramChannelConfig;
use remindclaw_core::error::{RemindClawError, Result};
use remindclaw_core::traits::MessageSender;
use remindclaw_core::types::InboundUpdate;
use serde::{Deserialize, Serialize};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram Bot channel. Cheap to clone: clones share the HTTP client.
#[derive(Clone)]
pub struct TelegramChannel {
    config: TelegramChannelConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramChannelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Get updates after `offset` using long polling.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.config.poll_timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .timeout(Duration::from_secs(self.config.poll_timeout_secs + 10))
            .send()
            .await
            .map_err(|e| RemindClawError::Channel(format!("Telegram getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| RemindClawError::Channel(format!("Invalid Telegram response: {e}")))?;

        body.into_result("getUpdates")
            .map(|updates| updates.unwrap_or_default())
    }

    /// Send a plain-text message. No parse mode, so the text arrives verbatim.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| RemindClawError::Channel(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| RemindClawError::Channel(format!("Invalid send response: {e}")))?;

        result.into_result("sendMessage").map(|_| ())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| RemindClawError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| RemindClawError::Channel(format!("Invalid getMe response: {e}")))?;
        body.into_result("getMe")?
            .ok_or_else(|| RemindClawError::Channel("No bot info".into()))
    }

    /// Check the token against the API. Called once at startup.
    pub async fn connect(&self) -> Result<TelegramUser> {
        let me = self.get_me().await?;
        tracing::info!(
            "Telegram bot: @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.first_name
        );
        Ok(me)
    }

    /// Start the polling loop — returns a stream of update batches.
    ///
    /// The offset moves past every received update before the batch is handed
    /// over, so nothing is ever re-delivered at this layer.
    pub fn start_polling(&self) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel = self.clone();

        tokio::spawn(async move {
            tracing::info!("Telegram polling loop started");
            let mut offset = 0_i64;

            loop {
                match channel.get_updates(offset).await {
                    Ok(updates) => {
                        if let Some(last) = updates.last() {
                            offset = last.update_id + 1;
                        }
                        let batch: Vec<InboundUpdate> =
                            updates.iter().filter_map(TelegramUpdate::to_inbound).collect();
                        if !batch.is_empty() && tx.send(batch).is_err() {
                            tracing::info!("Telegram polling stopped (receiver dropped)");
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }

                tokio::time::sleep(Duration::from_secs(channel.config.poll_interval_secs)).await;
            }
        });

        TelegramPollingStream { rx }
    }
}

/// Stream of update batches from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<Vec<InboundUpdate>>,
}

impl Stream for TelegramPollingStream {
    type Item = Vec<InboundUpdate>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[async_trait]
impl MessageSender for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

impl<T> TelegramApiResponse<T> {
    fn into_result(self, method: &str) -> Result<Option<T>> {
        if self.ok {
            return Ok(self.result);
        }
        Err(RemindClawError::Channel(format!(
            "Telegram {method} error {}: {}",
            self.error_code.unwrap_or_default(),
            self.description.unwrap_or_default()
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl TelegramUpdate {
    /// Convert to a platform-neutral update. `None` when there is no message
    /// (edited messages, callbacks); a message without text keeps `text: None`.
    pub fn to_inbound(&self) -> Option<InboundUpdate> {
        let msg = self.message.as_ref()?;
        Some(InboundUpdate {
            update_id: self.update_id,
            chat_id: msg.chat.id,
            text: msg.text.clone(),
        })
    }
}
