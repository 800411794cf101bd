//! Telegram transport: long-polls the Bot API for commands and posts
//! replies and alerts with `sendMessage`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;

use super::channel::{
    IncomingMessage, MessageStream, StopSignal, Transport, receiver_stream, wait_for_stop,
};
use crate::config::TelegramConfig;
use crate::engine::{Notifier, Platform};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Seconds the Bot API holds a getUpdates call open.
const LONG_POLL_TIMEOUT_SECS: u64 = 30;

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct TelegramTransport {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(self.config.bot_token.expose_secret(), method)
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(send_failed)?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        // Email addresses with underscores break Telegram's Markdown parser.
        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(send_failed)?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }

    /// Fetch the bot's username with `getMe`.
    pub async fn bot_username(&self) -> Result<String, ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::AuthFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
        data.get("result")
            .and_then(|r| r.get("username"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ChannelError::InvalidMessage("getMe returned no username".into()))
    }
}

#[async_trait]
impl Notifier for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_notification(&self, text: &str) -> Result<(), ChannelError> {
        let Some(chat_id) = self.config.notify_chat_id else {
            return Ok(());
        };
        self.send_message(&chat_id.to_string(), text).await
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn is_admin(&self, user_id: &str) -> bool {
        user_id
            .parse::<i64>()
            .is_ok_and(|id| self.config.admin_ids.contains(&id))
    }

    async fn start(&self, mut stop: StopSignal) -> Result<MessageStream, ChannelError> {
        let username = self.bot_username().await?;
        tracing::info!("Telegram bot started: @{username}");

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": LONG_POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = tokio::select! {
                    _ = wait_for_stop(&mut stop) => break,
                    resp = client.post(&url).json(&body).send() => resp,
                };

                let data: Value = match resp {
                    Ok(r) => match r.json().await {
                        Ok(d) => d,
                        Err(e) => {
                            tracing::warn!("Telegram parse error: {e}");
                            if pause(&mut stop).await {
                                break;
                            }
                            continue;
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        if pause(&mut stop).await {
                            break;
                        }
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    if pause(&mut stop).await {
                        break;
                    }
                    continue;
                };
                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }
                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
            tracing::info!("Telegram poller stopped");
        });

        Ok(receiver_stream(rx))
    }

    async fn respond(&self, msg: &IncomingMessage, text: &str) -> Result<(), ChannelError> {
        self.send_message(&msg.chat_id, text).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.bot_username().await.map(|_| ())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &str, method: &str) -> String {
    format!("https://api.telegram.org/bot{bot_token}/{method}")
}

fn send_failed(e: reqwest::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason: e.to_string(),
    }
}

/// Sleep before the next poll. Returns `true` if stop fired meanwhile.
async fn pause(stop: &mut StopSignal) -> bool {
    tokio::select! {
        _ = wait_for_stop(stop) => true,
        _ = tokio::time::sleep(POLL_RETRY_DELAY) => false,
    }
}

/// Extract a text message from one getUpdates entry.
fn parse_update(update: &Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let from = message.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;
    let username = from
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    Some(
        IncomingMessage::new(
            "telegram",
            user_id.to_string(),
            chat_id.to_string(),
            text,
        )
        .with_metadata(serde_json::json!({ "username": username })),
    )
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
