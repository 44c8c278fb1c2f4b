//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving and sending messages
//! through the Telegram Bot API (long polling via `getUpdates`).

pub mod format;

use crate::message::{ChannelMessage, ChannelType, MessageContent, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Telegram's hard limit for a single message.
const MAX_MESSAGE_LEN: usize = 4096;

/// Delay before polling again after a failed `getUpdates`.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Message fields that identify a non-text message, checked in order.
const NON_TEXT_KINDS: &[&str] = &[
    "photo",
    "sticker",
    "voice",
    "audio",
    "video",
    "video_note",
    "animation",
    "document",
    "location",
    "contact",
    "poll",
];

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel against the public Bot API.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_api_base(bot_token, "https://api.telegram.org", 30)
    }

    /// Create a channel against a specific Bot API server.
    pub fn with_api_base(
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
        poll_timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            // Long polls hold the connection for up to `poll_timeout_secs`.
            .timeout(Duration::from_secs(poll_timeout_secs + 30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let api_base: String = api_base.into();
        Self {
            bot_token: bot_token.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            poll_timeout_secs,
            client,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// Post a Bot API method and return the decoded `result` field.
    async fn call(&self, method: &str, body: &Value) -> ChannelResult<Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        let status = resp.status();
        let data: Value = resp.json().await.unwrap_or(Value::Null);

        if status.is_success() && data.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(data.get("result").cloned().unwrap_or(Value::Null));
        }

        let description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description")
            .to_string();

        match status.as_u16() {
            401 | 403 => Err(ChannelError::Auth(description)),
            429 => Err(ChannelError::RateLimited {
                retry_after_secs: data
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(Value::as_u64)
                    .unwrap_or(1),
            }),
            400 => Err(ChannelError::InvalidMessage(description)),
            code => Err(ChannelError::SendFailed(format!(
                "{method} failed ({code}): {description}"
            ))),
        }
    }

    /// Send a single chunk, rendering Markdown as HTML when asked.
    ///
    /// If Telegram rejects the entities, the chunk is resent as plain text.
    async fn send_single_chunk(&self, chat_id: &str, text: &str, html: bool) -> ChannelResult<()> {
        if !html {
            let body = serde_json::json!({ "chat_id": chat_id, "text": text });
            return self.call("sendMessage", &body).await.map(|_| ());
        }

        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": format::convert_to_telegram_html(text),
            "parse_mode": "HTML"
        });

        match self.call("sendMessage", &body).await {
            Ok(_) => Ok(()),
            // Telegram returns "Bad Request: can't parse entities" for HTML errors
            Err(ChannelError::InvalidMessage(desc)) if desc.contains("parse entities") => {
                tracing::warn!(
                    error = %desc,
                    "Telegram HTML parsing failed, retrying without parse_mode"
                );
                let plain = serde_json::json!({ "chat_id": chat_id, "text": text });
                self.call("sendMessage", &plain).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

/// Split a message into chunks that fit within Telegram's limit.
///
/// Prefers paragraph, line, sentence, then word boundaries; never splits a
/// UTF-8 character.
fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let window = &remaining[..limit];
        let split_pos = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .or_else(|| window.rfind(". ").map(|p| p + 1))
            .or_else(|| window.rfind(' '))
            .filter(|&p| p > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_pos].to_string());
        remaining = remaining[split_pos..].trim_start();
    }

    chunks
}

/// Convert one `getUpdates` entry into a channel message.
///
/// Returns `None` for updates that carry no user message (edits, callbacks, ...).
fn parse_update(update: &Value) -> Option<ChannelMessage> {
    let message = update.get("message")?;

    let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();
    let from = message.get("from")?;
    let user_id = from.get("id")?.as_i64()?.to_string();
    let username = from
        .get("username")
        .and_then(Value::as_str)
        .map(String::from);
    let first_name = from
        .get("first_name")
        .and_then(Value::as_str)
        .map(String::from);

    let content = match message.get("text").and_then(Value::as_str) {
        Some(text) => MessageContent::Text {
            text: text.to_string(),
        },
        None => MessageContent::Unsupported {
            kind: NON_TEXT_KINDS
                .iter()
                .find(|k| message.get(**k).is_some())
                .map_or("other", |k| *k)
                .to_string(),
        },
    };

    let id = message
        .get("message_id")
        .and_then(Value::as_i64)
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), |id| id.to_string());

    let timestamp = message
        .get("date")
        .and_then(Value::as_i64)
        .map_or(0, |secs| secs * 1000);

    Some(ChannelMessage {
        id,
        channel_type: ChannelType::Telegram,
        channel_id: chat_id,
        user_id,
        username,
        first_name,
        content,
        timestamp,
        trace_id: yara_common::logging::generate_trace_id(),
    })
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        // Verify bot token by calling getMe
        let me = self
            .call("getMe", &serde_json::json!({}))
            .await
            .map_err(|e| match e {
                ChannelError::Auth(desc) => ChannelError::Auth(format!("Invalid bot token: {desc}")),
                other => other,
            })?;

        let username = me.get("username").and_then(Value::as_str).unwrap_or("unknown");
        tracing::info!(bot = %username, "Telegram channel initialized");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let (text, html) = match &message.content {
            OutgoingContent::Text { text } => (text.as_str(), false),
            OutgoingContent::Markdown { text } => (text.as_str(), true),
        };

        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.send_single_chunk(&message.channel_id, &chunk, html)
                .await?;
        }

        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn send_typing(&self, channel_id: &str) -> ChannelResult<()> {
        let body = serde_json::json!({ "chat_id": channel_id, "action": "typing" });
        self.call("sendChatAction", &body).await.map(|_| ())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"]
            });

            let result = match self.call("getUpdates", &body).await {
                Ok(r) => r,
                Err(ChannelError::Auth(desc)) => {
                    return Err(ChannelError::Auth(desc));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Telegram poll error");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let Some(updates) = result.as_array() else {
                tracing::warn!("Telegram getUpdates returned a non-array result");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                continue;
            };

            for update in updates {
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(msg) = parse_update(update) else {
                    continue;
                };

                tracing::info!(
                    channel = "telegram",
                    trace_id = %msg.trace_id,
                    message_id = %msg.id,
                    chat_id = %msg.channel_id,
                    user_id = %msg.user_id,
                    "IM message received"
                );

                if tx.send(msg).await.is_err() {
                    tracing::info!("Message receiver dropped, stopping Telegram listener");
                    return Ok(());
                }
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<()> {
        self.call("getMe", &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(|_| ChannelError::NotReady)
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}
