//! Message types for channel communication.

use serde::{Deserialize, Serialize};

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
    Cli,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Cli => "cli",
        }
    }
}

/// Unified inbound message format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Chat identifier replies are sent to
    pub channel_id: String,
    /// Sender identity
    pub user_id: String,
    /// Sender username, if the platform exposes one
    #[serde(default)]
    pub username: Option<String>,
    /// Sender display name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Message content
    pub content: MessageContent,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID assigned on receipt
    pub trace_id: String,
}

/// Inbound message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text message (commands included)
    Text { text: String },
    /// Anything the bot does not process (stickers, photos, voice...)
    Unsupported { kind: String },
}

/// Outgoing message to send to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target channel type
    pub channel_type: ChannelType,
    /// Target chat ID
    pub channel_id: String,
    /// Reply to message ID (optional)
    pub reply_to: Option<String>,
    /// Message content
    pub content: OutgoingContent,
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingContent {
    /// Plain text, sent verbatim
    Text { text: String },
    /// Light Markdown (`*bold*`, `` `code` ``), rendered per channel
    Markdown { text: String },
}

impl OutgoingContent {
    /// Plain text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Markdown content.
    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown { text: text.into() }
    }

    /// The raw text regardless of formatting.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text { text } | Self::Markdown { text } => text,
        }
    }
}

impl ChannelMessage {
    /// Get the text content if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::Unsupported { .. } => None,
        }
    }

    /// Identities the allow-list may match: the user id and, if present, the username.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.user_id.as_str()).chain(self.username.as_deref())
    }

    /// Build a reply addressed to the chat this message came from.
    pub fn reply(&self, content: OutgoingContent) -> OutgoingMessage {
        OutgoingMessage {
            channel_type: self.channel_type,
            channel_id: self.channel_id.clone(),
            reply_to: Some(self.id.clone()),
            content,
        }
    }

    /// Get the channel type as a string.
    pub fn channel_type_str(&self) -> &'static str {
        self.channel_type.as_str()
    }
}
