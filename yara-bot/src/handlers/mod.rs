//! Message handlers: commands, free-form questions, and content lookup.
//!
//! Handlers convert every collaborator failure into its user notice. The only
//! error they return is a channel failure while replying.

mod commands;
mod lookup;
mod question;

pub use commands::handle_command;
pub use lookup::LookupHandler;
pub use question::QuestionHandler;

use crate::error::BotError;
use yara_channels::{Channel, ChannelMessage, OutgoingContent};

/// Reply primitives bound to one inbound message.
pub struct Responder<'a> {
    channel: &'a dyn Channel,
    message: &'a ChannelMessage,
}

impl<'a> Responder<'a> {
    pub fn new(channel: &'a dyn Channel, message: &'a ChannelMessage) -> Self {
        Self { channel, message }
    }

    pub fn message(&self) -> &ChannelMessage {
        self.message
    }

    pub async fn text(&self, text: impl Into<String>) -> Result<(), BotError> {
        self.send(OutgoingContent::text(text)).await
    }

    pub async fn markdown(&self, text: impl Into<String>) -> Result<(), BotError> {
        self.send(OutgoingContent::markdown(text)).await
    }

    /// Show the typing indicator. Failures are only logged.
    pub async fn typing(&self) {
        if let Err(e) = self.channel.send_typing(&self.message.channel_id).await {
            tracing::debug!(chat_id = %self.message.channel_id, error = %e, "Typing indicator failed");
        }
    }

    async fn send(&self, content: OutgoingContent) -> Result<(), BotError> {
        self.channel.send(self.message.reply(content)).await?;
        Ok(())
    }
}
