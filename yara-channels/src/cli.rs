//! CLI channel adapter for interactive terminal sessions.
//!
//! Provides a simple stdin/stdout based channel for local testing and development.

use crate::message::{ChannelMessage, ChannelType, MessageContent, OutgoingMessage};
use crate::traits::{Channel, ChannelResult};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Identity used for every message typed on the terminal.
pub const CLI_USER_ID: &str = "cli";

/// CLI channel - stdin/stdout, always available.
pub struct CliChannel {
    user_id: String,
}

impl CliChannel {
    /// Create a new CLI channel.
    pub fn new() -> Self {
        Self {
            user_id: CLI_USER_ID.to_string(),
        }
    }

    /// Use a different sender identity, e.g. to test the allow-list.
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    fn to_message(&self, line: String) -> ChannelMessage {
        ChannelMessage {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type: ChannelType::Cli,
            channel_id: "cli".to_string(),
            user_id: self.user_id.clone(),
            username: None,
            first_name: None,
            content: MessageContent::Text { text: line },
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
            trace_id: yara_common::logging::generate_trace_id(),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        println!("{}\n", message.content.as_str());
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn send_typing(&self, _channel_id: &str) -> ChannelResult<()> {
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line == "/quit" || line == "/exit" {
                break;
            }

            if tx.send(self.to_message(line)).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}
