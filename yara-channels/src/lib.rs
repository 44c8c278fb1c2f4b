//! Yara Channels - Messaging channel adapters for the Yara bot.
//!
//! This crate provides:
//! - Telegram (Bot API long polling)
//! - CLI (stdin/stdout, for local testing)
//!
//! ## Architecture
//!
//! ```text
//! User IM → getUpdates → TelegramChannel::listen → mpsc → bot processor
//!                                                             ↓
//! User ←── sendMessage ←── Channel::send ←──────────── reply
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cli;
pub mod message;
pub mod telegram;
pub mod traits;

pub use cli::CliChannel;
pub use message::{ChannelMessage, ChannelType, MessageContent, OutgoingContent, OutgoingMessage};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult};
