//! Handler-level error taxonomy.
//!
//! Every variant maps to a fixed user-facing notice; none is allowed to reach
//! the transport layer.

use crate::history::StoreError;
use crate::lookup::LookupError;
use crate::messages;
use crate::provider::ProviderError;
use yara_channels::ChannelError;

/// Bot error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Sender {0} is not on the allow-list")]
    Unauthorized(String),

    #[error("Lookup request without a search term")]
    EmptyQuery,

    #[error("Completion provider is not configured")]
    CompletionNotConfigured,

    #[error("Completion failed: {0}")]
    Completion(#[from] ProviderError),

    #[error("Lookup for '{term}' failed: {source}")]
    Lookup {
        term: String,
        #[source]
        source: LookupError,
    },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl BotError {
    /// The reply shown to the user, if any.
    pub fn user_notice(&self) -> Option<String> {
        match self {
            Self::Unauthorized(_) => Some(messages::REJECTION.to_string()),
            Self::EmptyQuery => Some(messages::USAGE_HINT.to_string()),
            Self::CompletionNotConfigured => Some(messages::COMPLETION_NOT_CONFIGURED.to_string()),
            Self::Completion(_) => Some(messages::COMPLETION_FAILED.to_string()),
            Self::Lookup { term, .. } => Some(messages::not_found(term)),
            // Best-effort: never surfaced to the user.
            Self::Persistence(_) => None,
            // The channel itself failed; there is nowhere to reply.
            Self::Channel(_) => None,
        }
    }
}
