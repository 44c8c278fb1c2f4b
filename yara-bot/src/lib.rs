//! Yara - a Telegram assistant.
//!
//! Authorized users either look up a term on Wikipedia (`pesquisar <termo>`)
//! or chat with an LLM that remembers the conversation per user.
//!
//! ```text
//! ChannelMessage → AccessGate ─ rejected ─→ rejection reply
//!                      │
//!                      ↓ per-user queue
//!                  classify ─→ /start /ajuda /reset
//!                      ├─────→ LookupHandler   → ContentLookup
//!                      └─────→ QuestionHandler → HistoryStore + CompletionProvider
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod access;
pub mod bot;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod history;
pub mod lookup;
pub mod messages;
pub mod provider;

pub use access::AccessGate;
pub use bot::{spawn_processor, Bot, UserQueues};
pub use dispatch::{classify, Command, Route};
pub use error::BotError;
pub use handlers::{LookupHandler, QuestionHandler};
pub use history::{
    ConversationStore, HistoryStore, MemoryConversationStore, Role, SqliteConversationStore, Turn,
};
pub use lookup::{ContentLookup, LookupError, LookupResult, WikipediaLookup};
pub use provider::{
    ChatRequest, ChatResponse, CompatibleProvider, CompletionProvider, CompletionSettings,
    ProviderError, TokenUsage,
};

use std::sync::Arc;
use yara_common::Config;

/// Assemble the bot from configuration.
///
/// `ephemeral` keeps history in memory only.
pub fn build_bot(config: &Config, ephemeral: bool) -> Result<Bot, history::StoreError> {
    let backend: Arc<dyn ConversationStore> = if ephemeral {
        Arc::new(MemoryConversationStore::new())
    } else {
        let path = config.history.resolved_db_path();
        tracing::info!(path = %path.display(), "Opening conversation database");
        Arc::new(SqliteConversationStore::open(&path)?)
    };

    let history = Arc::new(
        HistoryStore::new(backend, config.history.system_prompt.clone())
            .with_max_turns(config.history.max_turns),
    );

    let provider: Option<Arc<dyn CompletionProvider>> = CompatibleProvider::from_config(&config.llm)
        .map(|p| Arc::new(p) as Arc<dyn CompletionProvider>);
    if provider.is_none() {
        tracing::warn!("No LLM API key configured; questions will get a 'not configured' notice");
    }

    let gate = AccessGate::new(&config.telegram.allowed_users);
    if gate.is_empty() {
        tracing::warn!("Allow-list is empty; every sender will be rejected");
    }

    let questions = QuestionHandler::new(
        history.clone(),
        provider,
        CompletionSettings::from(&config.llm),
    );
    let lookups = LookupHandler::new(
        Arc::new(WikipediaLookup::from_config(&config.lookup)),
        config.lookup.max_reply_chars,
    );

    Ok(Bot::new(gate, history, questions, lookups))
}
