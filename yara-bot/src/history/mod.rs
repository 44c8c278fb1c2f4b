//! Conversation history: turn types, the per-user store, and its persistence.

mod persist;
mod store;
mod types;

pub use persist::{ConversationStore, MemoryConversationStore, SqliteConversationStore, StoreError};
pub use store::HistoryStore;
pub use types::{Conversation, Role, Turn};
