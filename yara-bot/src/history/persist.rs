//! Durable storage for conversations.
//!
//! The history store keeps every conversation in memory and writes each
//! mutation through to a [`ConversationStore`]. SQLite is the default backend;
//! the in-memory backend is used for tests and `--ephemeral` runs.

use super::types::Conversation;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Persistence error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Key-value persistence keyed by user identity.
pub trait ConversationStore: Send + Sync {
    /// Load every stored conversation.
    fn load_all(&self) -> Result<HashMap<String, Conversation>, StoreError>;

    /// Insert or replace the conversation of `user_id`.
    fn save(&self, user_id: &str, conversation: &Conversation) -> Result<(), StoreError>;

    /// Remove the conversation of `user_id`. Missing rows are not an error.
    fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS conversations (
    user_id    TEXT PRIMARY KEY,
    turns      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// SQLite-backed conversation store.
#[derive(Clone)]
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `db_path`, creating parent directories.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl ConversationStore for SqliteConversationStore {
    fn load_all(&self) -> Result<HashMap<String, Conversation>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare("SELECT user_id, turns FROM conversations")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut conversations = HashMap::new();
        for row in rows {
            let (user_id, turns_json) = row?;
            match serde_json::from_str::<Conversation>(&turns_json) {
                Ok(turns) => {
                    conversations.insert(user_id, turns);
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Skipping unreadable conversation row");
                }
            }
        }

        Ok(conversations)
    }

    fn save(&self, user_id: &str, conversation: &Conversation) -> Result<(), StoreError> {
        let turns_json = serde_json::to_string(conversation)?;
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            r"
            INSERT INTO conversations (user_id, turns, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                turns = excluded.turns,
                updated_at = excluded.updated_at
            ",
            params![user_id, turns_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "DELETE FROM conversations WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(())
    }
}

/// Volatile store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryConversationStore {
    rows: Mutex<HashMap<String, Conversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn load_all(&self) -> Result<HashMap<String, Conversation>, StoreError> {
        let rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.clone())
    }

    fn save(&self, user_id: &str, conversation: &Conversation) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        rows.insert(user_id.to_string(), conversation.clone());
        Ok(())
    }

    fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        rows.remove(user_id);
        Ok(())
    }
}
