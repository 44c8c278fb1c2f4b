//! Per-user conversation history.

use super::persist::ConversationStore;
use super::types::{Conversation, Role, Turn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory conversation log with write-through persistence.
///
/// Persistence is best-effort: a failed write is logged and the in-memory
/// state stays authoritative for the rest of the process lifetime.
pub struct HistoryStore {
    conversations: Mutex<HashMap<String, Conversation>>,
    backend: Arc<dyn ConversationStore>,
    system_prompt: String,
    max_turns: Option<usize>,
}

impl HistoryStore {
    /// Create a store, loading every persisted conversation from `backend`.
    pub fn new(backend: Arc<dyn ConversationStore>, system_prompt: impl Into<String>) -> Self {
        let conversations = match backend.load_all() {
            Ok(loaded) => {
                tracing::info!(conversations = loaded.len(), "Conversation history loaded");
                loaded
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conversation history, starting empty");
                HashMap::new()
            }
        };

        Self {
            conversations: Mutex::new(conversations),
            backend,
            system_prompt: system_prompt.into(),
            max_turns: None,
        }
    }

    /// Cap stored turns per user (seed included).
    pub fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Return the user's conversation, seeding it with the system turn on first use.
    pub async fn get(&self, user_id: &str) -> Conversation {
        let (conversation, seeded) = {
            let mut map = self.lock();
            let seeded = !map.contains_key(user_id);
            let conversation = map
                .entry(user_id.to_string())
                .or_insert_with(|| vec![Turn::system(self.system_prompt.clone())])
                .clone();
            (conversation, seeded)
        };

        if seeded {
            tracing::debug!(user_id = %user_id, "Conversation seeded");
            self.persist(user_id, conversation.clone()).await;
        }
        conversation
    }

    /// Append a turn and return the updated conversation.
    pub async fn append(
        &self,
        user_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Conversation {
        let conversation = {
            let mut map = self.lock();
            let turns = map
                .entry(user_id.to_string())
                .or_insert_with(|| vec![Turn::system(self.system_prompt.clone())]);
            turns.push(Turn::new(role, content));

            if role == Role::Assistant {
                if let Some(max) = self.max_turns {
                    trim_oldest(turns, max);
                }
            }
            turns.clone()
        };

        self.persist(user_id, conversation.clone()).await;
        conversation
    }

    /// Pop the most recently appended turn.
    pub async fn remove_last(&self, user_id: &str) -> Option<Turn> {
        let (removed, conversation) = {
            let mut map = self.lock();
            let turns = map.get_mut(user_id)?;
            (turns.pop(), turns.clone())
        };

        self.persist(user_id, conversation).await;
        removed
    }

    /// Discard the user's conversation entirely. The next `get` reseeds it.
    pub async fn clear(&self, user_id: &str) {
        let existed = self.lock().remove(user_id).is_some();

        let backend = self.backend.clone();
        let key = user_id.to_string();
        let result = tokio::task::spawn_blocking(move || backend.delete(&key)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to delete persisted conversation");
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Conversation delete task failed");
            }
        }
        tracing::debug!(user_id = %user_id, existed, "Conversation cleared");
    }

    /// Number of turns currently stored for the user, without seeding.
    pub fn len(&self, user_id: &str) -> usize {
        self.lock().get(user_id).map_or(0, Vec::len)
    }

    /// Whether the user has a conversation at all.
    pub fn contains(&self, user_id: &str) -> bool {
        self.lock().contains_key(user_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Conversation>> {
        // A poisoned map still holds consistent Vecs; keep serving it.
        self.conversations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Write a snapshot off the async workers. Callers for one user are
    /// serialized by the per-user queue, so snapshots land in order.
    async fn persist(&self, user_id: &str, conversation: Conversation) {
        let backend = self.backend.clone();
        let key = user_id.to_string();
        let result = tokio::task::spawn_blocking(move || backend.save(&key, &conversation)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to persist conversation");
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Conversation write task failed");
            }
        }
    }
}

/// Drop the oldest non-system turns until at most `max` remain.
///
/// Removal continues past the limit until the first kept turn is a user
/// turn, so an exchange is never split.
fn trim_oldest(turns: &mut Conversation, max: usize) {
    if turns.len() <= max {
        return;
    }
    let start = usize::from(turns.first().is_some_and(|t| t.role == Role::System));
    let mut end = (start + turns.len() - max).min(turns.len());
    while end < turns.len() && turns[end].role != Role::User {
        end += 1;
    }
    turns.drain(start..end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::persist::{MemoryConversationStore, StoreError};

    const SEED: &str = "Você é Yara.";

    fn store() -> (HistoryStore, Arc<MemoryConversationStore>) {
        let backend = Arc::new(MemoryConversationStore::new());
        (HistoryStore::new(backend.clone(), SEED), backend)
    }

    #[tokio::test]
    async fn get_seeds_once() {
        let (store, _) = store();
        let first = store.get("u1").await;
        let second = store.get("u1").await;
        assert_eq!(first, second);
        assert_eq!(second, vec![Turn::system(SEED)]);
    }

    #[tokio::test]
    async fn clear_then_get_reseeds() {
        let (store, backend) = store();
        store.get("u1").await;
        store.append("u1", Role::User, "oi").await;
        store.clear("u1").await;
        assert!(!store.contains("u1"));
        assert!(backend.load_all().unwrap().is_empty());

        assert_eq!(store.get("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn append_and_remove_last_restore_state() {
        let (store, _) = store();
        let before = store.get("u1").await;
        store.append("u1", Role::User, "Qual a capital da França?").await;
        assert_eq!(store.len("u1"), 2);

        let removed = store.remove_last("u1").await.unwrap();
        assert_eq!(removed.role, Role::User);
        assert_eq!(store.get("u1").await, before);
    }

    #[tokio::test]
    async fn remove_last_on_unknown_user() {
        let (store, _) = store();
        assert!(store.remove_last("ghost").await.is_none());
        assert!(!store.contains("ghost"));
    }

    #[tokio::test]
    async fn append_without_get_seeds_first() {
        let (store, _) = store();
        let conv = store.append("u1", Role::User, "oi").await;
        assert_eq!(conv[0].role, Role::System);
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let (store, _) = store();
        store.append("a", Role::User, "oi").await;
        store.get("b").await;
        assert_eq!(store.len("a"), 2);
        assert_eq!(store.len("b"), 1);
    }

    #[tokio::test]
    async fn mutations_are_written_through() {
        let (store, backend) = store();
        store.append("u1", Role::User, "oi").await;
        store.append("u1", Role::Assistant, "olá").await;

        let persisted = backend.load_all().unwrap();
        assert_eq!(persisted["u1"].len(), 3);
    }

    #[tokio::test]
    async fn history_survives_restart() {
        let backend = Arc::new(MemoryConversationStore::new());
        {
            let store = HistoryStore::new(backend.clone(), SEED);
            store.append("u1", Role::User, "oi").await;
        }

        let store = HistoryStore::new(backend, SEED);
        assert_eq!(store.get("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn unbounded_by_default() {
        let (store, _) = store();
        for i in 0..50 {
            store.append("u1", Role::User, format!("q{i}")).await;
            store.append("u1", Role::Assistant, format!("a{i}")).await;
        }
        assert_eq!(store.len("u1"), 101);
    }

    #[tokio::test]
    async fn max_turns_keeps_seed_and_newest() {
        let backend = Arc::new(MemoryConversationStore::new());
        let store = HistoryStore::new(backend, SEED).with_max_turns(Some(5));
        for i in 0..4 {
            store.append("u1", Role::User, format!("q{i}")).await;
            store.append("u1", Role::Assistant, format!("a{i}")).await;
        }

        let conv = store.get("u1").await;
        assert_eq!(conv.len(), 5);
        assert_eq!(conv[0], Turn::system(SEED));
        assert_eq!(conv[3], Turn::user("q3"));
        assert_eq!(conv[4], Turn::assistant("a3"));
    }

    #[tokio::test]
    async fn even_max_turns_never_starts_with_an_answer() {
        let backend = Arc::new(MemoryConversationStore::new());
        let store = HistoryStore::new(backend, SEED).with_max_turns(Some(4));
        for i in 0..3 {
            store.append("u1", Role::User, format!("q{i}")).await;
            store.append("u1", Role::Assistant, format!("a{i}")).await;

            let conv = store.get("u1").await;
            assert!(conv.len() <= 4);
            assert_eq!(conv[1].role, Role::User, "after exchange {i}: {conv:?}");
        }

        let conv = store.get("u1").await;
        assert_eq!(
            conv,
            vec![Turn::system(SEED), Turn::user("q2"), Turn::assistant("a2")]
        );
    }

    struct FailingStore;

    impl ConversationStore for FailingStore {
        fn load_all(&self) -> Result<HashMap<String, Conversation>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn save(&self, _: &str, _: &Conversation) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
        fn delete(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[tokio::test]
    async fn persistence_failures_are_not_fatal() {
        let store = HistoryStore::new(Arc::new(FailingStore), SEED);
        store.append("u1", Role::User, "oi").await;
        assert_eq!(store.len("u1"), 2);
        store.clear("u1").await;
        assert_eq!(store.get("u1").await.len(), 1);
    }
}
