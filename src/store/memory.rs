use async_trait::async_trait;
use dashmap::DashMap;
use log::error;
use std::error::Error;
use crate::models::chat::{ Role, Turn, UserId };
use crate::store::ConversationStore;

/// Process-local conversation store. The map is sharded, so operations on
/// unrelated users never contend on a common lock; per-user exchange
/// ordering is the caller's responsibility (see `RelayAgent`).
pub struct MemoryStore {
    conversations: DashMap<UserId, Vec<Turn>>,
    max_turns: usize,
}

impl MemoryStore {
    /// `max_turns` of 0 keeps history unbounded. A positive cap evicts the
    /// oldest turns first once the conversation exceeds it.
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            max_turns,
        }
    }

    fn push(&self, user_id: UserId, turn: Turn) {
        let mut entry = self.conversations.entry(user_id).or_default();
        entry.push(turn);
        if self.max_turns > 0 && entry.len() > self.max_turns {
            let excess = entry.len() - self.max_turns;
            entry.drain(0..excess);
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn reset(&self, user_id: UserId) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.conversations.insert(user_id, Vec::new());
        Ok(())
    }

    async fn append_user_turn(
        &self,
        user_id: UserId,
        content: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.push(user_id, Turn::user(content));
        Ok(())
    }

    async fn append_assistant_turn(
        &self,
        user_id: UserId,
        content: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let last_is_user = self.conversations
            .get(&user_id)
            .map(|turns| matches!(turns.last(), Some(turn) if turn.role == Role::User))
            .unwrap_or(false);
        debug_assert!(last_is_user, "assistant turn appended without a preceding user turn");
        if !last_is_user {
            error!(
                "Pipeline ordering bug: assistant turn for user {} has no preceding user turn",
                user_id
            );
        }

        // Record the reply regardless, so history matches what the user was
        // actually told.
        self.push(user_id, Turn::assistant(content));
        Ok(())
    }

    async fn history_excluding_last(
        &self,
        user_id: UserId
    ) -> Result<Vec<Turn>, Box<dyn Error + Send + Sync>> {
        let history = self.conversations
            .get(&user_id)
            .map(|turns| {
                let end = turns.len().saturating_sub(1);
                turns[..end].to_vec()
            })
            .unwrap_or_default();
        Ok(history)
    }

    async fn turns(&self, user_id: UserId) -> Result<Vec<Turn>, Box<dyn Error + Send + Sync>> {
        Ok(self.conversations.get(&user_id).map(|turns| turns.value().clone()).unwrap_or_default())
    }

    async fn conversation_count(&self) -> Result<usize, Box<dyn Error + Send + Sync>> {
        Ok(self.conversations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exchange_appends_alternating_turns() {
        let store = MemoryStore::new(0);
        for i in 0..3 {
            store.append_user_turn(1, &format!("question {}", i)).await.unwrap();
            store.append_assistant_turn(1, &format!("answer {}", i)).await.unwrap();
        }

        let turns = store.turns(1).await.unwrap();
        assert_eq!(turns.len(), 6);
        for (i, turn) in turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
    }

    #[tokio::test]
    async fn history_excluding_last_drops_only_the_newest_turn() {
        let store = MemoryStore::new(0);
        assert!(store.history_excluding_last(1).await.unwrap().is_empty());

        store.append_user_turn(1, "first").await.unwrap();
        assert!(store.history_excluding_last(1).await.unwrap().is_empty());

        store.append_assistant_turn(1, "reply").await.unwrap();
        store.append_user_turn(1, "second").await.unwrap();

        let full = store.turns(1).await.unwrap();
        let history = store.history_excluding_last(1).await.unwrap();
        assert_eq!(history.len(), full.len() - 1);
        for (kept, original) in history.iter().zip(full.iter()) {
            assert_eq!(kept.content, original.content);
            assert_eq!(kept.role, original.role);
        }
    }

    #[tokio::test]
    async fn reset_clears_history_and_leaves_an_empty_conversation() {
        let store = MemoryStore::new(0);
        store.append_user_turn(1, "hello").await.unwrap();
        store.append_assistant_turn(1, "hi").await.unwrap();

        store.reset(1).await.unwrap();
        assert!(store.turns(1).await.unwrap().is_empty());
        assert_eq!(store.conversation_count().await.unwrap(), 1);

        store.append_user_turn(1, "again").await.unwrap();
        store.append_assistant_turn(1, "sure").await.unwrap();
        assert_eq!(store.turns(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reset_creates_an_empty_conversation_for_a_new_user() {
        let store = MemoryStore::new(0);
        store.reset(42).await.unwrap();
        assert_eq!(store.conversation_count().await.unwrap(), 1);
        assert!(store.turns(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn users_never_see_each_others_history() {
        let store = MemoryStore::new(0);
        store.append_user_turn(1, "from one").await.unwrap();
        store.append_assistant_turn(1, "to one").await.unwrap();
        store.append_user_turn(2, "from two").await.unwrap();

        let first = store.turns(1).await.unwrap();
        let second = store.turns(2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].content, "from two");

        store.reset(1).await.unwrap();
        assert_eq!(store.turns(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cap_evicts_oldest_turns_first() {
        let store = MemoryStore::new(4);
        for i in 0..3 {
            store.append_user_turn(1, &format!("q{}", i)).await.unwrap();
            store.append_assistant_turn(1, &format!("a{}", i)).await.unwrap();
        }

        let turns = store.turns(1).await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "q1");
        assert_eq!(turns[3].content, "a2");
    }
}
