use dashmap::DashMap;
use log::warn;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;
use crate::cli::Args;
use crate::models::chat::UserId;
use crate::relay::{ self, RelayClient };
use crate::store::{ self, ConversationStore };

/// Composition root of the exchange pipeline: inbound message -> history
/// append -> relay call -> history append -> reply.
///
/// Exchanges for the same user are serialized by a per-user lock held for
/// the whole pipeline, including the outbound call; the conversation map is
/// sharded, so unrelated users never block each other.
pub struct RelayAgent {
    store: Arc<dyn ConversationStore>,
    relay: Arc<dyn RelayClient>,
    exchange_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl RelayAgent {
    pub fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let store = store::initialize_store(args);
        let relay = relay::new_client(args)?;
        Ok(Self::from_parts(store, relay))
    }

    pub fn from_parts(store: Arc<dyn ConversationStore>, relay: Arc<dyn RelayClient>) -> Self {
        Self {
            store,
            relay,
            exchange_locks: DashMap::new(),
        }
    }

    fn exchange_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.exchange_locks.entry(user_id).or_default().value().clone()
    }

    /// Run one full exchange. Always produces a reply text; relay failures
    /// surface as fallback texts and are recorded in history like any other
    /// assistant turn.
    pub async fn process_message(&self, user_id: UserId, message: &str) -> String {
        let lock = self.exchange_lock(user_id);
        let _guard = lock.lock().await;

        if let Err(e) = self.store.append_user_turn(user_id, message).await {
            warn!("History write (user) failed for {}: {}", user_id, e);
        }

        let history = match self.store.history_excluding_last(user_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!("History read failed for {}: {}", user_id, e);
                Vec::new()
            }
        };

        let reply = self.relay.relay(message, &history).await;

        if let Err(e) = self.store.append_assistant_turn(user_id, &reply).await {
            warn!("History write (assistant) failed for {}: {}", user_id, e);
        }

        reply
    }

    /// Discard the user's history and leave an empty conversation behind.
    pub async fn reset(&self, user_id: UserId) {
        let lock = self.exchange_lock(user_id);
        let _guard = lock.lock().await;

        if let Err(e) = self.store.reset(user_id).await {
            warn!("History reset failed for {}: {}", user_id, e);
        }
    }

    pub async fn conversation_count(&self) -> usize {
        self.store.conversation_count().await.unwrap_or(0)
    }

    #[cfg(test)]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use crate::models::chat::{ Role, Turn };
    use crate::store::MemoryStore;

    /// Echoes the message back with a marker, after yielding long enough to
    /// widen any interleaving window.
    struct EchoRelay;

    #[async_trait]
    impl RelayClient for EchoRelay {
        async fn relay(&self, message: &str, _history: &[Turn]) -> String {
            tokio::time::sleep(Duration::from_millis(10)).await;
            format!("echo:{}", message)
        }
    }

    /// Records the history snapshot it was handed, so tests can check what
    /// the endpoint would have received.
    struct SnapshottingRelay {
        seen: std::sync::Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl RelayClient for SnapshottingRelay {
        async fn relay(&self, message: &str, history: &[Turn]) -> String {
            self.seen.lock().unwrap().push(history.to_vec());
            format!("echo:{}", message)
        }
    }

    fn echo_agent() -> Arc<RelayAgent> {
        Arc::new(RelayAgent::from_parts(Arc::new(MemoryStore::new(0)), Arc::new(EchoRelay)))
    }

    #[tokio::test]
    async fn exchange_records_two_turns_in_order() {
        let agent = echo_agent();
        let reply = agent.process_message(1, "hello").await;
        assert_eq!(reply, "echo:hello");

        let turns = agent.store().turns(1).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "hello");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].content, "echo:hello");
    }

    #[tokio::test]
    async fn sequential_exchanges_land_in_submission_order() {
        let agent = echo_agent();
        agent.process_message(1, "one").await;
        agent.process_message(1, "two").await;

        let turns = agent.store().turns(1).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "echo:one", "two", "echo:two"]);
    }

    #[tokio::test]
    async fn concurrent_exchanges_for_one_user_never_interleave() {
        let agent = echo_agent();
        let first = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.process_message(1, "first").await }
        });
        let second = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.process_message(1, "second").await }
        });
        first.await.unwrap();
        second.await.unwrap();

        let turns = agent.store().turns(1).await.unwrap();
        assert_eq!(turns.len(), 4);
        // Each user turn must be followed immediately by its own echo.
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("echo:{}", pair[0].content));
        }
    }

    #[tokio::test]
    async fn relay_receives_history_without_the_new_message() {
        let relay = Arc::new(SnapshottingRelay {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let agent = RelayAgent::from_parts(
            Arc::new(MemoryStore::new(0)),
            Arc::clone(&relay) as Arc<dyn RelayClient>,
        );

        agent.process_message(1, "first").await;
        agent.process_message(1, "second").await;

        let seen = relay.seen.lock().unwrap();
        assert!(seen[0].is_empty());
        assert_eq!(seen[1].len(), 2);
        assert_eq!(seen[1][0].content, "first");
        assert_eq!(seen[1][1].content, "echo:first");
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_conversation() {
        let agent = echo_agent();
        agent.process_message(1, "one").await;
        agent.process_message(1, "two").await;
        agent.reset(1).await;
        assert!(agent.store().turns(1).await.unwrap().is_empty());

        agent.process_message(1, "three").await;
        let turns = agent.store().turns(1).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "three");
    }

    #[tokio::test]
    async fn users_are_isolated_from_each_other() {
        let agent = echo_agent();
        let a = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.process_message(1, "from one").await }
        });
        let b = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.process_message(2, "from two").await }
        });
        a.await.unwrap();
        b.await.unwrap();

        let first = agent.store().turns(1).await.unwrap();
        let second = agent.store().turns(2).await.unwrap();
        assert_eq!(first[0].content, "from one");
        assert_eq!(second[0].content, "from two");
        assert_eq!(agent.conversation_count().await, 2);
    }
}
