mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::models::chat::{ Turn, UserId };

/// Per-user conversation history. One conversation per user identifier,
/// appended in strict chronological order: a user turn, then the assistant
/// turn of the same exchange.
///
/// The in-memory implementation never fails; the `Result` signatures exist
/// so an external store can be swapped in behind the same seam.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create or overwrite the conversation with an empty one. Prior
    /// history for the user is discarded.
    async fn reset(&self, user_id: UserId) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Append a user turn, creating the conversation if absent.
    async fn append_user_turn(
        &self,
        user_id: UserId,
        content: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Append an assistant turn. The conversation must already exist and
    /// end with a user turn; the exchange pipeline guarantees this.
    async fn append_assistant_turn(
        &self,
        user_id: UserId,
        content: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Everything up to but not including the most recent turn. Empty when
    /// the conversation has at most one turn or does not exist.
    async fn history_excluding_last(
        &self,
        user_id: UserId
    ) -> Result<Vec<Turn>, Box<dyn Error + Send + Sync>>;

    /// Full snapshot of the conversation.
    async fn turns(&self, user_id: UserId) -> Result<Vec<Turn>, Box<dyn Error + Send + Sync>>;

    /// Number of live conversations.
    async fn conversation_count(&self) -> Result<usize, Box<dyn Error + Send + Sync>>;
}

pub fn initialize_store(args: &Args) -> Arc<dyn ConversationStore> {
    if args.history_max_turns > 0 {
        info!(
            "Conversation history held in process memory, capped at {} turns per user",
            args.history_max_turns
        );
    } else {
        info!("Conversation history held in process memory, unbounded");
    }
    Arc::new(MemoryStore::new(args.history_max_turns))
}
