use super::chat_models::{ChannelInfo, ChatScope, Message};
use crate::core::storage::StoreError;
use async_trait::async_trait;

/// Persistence port for chat history.
///
/// Implementations must return messages in insertion order so a context that
/// reloads a scope replays it the same way every time.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. Returns the stored id.
    async fn save_message(&self, message: &Message) -> Result<u64, StoreError>;

    /// All persisted messages of one scope, oldest first.
    async fn load_messages(&self, scope: &ChatScope) -> Result<Vec<Message>, StoreError>;

    async fn save_channel(&self, channel: &ChannelInfo) -> Result<(), StoreError>;

    async fn load_channels(&self) -> Result<Vec<ChannelInfo>, StoreError>;
}
