// In-memory implementation of MessageStore.
//
// Good for tests and for running several sessions in one process without a
// database. Nothing survives a restart.

use crate::core::chat::{ChannelInfo, ChatScope, Message, MessageStore};
use crate::core::storage::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryMessageStore {
    // Scope ID -> messages in insertion order
    messages: DashMap<String, Vec<Message>>,
    channels: Mutex<Vec<ChannelInfo>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save_message(&self, message: &Message) -> Result<u64, StoreError> {
        let mut messages = self.messages.entry(message.scope.id()).or_default();
        let duplicate = messages
            .iter()
            .any(|m| m.id == message.id && m.sender_id == message.sender_id);
        if !duplicate {
            messages.push(message.clone());
        }
        Ok(message.id)
    }

    async fn load_messages(&self, scope: &ChatScope) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .get(&scope.id())
            .map(|messages| messages.clone())
            .unwrap_or_default())
    }

    async fn save_channel(&self, channel: &ChannelInfo) -> Result<(), StoreError> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        match channels.iter_mut().find(|c| c.id == channel.id) {
            Some(existing) => *existing = channel.clone(),
            None => channels.push(channel.clone()),
        }
        Ok(())
    }

    async fn load_channels(&self) -> Result<Vec<ChannelInfo>, StoreError> {
        Ok(self
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat::MessageKind;
    use chrono::Utc;

    fn message(id: u64, scope: ChatScope) -> Message {
        Message {
            id,
            scope,
            sender_id: "u1".to_string(),
            sender_name: "Alice".to_string(),
            body: format!("message {id}"),
            kind: MessageKind::Text,
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_messages_are_kept_per_scope_in_insertion_order() {
        let store = InMemoryMessageStore::new();
        store.save_message(&message(2, ChatScope::Public)).await.unwrap();
        store.save_message(&message(1, ChatScope::Public)).await.unwrap();
        store
            .save_message(&message(3, ChatScope::group("study")))
            .await
            .unwrap();

        let public: Vec<u64> = store
            .load_messages(&ChatScope::Public)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(public, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_saving_the_same_message_twice_stores_it_once() {
        let store = InMemoryMessageStore::new();
        let m = message(1, ChatScope::Public);

        store.save_message(&m).await.unwrap();
        store.save_message(&m).await.unwrap();

        assert_eq!(store.load_messages(&ChatScope::Public).await.unwrap().len(), 1);
    }
}
