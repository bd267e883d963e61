// Message router - outbound sends and inbound fan-in for every chat scope.
//
// Sends are optimistic: the sender's own view is updated before persistence
// finishes, so a slow store never hides a message from its author. Inbound
// messages only touch in-memory state and never wait on I/O.

use super::chat_models::{ChatScope, Message, MessageKind};
use super::chat_store::MessageStore;
use crate::core::clock::Clock;
use crate::core::events::{EnvelopeBody, EventBus};
use crate::core::ids::IdGenerator;
use crate::core::notifications::{NotificationLedger, NotificationSeverity};
use crate::core::storage::StoreError;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

/// How many messages each scope keeps in the local view.
pub const MAX_VIEW_MESSAGES: usize = 100;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Persistence(#[from] StoreError),

    #[error("{0} is currently banned")]
    Banned(String),

    #[error("Message contains the restricted word \"{0}\"")]
    Restricted(String),
}

/// Result of an accepted send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message: Message,
    /// False when the store rejected the message. It was still shown and broadcast.
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundOutcome {
    pub scope: ChatScope,
    pub counted_unread: bool,
}

// ============================================================================
// ROUTER
// ============================================================================

pub struct MessageRouter<S: MessageStore> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    ledger: Arc<NotificationLedger>,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
    // Scope ID -> messages in the order this context saw them
    view: DashMap<String, Vec<Message>>,
    view_capacity: usize,
}

impl<S: MessageStore> MessageRouter<S> {
    pub fn new(
        store: Arc<S>,
        bus: Arc<dyn EventBus>,
        ledger: Arc<NotificationLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            bus,
            ledger,
            clock,
            ids: IdGenerator::new(),
            view: DashMap::new(),
            view_capacity: MAX_VIEW_MESSAGES,
        }
    }

    /// Send a message to `scope`.
    ///
    /// Rejects blank bodies before anything is stored or published. Once accepted the
    /// message is appended locally, broadcast, then persisted; a storage failure is
    /// reported through the notification sink and `SendReceipt::persisted`.
    pub async fn send(
        &self,
        scope: ChatScope,
        sender_id: &str,
        sender_name: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<SendReceipt, ChatError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ChatError::Validation(
                "Message body cannot be empty".to_string(),
            ));
        }
        if sender_id.trim().is_empty() {
            return Err(ChatError::Validation("Sender id is required".to_string()));
        }
        let scope = scope.normalized();
        scope
            .validate()
            .map_err(|e| ChatError::Validation(e.to_string()))?;

        let now = self.clock.now();
        let message = Message {
            id: self.ids.next(now),
            scope,
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            body: body.to_string(),
            kind,
            sent_at: now,
        };

        self.append(message.clone());
        self.bus
            .publish(EnvelopeBody::Message(message.clone()), now);

        let persisted = match self.store.save_message(&message).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    message_id = message.id,
                    scope = %message.scope,
                    "Failed to persist message: {}",
                    e
                );
                self.ledger.toast(
                    "Your message was shown but could not be saved. Delivery is unconfirmed.",
                    NotificationSeverity::Error,
                );
                false
            }
        };

        tracing::debug!(
            message_id = message.id,
            scope = %message.scope,
            persisted,
            "Message sent"
        );

        Ok(SendReceipt { message, persisted })
    }

    /// Apply a message that arrived from another context.
    pub fn on_inbound(&self, mut message: Message) -> Result<InboundOutcome, ChatError> {
        message.scope = message.scope.normalized();
        message
            .scope
            .validate()
            .map_err(|e| ChatError::Validation(e.to_string()))?;

        let scope = message.scope.clone();
        self.append(message.clone());

        let counted_unread = self.ledger.record_inbound(&scope);
        if counted_unread {
            self.ledger.notify(
                format!("{}: {}", message.sender_name, message.body),
                NotificationSeverity::Message,
                Some(scope.clone()),
                self.clock.now(),
            );
        }
        self.ledger.message_cue(&message);

        Ok(InboundOutcome {
            scope,
            counted_unread,
        })
    }

    /// The local view of one scope, in receive order.
    pub fn messages(&self, scope: &ChatScope) -> Vec<Message> {
        self.view
            .get(&scope.id())
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Load persisted history for `scope` and merge it into the local view.
    pub async fn history(&self, scope: &ChatScope) -> Result<Vec<Message>, ChatError> {
        let persisted = self.store.load_messages(scope).await?;

        let mut merged = self.messages(scope);
        for message in persisted {
            if !merged.iter().any(|m| same_message(m, &message)) {
                merged.push(message);
            }
        }
        merged.sort_by_key(|m| m.order_key());
        if merged.len() > self.view_capacity {
            merged.drain(..merged.len() - self.view_capacity);
        }

        self.view.insert(scope.id(), merged.clone());
        Ok(merged)
    }

    fn append(&self, message: Message) {
        let mut messages = self.view.entry(message.scope.id()).or_default();
        if messages.iter().any(|m| same_message(m, &message)) {
            return;
        }
        messages.push(message);
        if messages.len() > self.view_capacity {
            let overflow = messages.len() - self.view_capacity;
            messages.drain(..overflow);
        }
    }
}

fn same_message(a: &Message, b: &Message) -> bool {
    a.id == b.id && a.sender_id == b.sender_id
}

// ============================================================================
// TESTS
// ============================================================================
