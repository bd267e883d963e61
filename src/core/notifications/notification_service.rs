// Unread counters and the notification center.
//
// Notifications are fire-and-forget UI signals. The core never renders anything;
// it hands text to a `NotificationSink` and keeps a short list of recent ones.

use crate::core::chat::{ChatScope, Message};
use crate::core::ids::IdGenerator;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

/// How many notifications the center remembers.
pub const RECENT_NOTIFICATION_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Info,
    Success,
    Warning,
    Error,
    Message,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub text: String,
    pub severity: NotificationSeverity,
    pub scope: Option<ChatScope>,
    pub at: DateTime<Utc>,
}

/// Where toasts and incoming-message cues go. Implemented by the UI layer.
pub trait NotificationSink: Send + Sync {
    fn toast(&self, text: &str, severity: NotificationSeverity);

    /// Sound/visual cue for an inbound message.
    fn message_cue(&self, message: &Message);
}

pub struct NotificationLedger {
    // Scope ID -> unread count
    unread: DashMap<String, u32>,
    active: RwLock<ChatScope>,
    recent: Mutex<VecDeque<Notification>>,
    capacity: usize,
    sink: Arc<dyn NotificationSink>,
    ids: IdGenerator,
}

impl NotificationLedger {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_capacity(sink, RECENT_NOTIFICATION_CAPACITY)
    }

    pub fn with_capacity(sink: Arc<dyn NotificationSink>, capacity: usize) -> Self {
        Self {
            unread: DashMap::new(),
            active: RwLock::new(ChatScope::Public),
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sink,
            ids: IdGenerator::new(),
        }
    }

    /// Count an inbound message. Returns false if the scope is the active one.
    pub fn record_inbound(&self, scope: &ChatScope) -> bool {
        if *scope == self.active_scope() {
            return false;
        }
        *self.unread.entry(scope.id()).or_insert(0) += 1;
        true
    }

    /// Switch the active scope and clear its counter.
    pub fn mark_active(&self, scope: &ChatScope) {
        {
            let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
            *active = scope.clone();
        }
        self.unread.remove(&scope.id());
    }

    pub fn active_scope(&self) -> ChatScope {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self, scope: &ChatScope) -> u32 {
        self.unread.get(&scope.id()).map(|count| *count).unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.iter().map(|count| *count.value()).sum()
    }

    /// Raise a notification: remember it and toast it.
    pub fn notify(
        &self,
        text: impl Into<String>,
        severity: NotificationSeverity,
        scope: Option<ChatScope>,
        at: DateTime<Utc>,
    ) -> Notification {
        let notification = Notification {
            id: self.ids.next(at),
            text: text.into(),
            severity,
            scope,
            at,
        };

        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            recent.push_back(notification.clone());
            while recent.len() > self.capacity {
                recent.pop_front();
            }
        }

        self.sink.toast(&notification.text, severity);
        notification
    }

    /// Toast without recording (transient feedback such as "message not delivered").
    pub fn toast(&self, text: &str, severity: NotificationSeverity) {
        self.sink.toast(text, severity);
    }

    pub fn message_cue(&self, message: &Message) {
        self.sink.message_cue(message);
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Sink that remembers everything it was handed. Used by tests across the crate.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    pub toasts: Mutex<Vec<(String, NotificationSeverity)>>,
    pub cues: Mutex<Vec<u64>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn toasts(&self) -> Vec<(String, NotificationSeverity)> {
        self.toasts.lock().unwrap().clone()
    }

    pub fn cue_count(&self) -> usize {
        self.cues.lock().unwrap().len()
    }
}

#[cfg(test)]
impl NotificationSink for RecordingSink {
    fn toast(&self, text: &str, severity: NotificationSeverity) {
        self.toasts.lock().unwrap().push((text.to_string(), severity));
    }

    fn message_cue(&self, message: &Message) {
        self.cues.lock().unwrap().push(message.id);
    }
}
