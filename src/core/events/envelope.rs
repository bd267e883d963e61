// The unit of cross-context broadcast.
//
// Every envelope kind is a variant with its own typed payload, so handlers match
// exhaustively and a new kind is a compile-time change everywhere it matters.

use crate::core::chat::{ChannelInfo, ChatScope, Message};
use crate::core::notifications::NotificationSeverity;
use crate::core::presence::{PresenceEntry, PresenceStatus};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one execution context (one tab, one process) on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn generate() -> Self {
        let suffix: u32 = rand::thread_rng().gen();
        ContextId(format!("ctx-{}-{:08x}", Utc::now().timestamp_millis(), suffix))
    }
}

impl From<&str> for ContextId {
    fn from(value: &str) -> Self {
        ContextId(value.to_string())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// "User started/stopped typing in this scope."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub scope: ChatScope,
    pub user_id: String,
    pub display_name: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub text: String,
    pub severity: NotificationSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotice {
    pub scope: Option<ChatScope>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub user_id: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum EnvelopeBody {
    Message(Message),
    Presence(PresenceEntry),
    Typing(TypingSignal),
    Notification(NotificationPayload),
    UserList(Vec<PresenceEntry>),
    ChannelUpdate(ChannelInfo),
    System(SystemNotice),
    Heartbeat(Heartbeat),
}

impl EnvelopeBody {
    pub fn kind(&self) -> &'static str {
        match self {
            EnvelopeBody::Message(_) => "message",
            EnvelopeBody::Presence(_) => "presence",
            EnvelopeBody::Typing(_) => "typing",
            EnvelopeBody::Notification(_) => "notification",
            EnvelopeBody::UserList(_) => "user_list",
            EnvelopeBody::ChannelUpdate(_) => "channel_update",
            EnvelopeBody::System(_) => "system",
            EnvelopeBody::Heartbeat(_) => "heartbeat",
        }
    }
}

/// Transient; never stored beyond delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: ContextId,
    pub origin_timestamp: DateTime<Utc>,
    pub body: EnvelopeBody,
}

impl Envelope {
    pub fn new(origin: ContextId, origin_timestamp: DateTime<Utc>, body: EnvelopeBody) -> Self {
        Self {
            origin,
            origin_timestamp,
            body,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}
