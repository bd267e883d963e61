// Chat domain models - scopes, messages and the people who send them.
//
// These are pure domain types. Scope ids are the primary key for message lists,
// unread counters and typing sets, so they must be a pure function of their inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PUBLIC_SCOPE: &str = "public";
const PRIVATE_PREFIX: &str = "private:";
const GROUP_PREFIX: &str = "group:";
const PAIR_SEPARATOR: char = '|';

/// A conversation namespace.
///
/// Private scopes always hold their two participants in lexicographic order,
/// which is what makes `private(a, b) == private(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatScope {
    Public,
    Private { low: String, high: String },
    Group { channel_id: String },
}

impl ChatScope {
    /// Build the scope for a conversation between two users, in either order.
    pub fn private(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        ChatScope::Private {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    pub fn group(channel_id: impl Into<String>) -> Self {
        ChatScope::Group {
            channel_id: channel_id.into(),
        }
    }

    /// Recompute the canonical form. Peers may hand us a private pair in any order.
    pub fn normalized(self) -> Self {
        match self {
            ChatScope::Private { low, high } => ChatScope::private(&low, &high),
            other => other,
        }
    }

    /// The string key used for storage and counters.
    pub fn id(&self) -> String {
        match self {
            ChatScope::Public => PUBLIC_SCOPE.to_string(),
            ChatScope::Private { low, high } => {
                let (low, high) = if low <= high { (low, high) } else { (high, low) };
                format!("{PRIVATE_PREFIX}{low}{PAIR_SEPARATOR}{high}")
            }
            ChatScope::Group { channel_id } => format!("{GROUP_PREFIX}{channel_id}"),
        }
    }

    /// Does this scope include the given user? Public and group scopes are open to all.
    pub fn involves(&self, user_id: &str) -> bool {
        match self {
            ChatScope::Private { low, high } => low == user_id || high == user_id,
            _ => true,
        }
    }

    pub fn validate(&self) -> Result<(), ScopeParseError> {
        match self {
            ChatScope::Public => Ok(()),
            ChatScope::Private { low, high } => {
                if low.is_empty() || high.is_empty() {
                    return Err(ScopeParseError::EmptyParticipant);
                }
                if low.contains(PAIR_SEPARATOR) || high.contains(PAIR_SEPARATOR) {
                    return Err(ScopeParseError::Malformed(self.id()));
                }
                Ok(())
            }
            ChatScope::Group { channel_id } => {
                if channel_id.trim().is_empty() {
                    Err(ScopeParseError::EmptyChannel)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl Default for ChatScope {
    fn default() -> Self {
        ChatScope::Public
    }
}

impl fmt::Display for ChatScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeParseError {
    #[error("Malformed scope id: {0}")]
    Malformed(String),
    #[error("Private scope needs two participants")]
    EmptyParticipant,
    #[error("Group scope needs a channel id")]
    EmptyChannel,
}

impl FromStr for ChatScope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == PUBLIC_SCOPE {
            return Ok(ChatScope::Public);
        }

        if let Some(pair) = s.strip_prefix(PRIVATE_PREFIX) {
            let (a, b) = pair
                .split_once(PAIR_SEPARATOR)
                .ok_or_else(|| ScopeParseError::Malformed(s.to_string()))?;
            let scope = ChatScope::private(a, b);
            scope.validate()?;
            return Ok(scope);
        }

        if let Some(channel_id) = s.strip_prefix(GROUP_PREFIX) {
            let scope = ChatScope::group(channel_id);
            scope.validate()?;
            return Ok(scope);
        }

        Err(ScopeParseError::Malformed(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Emoji,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::Emoji => "emoji",
        };
        f.write_str(name)
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "file" => Ok(MessageKind::File),
            "emoji" => Ok(MessageKind::Emoji),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// A chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub scope: ChatScope,
    pub sender_id: String,
    pub sender_name: String,
    pub body: String,
    pub kind: MessageKind,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Sort key: sent time, ties broken by id.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.sent_at, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Moderator,
    Admin,
}

/// The locally authenticated actor. Read-only for the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
        }
    }
}

/// A group channel known to this context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl ChannelInfo {
    pub fn scope(&self) -> ChatScope {
        ChatScope::group(self.id.clone())
    }
}
