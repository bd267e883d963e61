// Typing indicators - ephemeral, per-scope, self-expiring.
//
// A "started typing" signal holds for TYPING_TTL_SECS unless refreshed. Expired
// entries are filtered out on every read and physically removed by `sweep`, so a
// peer that crashes mid-sentence disappears without ever sending "stopped".

use crate::core::chat::ChatScope;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

pub const TYPING_TTL_SECS: i64 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct TypingEntry {
    pub scope: ChatScope,
    pub user_id: String,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TypingCoordinator {
    // (scope id, user id) -> entry
    entries: DashMap<(String, String), TypingEntry>,
    ttl: Duration,
}

impl TypingCoordinator {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(TYPING_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Insert or refresh; expiry becomes `now + ttl`.
    pub fn set_typing(&self, scope: &ChatScope, user_id: &str, display_name: &str, now: DateTime<Utc>) {
        let entry = TypingEntry {
            scope: scope.clone(),
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            expires_at: now + self.ttl,
        };
        self.entries
            .insert((scope.id(), user_id.to_string()), entry);
    }

    /// Remove immediately. Returns whether anything was removed.
    pub fn clear_typing(&self, scope: &ChatScope, user_id: &str) -> bool {
        self.entries
            .remove(&(scope.id(), user_id.to_string()))
            .is_some()
    }

    /// Forget a user everywhere (they went offline).
    pub fn clear_user(&self, user_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, user), _| user != user_id);
        before - self.entries.len()
    }

    /// Names of everyone still typing in `scope`, sorted.
    pub fn typing_names(&self, scope: &ChatScope, now: DateTime<Utc>) -> Vec<String> {
        let scope_id = scope.id();
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == scope_id && entry.expires_at > now)
            .map(|entry| entry.display_name.clone())
            .collect();
        names.sort();
        names
    }

    /// Human-readable indicator for `scope`, or `None` if nobody is typing.
    pub fn indicator(&self, scope: &ChatScope, now: DateTime<Utc>) -> Option<String> {
        format_indicator(&self.typing_names(scope, now))
    }

    /// Drop expired entries. Returns what was removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<TypingEntry> {
        let expired: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|(_, entry)| entry))
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_indicator(names: &[String]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(format!("{one} is typing…")),
        many => Some(format!("{} are typing…", many.join(", "))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_expires_without_a_refresh() {
        let typing = TypingCoordinator::new();
        let scope = ChatScope::Public;
        let start = Utc::now();

        typing.set_typing(&scope, "u1", "Alice", start);
        assert_eq!(typing.typing_names(&scope, start), vec!["Alice".to_string()]);

        let later = start + Duration::milliseconds(3_001);
        assert!(typing.typing_names(&scope, later).is_empty());
    }

    #[test]
    fn test_refreshing_extends_the_expiry() {
        let typing = TypingCoordinator::new();
        let scope = ChatScope::Public;
        let start = Utc::now();

        typing.set_typing(&scope, "u1", "Alice", start);
        typing.set_typing(&scope, "u1", "Alice", start + Duration::seconds(2));

        let names = typing.typing_names(&scope, start + Duration::seconds(4));
        assert_eq!(names, vec!["Alice".to_string()]);
    }

    #[test]
    fn test_clear_removes_immediately() {
        let typing = TypingCoordinator::new();
        let scope = ChatScope::group("general");
        let now = Utc::now();

        typing.set_typing(&scope, "u1", "Alice", now);
        assert!(typing.clear_typing(&scope, "u1"));
        assert!(!typing.clear_typing(&scope, "u1"));

        assert!(typing.indicator(&scope, now).is_none());
    }

    #[test]
    fn test_scopes_do_not_leak_into_each_other() {
        let typing = TypingCoordinator::new();
        let now = Utc::now();

        typing.set_typing(&ChatScope::Public, "u1", "Alice", now);

        assert!(typing
            .typing_names(&ChatScope::private("u1", "u2"), now)
            .is_empty());
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let typing = TypingCoordinator::new();
        let scope = ChatScope::Public;
        let start = Utc::now();

        typing.set_typing(&scope, "u1", "Alice", start);
        typing.set_typing(&scope, "u2", "Bob", start + Duration::seconds(2));

        let removed = typing.sweep(start + Duration::seconds(4));

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].user_id, "u1");
        assert_eq!(typing.len(), 1);
    }

    #[test]
    fn test_clearing_a_user_drops_them_from_every_scope() {
        let typing = TypingCoordinator::new();
        let now = Utc::now();
        typing.set_typing(&ChatScope::Public, "u1", "Alice", now);
        typing.set_typing(&ChatScope::group("g"), "u1", "Alice", now);
        typing.set_typing(&ChatScope::Public, "u2", "Bob", now);

        assert_eq!(typing.clear_user("u1"), 2);
        assert_eq!(typing.len(), 1);
    }

    #[test]
    fn test_indicator_text_depends_on_how_many_are_typing() {
        assert_eq!(format_indicator(&[]), None);
        assert_eq!(
            format_indicator(&["Alice".to_string()]),
            Some("Alice is typing…".to_string())
        );
        assert_eq!(
            format_indicator(&["Alice".to_string(), "Bob".to_string()]),
            Some("Alice, Bob are typing…".to_string())
        );
    }
}
