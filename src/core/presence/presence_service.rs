// Presence tracking - who is online in this context's view of the world.
//
// Each context rebuilds the presence map from inbound envelopes. Nothing here is
// shared across contexts; conflicting updates resolve as last writer wins.

use crate::core::chat::{Identity, Role};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

impl PresenceStatus {
    /// `offline -> online -> (away <-> online) -> offline`
    pub fn can_transition_to(self, next: PresenceStatus) -> bool {
        use PresenceStatus::*;
        matches!(
            (self, next),
            (Offline, Online) | (Online, Away) | (Away, Online) | (Online, Offline) | (Away, Offline)
        )
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Offline => "offline",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub status: PresenceStatus,
    pub last_seen_at: DateTime<Utc>,
}

impl PresenceEntry {
    pub fn for_identity(identity: &Identity, status: PresenceStatus, at: DateTime<Utc>) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            role: identity.role,
            status,
            last_seen_at: at,
        }
    }
}

/// What applying an update did to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Joined,
    Updated,
    Unchanged,
    Left,
    /// An offline signal for someone we never saw.
    Ignored,
}

#[derive(Default)]
pub struct PresenceTracker {
    // User ID -> latest known entry
    entries: DashMap<String, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or overwrite an entry. Applying the same entry twice changes nothing.
    pub fn add_or_update(&self, entry: PresenceEntry) -> PresenceChange {
        let same = self
            .entries
            .get(&entry.user_id)
            .map(|existing| *existing == entry);

        match same {
            Some(true) => PresenceChange::Unchanged,
            Some(false) => {
                self.entries.insert(entry.user_id.clone(), entry);
                PresenceChange::Updated
            }
            None => {
                self.entries.insert(entry.user_id.clone(), entry);
                PresenceChange::Joined
            }
        }
    }

    /// No-op if the user is not present.
    pub fn remove(&self, user_id: &str) -> Option<PresenceEntry> {
        self.entries.remove(user_id).map(|(_, entry)| entry)
    }

    /// Apply an inbound presence update: offline removes, anything else upserts.
    pub fn apply(&self, entry: PresenceEntry) -> PresenceChange {
        if entry.status == PresenceStatus::Offline {
            return match self.remove(&entry.user_id) {
                Some(_) => PresenceChange::Left,
                None => PresenceChange::Ignored,
            };
        }
        self.add_or_update(entry)
    }

    /// Refresh last-seen from a heartbeat. Returns false if the user is unknown.
    pub fn touch(&self, user_id: &str, status: PresenceStatus, at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(user_id) {
            Some(mut entry) => {
                if at > entry.last_seen_at {
                    entry.last_seen_at = at;
                }
                if status != PresenceStatus::Offline {
                    entry.status = status;
                }
                true
            }
            None => false,
        }
    }

    /// Drop peers that stopped heartbeating. `keep` (the local user) is never pruned.
    pub fn prune_stale(&self, now: DateTime<Utc>, max_age: Duration, keep: &str) -> Vec<PresenceEntry> {
        let cutoff = now - max_age;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key() != keep && entry.last_seen_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|user_id| self.remove(&user_id))
            .collect()
    }

    pub fn get(&self, user_id: &str) -> Option<PresenceEntry> {
        self.entries.get(user_id).map(|entry| entry.clone())
    }

    /// Snapshot of everyone present, sorted by display name.
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        entries
    }

    pub fn online_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == PresenceStatus::Online)
            .count()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
