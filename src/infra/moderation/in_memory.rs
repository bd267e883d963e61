// In-memory implementation of ModerationStore.

use crate::core::moderation::{
    AutoBanHistoryEntry, AutoBanPolicy, BanLift, BanRecord, ModerationStore, SystemLogEntry,
    UnbanRequest, ViolationRecord, ViolationTracking,
};
use crate::core::storage::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Mutex, MutexGuard};

/// Lists keep insertion order; tracking is keyed by user id.
#[derive(Default)]
pub struct InMemoryModerationStore {
    violations: Mutex<Vec<ViolationRecord>>,
    tracking: DashMap<String, ViolationTracking>,
    bans: Mutex<Vec<BanRecord>>,
    auto_bans: Mutex<Vec<AutoBanHistoryEntry>>,
    policy: Mutex<Option<AutoBanPolicy>>,
    logs: Mutex<Vec<SystemLogEntry>>,
    unban_requests: Mutex<Vec<UnbanRequest>>,
}

impl InMemoryModerationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ModerationStore for InMemoryModerationStore {
    async fn save_violation(&self, record: &ViolationRecord) -> Result<(), StoreError> {
        lock(&self.violations).push(record.clone());
        Ok(())
    }

    async fn load_violations(&self) -> Result<Vec<ViolationRecord>, StoreError> {
        Ok(lock(&self.violations).clone())
    }

    async fn get_tracking(&self, user_id: &str) -> Result<ViolationTracking, StoreError> {
        Ok(self
            .tracking
            .get(user_id)
            .map(|tracking| tracking.clone())
            .unwrap_or_default())
    }

    async fn save_tracking(
        &self,
        user_id: &str,
        tracking: &ViolationTracking,
    ) -> Result<(), StoreError> {
        self.tracking.insert(user_id.to_string(), tracking.clone());
        Ok(())
    }

    async fn load_tracking(&self) -> Result<Vec<(String, ViolationTracking)>, StoreError> {
        let mut tracked: Vec<(String, ViolationTracking)> = self
            .tracking
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        tracked.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(tracked)
    }

    async fn insert_ban(&self, ban: &BanRecord) -> Result<(), StoreError> {
        let mut bans = lock(&self.bans);
        if bans.iter().any(|existing| existing.id == ban.id) {
            return Err(StoreError::Conflict(format!("ban {}", ban.id)));
        }
        bans.push(ban.clone());
        Ok(())
    }

    async fn mark_ban_lifted(&self, id: u64, lift: &BanLift) -> Result<bool, StoreError> {
        let mut bans = lock(&self.bans);
        match bans.iter_mut().find(|existing| existing.id == id) {
            Some(ban) => {
                ban.lifted = Some(lift.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn load_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        Ok(lock(&self.bans).clone())
    }

    async fn save_auto_ban(&self, entry: &AutoBanHistoryEntry) -> Result<(), StoreError> {
        lock(&self.auto_bans).push(entry.clone());
        Ok(())
    }

    async fn load_auto_bans(&self) -> Result<Vec<AutoBanHistoryEntry>, StoreError> {
        Ok(lock(&self.auto_bans).clone())
    }

    async fn get_policy(&self) -> Result<Option<AutoBanPolicy>, StoreError> {
        Ok(lock(&self.policy).clone())
    }

    async fn save_policy(&self, policy: &AutoBanPolicy) -> Result<(), StoreError> {
        *lock(&self.policy) = Some(policy.clone());
        Ok(())
    }

    async fn append_log(&self, entry: &SystemLogEntry) -> Result<(), StoreError> {
        lock(&self.logs).push(entry.clone());
        Ok(())
    }

    async fn load_logs(&self) -> Result<Vec<SystemLogEntry>, StoreError> {
        Ok(lock(&self.logs).clone())
    }

    async fn save_unban_request(&self, request: &UnbanRequest) -> Result<(), StoreError> {
        lock(&self.unban_requests).push(request.clone());
        Ok(())
    }

    async fn load_unban_requests(&self) -> Result<Vec<UnbanRequest>, StoreError> {
        Ok(lock(&self.unban_requests).clone())
    }

    async fn delete_unban_request(&self, id: u64) -> Result<bool, StoreError> {
        let mut requests = lock(&self.unban_requests);
        let before = requests.len();
        requests.retain(|request| request.id != id);
        Ok(requests.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{BanExpiry, IssuedBy};
    use chrono::Utc;

    fn ban(id: u64, user_id: &str) -> BanRecord {
        BanRecord {
            id,
            user_id: user_id.to_string(),
            reason: format!("spam from {user_id}"),
            issued_at: Utc::now(),
            expires_at: BanExpiry::Permanent,
            issued_by: IssuedBy::User("mod@example.com".to_string()),
            level: None,
            duration_hours: None,
            lifted: None,
        }
    }

    #[tokio::test]
    async fn test_lifting_a_ban_updates_it_in_place() {
        let store = InMemoryModerationStore::new();
        let mut ban = ban(1, "user@example.com");
        store.insert_ban(&ban).await.unwrap();

        let lift = BanLift {
            by: "mod@example.com".to_string(),
            at: Utc::now(),
        };
        assert!(store.mark_ban_lifted(1, &lift).await.unwrap());
        assert!(!store.mark_ban_lifted(2, &lift).await.unwrap());

        ban.lifted = Some(lift);
        assert_eq!(store.load_bans().await.unwrap(), vec![ban]);
    }

    #[tokio::test]
    async fn test_duplicate_ban_id_is_rejected() {
        let store = InMemoryModerationStore::new();
        let alice = ban(1, "alice@example.com");
        store.insert_ban(&alice).await.unwrap();

        let err = store.insert_ban(&ban(1, "bob@example.com")).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.load_bans().await.unwrap(), vec![alice]);
    }
}
