// Storage port for moderation state.
//
// Every `load_*` returns records in insertion order so history replays the same
// way on every context.

use super::moderation_models::{
    AutoBanHistoryEntry, AutoBanPolicy, BanLift, BanRecord, SystemLogEntry, UnbanRequest,
    ViolationRecord, ViolationTracking,
};
use crate::core::storage::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Append to the audit log.
    async fn save_violation(&self, record: &ViolationRecord) -> Result<(), StoreError>;

    async fn load_violations(&self) -> Result<Vec<ViolationRecord>, StoreError>;

    /// Tracking state for a user; an empty state if none is stored.
    async fn get_tracking(&self, user_id: &str) -> Result<ViolationTracking, StoreError>;

    async fn save_tracking(
        &self,
        user_id: &str,
        tracking: &ViolationTracking,
    ) -> Result<(), StoreError>;

    async fn load_tracking(&self) -> Result<Vec<(String, ViolationTracking)>, StoreError>;

    /// Insert a new ban. Fails with `StoreError::Conflict` if the id is taken.
    async fn insert_ban(&self, ban: &BanRecord) -> Result<(), StoreError>;

    /// Mark a stored ban lifted. Returns false if no ban has that id.
    async fn mark_ban_lifted(&self, id: u64, lift: &BanLift) -> Result<bool, StoreError>;

    async fn load_bans(&self) -> Result<Vec<BanRecord>, StoreError>;

    async fn save_auto_ban(&self, entry: &AutoBanHistoryEntry) -> Result<(), StoreError>;

    async fn load_auto_bans(&self) -> Result<Vec<AutoBanHistoryEntry>, StoreError>;

    /// `None` until a policy has been saved.
    async fn get_policy(&self) -> Result<Option<AutoBanPolicy>, StoreError>;

    async fn save_policy(&self, policy: &AutoBanPolicy) -> Result<(), StoreError>;

    async fn append_log(&self, entry: &SystemLogEntry) -> Result<(), StoreError>;

    async fn load_logs(&self) -> Result<Vec<SystemLogEntry>, StoreError>;

    async fn save_unban_request(&self, request: &UnbanRequest) -> Result<(), StoreError>;

    async fn load_unban_requests(&self) -> Result<Vec<UnbanRequest>, StoreError>;

    /// Returns false if no request had that id.
    async fn delete_unban_request(&self, id: u64) -> Result<bool, StoreError>;
}
