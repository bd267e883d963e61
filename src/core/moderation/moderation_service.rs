// Moderation service - violation audit trail, auto-ban engine and manual bans.
//
// This service handles:
// - Recording violations (always, regardless of policy)
// - Escalating auto-bans when a user crosses the policy threshold
// - Manual ban / unban / ban edits and unban requests
// - Reporting over violations and bans
//
// Being banned is computed at query time from the most recent BanRecord, so an
// expired ban needs no sweep to stop applying.

use super::moderation_models::{
    AutoBanHistoryEntry, AutoBanPolicy, AutoBanStats, BanDuration, BanExpiry, BanLevel, BanLift,
    BanRecord, IssuedBy, LogKind, OffenderSummary, SystemLogEntry, TrackingSummary,
    UnbanRequest, ViolationOutcome, ViolationRecord, ViolationSeverity, ViolationTracking,
};
use super::moderation_store::ModerationStore;
use crate::core::clock::Clock;
use crate::core::ids::IdGenerator;
use crate::core::notifications::{NotificationSeverity, NotificationSink};
use crate::core::storage::StoreError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// `retryable` is false when part of the operation already committed and
    /// repeating it would duplicate records.
    #[error("Storage error: {source}")]
    Persistence { source: StoreError, retryable: bool },

    #[error("Auto-ban policy is misconfigured: {0}")]
    PolicyMisconfiguration(String),

    #[error("{0} is already banned")]
    AlreadyBanned(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ModerationError {
    fn retryable(source: StoreError) -> Self {
        ModerationError::Persistence {
            source,
            retryable: true,
        }
    }

    fn committed(source: StoreError) -> Self {
        ModerationError::Persistence {
            source,
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ModerationError::Persistence { retryable: true, .. })
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// How many fresh ids a new ban gets when other contexts keep taking them.
const BAN_INSERT_ATTEMPTS: usize = 5;

pub struct ModerationService<S: ModerationStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    ids: IdGenerator,
    // Serializes the tracking read-modify-write within this process
    violation_lock: Mutex<()>,
}

impl<S: ModerationStore> ModerationService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            clock,
            sink,
            ids: IdGenerator::new(),
            violation_lock: Mutex::new(()),
        }
    }

    // ========================================================================
    // VIOLATIONS AND AUTO-BAN
    // ========================================================================

    /// Record a violation and run the auto-ban engine.
    ///
    /// The violation is written to the audit log and the tracking state first, no matter
    /// what the policy says. If the policy is enabled and the user crosses the threshold
    /// within the window, a ban is issued and the tracking state is wiped.
    ///
    /// If the ban cannot be persisted the violation stays recorded and a retryable
    /// `Persistence` error is returned.
    pub async fn record_violation(
        &self,
        user_id: &str,
        category: &str,
        detail: &str,
        severity: ViolationSeverity,
    ) -> Result<ViolationOutcome, ModerationError> {
        require("user id", user_id)?;
        require("category", category)?;

        let _guard = self.violation_lock.lock().await;
        let now = self.clock.now();

        let record = ViolationRecord {
            id: self.ids.next(now),
            user_id: user_id.to_string(),
            category: category.to_string(),
            detail: detail.to_string(),
            severity,
            occurred_at: now,
        };
        self.store
            .save_violation(&record)
            .await
            .map_err(ModerationError::retryable)?;

        let mut tracking = self
            .store
            .get_tracking(user_id)
            .await
            .map_err(ModerationError::committed)?;
        tracking.record(now);
        self.store
            .save_tracking(user_id, &tracking)
            .await
            .map_err(ModerationError::committed)?;

        tracing::info!(
            user_id,
            category,
            %severity,
            total = tracking.count,
            "Violation recorded"
        );

        // Policy can change at runtime, so it is read fresh for every violation
        let policy = self.active_policy().await?;
        let recent_count = tracking.recent_count(now, policy.window());

        let level = if policy.enabled {
            BanLevel::for_recent_count(recent_count, policy.threshold_count)
        } else {
            None
        };
        let auto_ban = match level {
            Some(level) => Some(
                self.apply_auto_ban(user_id, recent_count, level, &policy, &mut tracking, now)
                    .await?,
            ),
            None => None,
        };

        Ok(ViolationOutcome {
            record,
            recent_count,
            auto_ban,
        })
    }

    async fn apply_auto_ban(
        &self,
        user_id: &str,
        recent_count: u32,
        level: BanLevel,
        policy: &AutoBanPolicy,
        tracking: &mut ViolationTracking,
        now: DateTime<Utc>,
    ) -> Result<BanRecord, ModerationError> {
        let hours = policy.duration_for(level);
        let expires_at = now + Duration::hours(i64::from(hours));

        let ban = BanRecord {
            id: self.ids.next(now),
            user_id: user_id.to_string(),
            reason: format!("Automatic ban - {recent_count} violations detected"),
            issued_at: now,
            expires_at: BanExpiry::At(expires_at),
            issued_by: IssuedBy::System,
            level: Some(level),
            duration_hours: Some(hours),
            lifted: None,
        };

        let ban = match self.insert_ban(ban).await {
            Ok(ban) => ban,
            Err(e) => {
                tracing::error!(user_id, %level, "Auto-ban could not be saved: {}", e);
                return Err(ModerationError::retryable(e));
            }
        };

        // The ban is in force from here on; the remaining steps are bookkeeping.
        let history = AutoBanHistoryEntry {
            id: self.ids.next(now),
            ban_id: ban.id,
            user_id: user_id.to_string(),
            reason: ban.reason.clone(),
            issued_at: now,
            expires_at,
            level,
            duration_hours: hours,
            recent_count,
        };
        if let Err(e) = self.store.save_auto_ban(&history).await {
            tracing::warn!(user_id, "Failed to record auto-ban history: {}", e);
        }

        self.log(
            LogKind::Moderation,
            format!("Auto ban: {user_id} banned for {hours} hours ({level} level)"),
            user_id,
        )
        .await;
        self.sink.toast(
            &format!("User {user_id} has been automatically banned for {hours} hours!"),
            NotificationSeverity::Warning,
        );

        tracking.reset();
        if let Err(e) = self.store.save_tracking(user_id, tracking).await {
            tracing::error!(user_id, "Failed to reset violation tracking after auto-ban: {}", e);
        }

        tracing::warn!(user_id, %level, hours, recent_count, "User auto-banned");
        Ok(ban)
    }

    pub async fn tracking(&self, user_id: &str) -> Result<ViolationTracking, ModerationError> {
        self.store
            .get_tracking(user_id)
            .await
            .map_err(ModerationError::retryable)
    }

    /// The audit log, optionally narrowed to one user.
    pub async fn violations(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<ViolationRecord>, ModerationError> {
        let mut records = self.load_violations().await?;
        if let Some(user_id) = user_id {
            records.retain(|r| r.user_id == user_id);
        }
        Ok(records)
    }

    // ========================================================================
    // BAN QUERIES
    // ========================================================================

    /// True iff the user's most recent ban is unlifted and permanent or unexpired at `now`.
    pub async fn is_banned(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool, ModerationError> {
        Ok(self.active_ban(user_id, now).await?.is_some())
    }

    pub async fn active_ban(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BanRecord>, ModerationError> {
        let bans = self.load_bans().await?;
        Ok(latest_ban(&bans, user_id)
            .filter(|ban| ban.is_active(now))
            .cloned())
    }

    /// Every ban ever issued for the user, oldest first.
    pub async fn ban_history(&self, user_id: &str) -> Result<Vec<BanRecord>, ModerationError> {
        let mut bans = self.load_bans().await?;
        bans.retain(|ban| ban.user_id == user_id);
        Ok(bans)
    }

    /// The authoritative ban of every user banned at `now`.
    pub async fn active_bans(&self, now: DateTime<Utc>) -> Result<Vec<BanRecord>, ModerationError> {
        let bans = self.load_bans().await?;
        let mut latest: HashMap<&str, &BanRecord> = HashMap::new();
        for ban in &bans {
            let newer = latest
                .get(ban.user_id.as_str())
                .map_or(true, |current| ban.recency_key() >= current.recency_key());
            if newer {
                latest.insert(ban.user_id.as_str(), ban);
            }
        }

        let mut active: Vec<BanRecord> = latest
            .into_values()
            .filter(|ban| ban.is_active(now))
            .cloned()
            .collect();
        active.sort_by_key(|ban| ban.recency_key());
        Ok(active)
    }

    // ========================================================================
    // MANUAL BANS
    // ========================================================================

    pub async fn issue_ban(
        &self,
        user_id: &str,
        reason: &str,
        duration: BanDuration,
        issued_by: &str,
    ) -> Result<BanRecord, ModerationError> {
        require("user id", user_id)?;
        require("reason", reason)?;
        require("issuer", issued_by)?;
        validate_duration(duration)?;

        let now = self.clock.now();
        let bans = self.load_bans().await?;
        if latest_ban(&bans, user_id).is_some_and(|ban| ban.is_active(now)) {
            return Err(ModerationError::AlreadyBanned(user_id.to_string()));
        }

        let ban = BanRecord {
            id: self.next_ban_id(&bans, user_id, now),
            user_id: user_id.to_string(),
            reason: reason.trim().to_string(),
            issued_at: now,
            expires_at: duration.expiry_from(now),
            issued_by: IssuedBy::User(issued_by.to_string()),
            level: None,
            duration_hours: duration.hours(),
            lifted: None,
        };
        let ban = self
            .insert_ban(ban)
            .await
            .map_err(ModerationError::retryable)?;

        self.log(
            LogKind::Moderation,
            format!("User {user_id} banned {duration}"),
            issued_by,
        )
        .await;
        self.sink
            .toast("User banned successfully!", NotificationSeverity::Success);

        tracing::info!(user_id, issued_by, %duration, "User banned");
        Ok(ban)
    }

    /// Lift every active ban for the user. History keeps the records, marked lifted.
    pub async fn lift_ban(&self, user_id: &str, lifted_by: &str) -> Result<usize, ModerationError> {
        let now = self.clock.now();
        let bans = self.load_bans().await?;
        let lifted = self.lift_active(&bans, user_id, lifted_by, now, None).await?;
        if lifted == 0 {
            return Err(ModerationError::NotFound(format!("active ban for {user_id}")));
        }

        self.log(
            LogKind::Moderation,
            format!("User {user_id} has been unbanned"),
            lifted_by,
        )
        .await;
        self.sink
            .toast("User unbanned successfully!", NotificationSeverity::Success);

        tracing::info!(user_id, lifted_by, lifted, "User unbanned");
        Ok(lifted)
    }

    /// Replace the active ban with a new one starting now. The old record stays in
    /// history, marked lifted by the editor once the replacement is stored.
    pub async fn update_ban(
        &self,
        user_id: &str,
        reason: &str,
        duration: BanDuration,
        edited_by: &str,
    ) -> Result<BanRecord, ModerationError> {
        require("reason", reason)?;
        require("editor", edited_by)?;
        validate_duration(duration)?;

        let now = self.clock.now();
        let bans = self.load_bans().await?;
        if !latest_ban(&bans, user_id).is_some_and(|ban| ban.is_active(now)) {
            return Err(ModerationError::NotFound(format!("active ban for {user_id}")));
        }

        let ban = BanRecord {
            id: self.next_ban_id(&bans, user_id, now),
            user_id: user_id.to_string(),
            reason: reason.trim().to_string(),
            issued_at: now,
            expires_at: duration.expiry_from(now),
            issued_by: IssuedBy::User(edited_by.to_string()),
            level: None,
            duration_hours: duration.hours(),
            lifted: None,
        };
        let ban = self
            .insert_ban(ban)
            .await
            .map_err(ModerationError::retryable)?;

        // The replacement is the latest record, so it already decides the ban state.
        if let Err(e) = self
            .lift_active(&bans, user_id, edited_by, now, Some(ban.id))
            .await
        {
            tracing::warn!(user_id, ban_id = ban.id, "Superseded bans not marked lifted: {}", e);
        }

        self.log(
            LogKind::Moderation,
            format!("Ban updated for {user_id}: {duration}"),
            edited_by,
        )
        .await;
        self.sink
            .toast("Ban updated successfully!", NotificationSeverity::Success);

        Ok(ban)
    }

    /// Mark lifted every ban of the user in `bans` that is active at `now`, except `keep`.
    async fn lift_active(
        &self,
        bans: &[BanRecord],
        user_id: &str,
        lifted_by: &str,
        now: DateTime<Utc>,
        keep: Option<u64>,
    ) -> Result<usize, ModerationError> {
        let lift = BanLift {
            by: lifted_by.to_string(),
            at: now,
        };
        let mut lifted = 0;
        for ban in bans
            .iter()
            .filter(|ban| ban.user_id == user_id && ban.is_active(now) && Some(ban.id) != keep)
        {
            if self
                .store
                .mark_ban_lifted(ban.id, &lift)
                .await
                .map_err(ModerationError::retryable)?
            {
                lifted += 1;
            }
        }
        Ok(lifted)
    }

    /// An id that sorts after every ban the user already has, so a new ban issued in
    /// the same instant still becomes the latest one.
    fn next_ban_id(&self, bans: &[BanRecord], user_id: &str, now: DateTime<Utc>) -> u64 {
        if let Some(max) = bans
            .iter()
            .filter(|ban| ban.user_id == user_id)
            .map(|ban| ban.id)
            .max()
        {
            self.ids.observe(max);
        }
        self.ids.next(now)
    }

    /// Insert a new ban. Another context may have taken the id in the same
    /// millisecond; move past it and try again.
    async fn insert_ban(&self, mut ban: BanRecord) -> Result<BanRecord, StoreError> {
        let mut attempt = 1;
        loop {
            match self.store.insert_ban(&ban).await {
                Ok(()) => return Ok(ban),
                Err(StoreError::Conflict(detail)) if attempt < BAN_INSERT_ATTEMPTS => {
                    tracing::debug!(ban_id = ban.id, attempt, "Ban id taken: {}", detail);
                    self.ids.observe(ban.id);
                    ban.id = self.ids.next(self.clock.now());
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ========================================================================
    // UNBAN REQUESTS
    // ========================================================================

    pub async fn submit_unban_request(
        &self,
        user_id: &str,
        reason: &str,
    ) -> Result<UnbanRequest, ModerationError> {
        require("user id", user_id)?;
        require("reason", reason)?;

        let now = self.clock.now();
        if !self.is_banned(user_id, now).await? {
            return Err(ModerationError::Validation(format!("{user_id} is not banned")));
        }

        let request = UnbanRequest {
            id: self.ids.next(now),
            user_id: user_id.to_string(),
            reason: reason.trim().to_string(),
            submitted_at: now,
        };
        self.store
            .save_unban_request(&request)
            .await
            .map_err(ModerationError::retryable)?;

        tracing::info!(user_id, request_id = request.id, "Unban request submitted");
        Ok(request)
    }

    /// Pending requests in submission order.
    pub async fn unban_requests(&self) -> Result<Vec<UnbanRequest>, ModerationError> {
        self.store
            .load_unban_requests()
            .await
            .map_err(ModerationError::retryable)
    }

    pub async fn approve_unban_request(
        &self,
        request_id: u64,
        approved_by: &str,
    ) -> Result<UnbanRequest, ModerationError> {
        let request = self.find_unban_request(request_id).await?;

        match self.lift_ban(&request.user_id, approved_by).await {
            // The ban may have expired while the request was pending
            Ok(_) | Err(ModerationError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.store
            .delete_unban_request(request_id)
            .await
            .map_err(ModerationError::committed)?;

        self.log(
            LogKind::Moderation,
            format!("Unban request {request_id} approved"),
            approved_by,
        )
        .await;
        self.sink
            .toast("Unban request approved!", NotificationSeverity::Success);

        Ok(request)
    }

    pub async fn deny_unban_request(
        &self,
        request_id: u64,
        denied_by: &str,
    ) -> Result<UnbanRequest, ModerationError> {
        let request = self.find_unban_request(request_id).await?;
        self.store
            .delete_unban_request(request_id)
            .await
            .map_err(ModerationError::retryable)?;

        self.log(
            LogKind::Moderation,
            format!("Unban request {request_id} denied"),
            denied_by,
        )
        .await;
        self.sink
            .toast("Unban request denied!", NotificationSeverity::Success);

        Ok(request)
    }

    async fn find_unban_request(&self, request_id: u64) -> Result<UnbanRequest, ModerationError> {
        self.unban_requests()
            .await?
            .into_iter()
            .find(|r| r.id == request_id)
            .ok_or_else(|| ModerationError::NotFound(format!("unban request {request_id}")))
    }

    // ========================================================================
    // REPORTING
    // ========================================================================

    /// Users with a non-empty tracking state, most violations first.
    pub async fn tracking_summary(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrackingSummary>, ModerationError> {
        let policy = self.policy().await?;
        let bans = self.load_bans().await?;
        let tracked = self
            .store
            .load_tracking()
            .await
            .map_err(ModerationError::retryable)?;

        let mut summary: Vec<TrackingSummary> = tracked
            .into_iter()
            .filter(|(_, tracking)| tracking.count > 0)
            .map(|(user_id, tracking)| TrackingSummary {
                total: tracking.count,
                recent: tracking.recent_count(now, policy.window()),
                last_violation_at: tracking.last_violation_at,
                next_level: BanLevel::next_for_count(tracking.count, policy.threshold_count),
                banned: latest_ban(&bans, &user_id).is_some_and(|ban| ban.is_active(now)),
                user_id,
            })
            .collect();

        summary.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.user_id.cmp(&b.user_id)));
        Ok(summary)
    }

    /// Top offenders from the audit log.
    pub async fn violation_summary(
        &self,
        limit: usize,
    ) -> Result<Vec<OffenderSummary>, ModerationError> {
        let records = self.load_violations().await?;

        let mut by_user: HashMap<&str, OffenderSummary> = HashMap::new();
        for record in &records {
            let entry = by_user
                .entry(record.user_id.as_str())
                .or_insert_with(|| OffenderSummary {
                    user_id: record.user_id.clone(),
                    violations: 0,
                    last_category: record.category.clone(),
                    last_violation_at: record.occurred_at,
                });
            entry.violations += 1;
            if record.occurred_at >= entry.last_violation_at {
                entry.last_violation_at = record.occurred_at;
                entry.last_category = record.category.clone();
            }
        }

        let mut offenders: Vec<OffenderSummary> = by_user.into_values().collect();
        offenders.sort_by(|a, b| {
            b.violations
                .cmp(&a.violations)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        offenders.truncate(limit);
        Ok(offenders)
    }

    pub async fn auto_ban_stats(&self, now: DateTime<Utc>) -> Result<AutoBanStats, ModerationError> {
        let history = self.auto_ban_history().await?;
        let active = self
            .active_bans(now)
            .await?
            .iter()
            .filter(|ban| ban.is_auto())
            .count();
        Ok(AutoBanStats {
            total: history.len(),
            active,
        })
    }

    pub async fn auto_ban_history(&self) -> Result<Vec<AutoBanHistoryEntry>, ModerationError> {
        self.store
            .load_auto_bans()
            .await
            .map_err(ModerationError::retryable)
    }

    /// Preview of the level a user with `count` violations is heading towards.
    pub async fn next_ban_level(&self, count: u32) -> Result<BanLevel, ModerationError> {
        let policy = self.policy().await?;
        Ok(BanLevel::next_for_count(count, policy.threshold_count))
    }

    pub async fn system_logs(&self) -> Result<Vec<SystemLogEntry>, ModerationError> {
        self.store
            .load_logs()
            .await
            .map_err(ModerationError::retryable)
    }

    // ========================================================================
    // POLICY
    // ========================================================================

    /// The stored policy, or the default if none was ever saved.
    pub async fn policy(&self) -> Result<AutoBanPolicy, ModerationError> {
        Ok(self
            .store
            .get_policy()
            .await
            .map_err(ModerationError::retryable)?
            .unwrap_or_default())
    }

    /// Store `policy` only if no policy exists yet. Returns whether it was written.
    pub async fn seed_policy(&self, policy: &AutoBanPolicy) -> Result<bool, ModerationError> {
        let existing = self
            .store
            .get_policy()
            .await
            .map_err(ModerationError::retryable)?;
        if existing.is_some() {
            return Ok(false);
        }
        if policy.enabled {
            policy
                .validate()
                .map_err(ModerationError::PolicyMisconfiguration)?;
        }
        self.store
            .save_policy(policy)
            .await
            .map_err(ModerationError::retryable)?;
        Ok(true)
    }

    /// Replace the policy. An enabled policy must be valid.
    pub async fn set_policy(
        &self,
        policy: AutoBanPolicy,
        changed_by: &str,
    ) -> Result<(), ModerationError> {
        if policy.enabled {
            policy
                .validate()
                .map_err(ModerationError::PolicyMisconfiguration)?;
        }
        self.store
            .save_policy(&policy)
            .await
            .map_err(ModerationError::retryable)?;

        self.log(LogKind::System, "Auto ban settings updated".to_string(), changed_by)
            .await;
        self.sink.toast(
            "Auto ban settings updated successfully!",
            NotificationSeverity::Success,
        );
        tracing::info!(?policy, changed_by, "Auto-ban policy updated");
        Ok(())
    }

    /// Turn the engine on or off. Enabling refuses a misconfigured policy.
    pub async fn set_enabled(&self, enabled: bool, changed_by: &str) -> Result<(), ModerationError> {
        let mut policy = self.policy().await?;
        if enabled {
            policy
                .validate()
                .map_err(ModerationError::PolicyMisconfiguration)?;
        }
        policy.enabled = enabled;
        self.store
            .save_policy(&policy)
            .await
            .map_err(ModerationError::retryable)?;

        let state = if enabled { "enabled" } else { "disabled" };
        self.log(LogKind::System, format!("Auto ban system {state}"), changed_by)
            .await;
        self.sink.toast(
            &format!("Auto ban system {state}!"),
            NotificationSeverity::Success,
        );
        Ok(())
    }

    /// The policy as the engine should apply it. An invalid stored policy counts as disabled.
    async fn active_policy(&self) -> Result<AutoBanPolicy, ModerationError> {
        let mut policy = self
            .store
            .get_policy()
            .await
            .map_err(ModerationError::committed)?
            .unwrap_or_default();
        if policy.enabled {
            if let Err(reason) = policy.validate() {
                tracing::warn!("Stored auto-ban policy is invalid, skipping auto-ban: {}", reason);
                policy.enabled = false;
            }
        }
        Ok(policy)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    async fn load_bans(&self) -> Result<Vec<BanRecord>, ModerationError> {
        self.store
            .load_bans()
            .await
            .map_err(ModerationError::retryable)
    }

    async fn load_violations(&self) -> Result<Vec<ViolationRecord>, ModerationError> {
        self.store
            .load_violations()
            .await
            .map_err(ModerationError::retryable)
    }

    /// Best effort: a failed log write never undoes the action it describes.
    async fn log(&self, kind: LogKind, message: String, user: &str) {
        let at = self.clock.now();
        let entry = SystemLogEntry {
            id: self.ids.next(at),
            kind,
            message,
            user: user.to_string(),
            at,
        };
        if let Err(e) = self.store.append_log(&entry).await {
            tracing::warn!(kind = %entry.kind, "Failed to write system log entry: {}", e);
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), ModerationError> {
    if value.trim().is_empty() {
        return Err(ModerationError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn validate_duration(duration: BanDuration) -> Result<(), ModerationError> {
    if duration == BanDuration::Hours(0) {
        return Err(ModerationError::Validation(
            "Ban duration must be at least one hour".to_string(),
        ));
    }
    Ok(())
}

fn latest_ban<'a>(bans: &'a [BanRecord], user_id: &str) -> Option<&'a BanRecord> {
    bans.iter()
        .filter(|ban| ban.user_id == user_id)
        .max_by_key(|ban| ban.recency_key())
}

// ============================================================================
// TESTS
// ============================================================================
