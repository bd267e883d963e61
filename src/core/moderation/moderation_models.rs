// Moderation domain models - violations, bans and the auto-ban policy.
//
// These are pure domain types. Whether a user is banned is always computed from
// the records at query time; nothing here expires on its own.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category recorded when a message trips the restricted-word filter.
pub const RESTRICTED_WORD_CATEGORY: &str = "restricted_word";

const SYSTEM_ISSUER: &str = "system";
const PERMANENT: &str = "permanent";

// ============================================================================
// VIOLATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationSeverity::Low => "low",
            ViolationSeverity::Medium => "medium",
            ViolationSeverity::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for ViolationSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ViolationSeverity::Low),
            "medium" => Ok(ViolationSeverity::Medium),
            "high" => Ok(ViolationSeverity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// One entry of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: u64,
    pub user_id: String,
    pub category: String,
    pub detail: String,
    pub severity: ViolationSeverity,
    pub occurred_at: DateTime<Utc>,
}

/// Per-user counter feeding the auto-ban engine.
///
/// `count` always equals `violation_timestamps.len()`. Timestamps are never pruned,
/// only filtered by `recent_count`; the whole state is wiped when an auto-ban fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationTracking {
    pub count: u32,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub violation_timestamps: Vec<DateTime<Utc>>,
}

impl ViolationTracking {
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.count += 1;
        self.violation_timestamps.push(at);
        self.last_violation_at = Some(at);
    }

    /// Violations strictly newer than `now - window`.
    pub fn recent_count(&self, now: DateTime<Utc>, window: Duration) -> u32 {
        let cutoff = now - window;
        self.violation_timestamps
            .iter()
            .filter(|at| **at > cutoff)
            .count() as u32
    }

    pub fn reset(&mut self) {
        *self = ViolationTracking::default();
    }
}

// ============================================================================
// BANS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BanLevel {
    First,
    Second,
    Third,
}

impl BanLevel {
    /// Level for an auto-ban that fires at `recent` violations, or `None` below the threshold.
    ///
    /// `First` is only reachable at exactly `threshold`, since anything below it never bans.
    pub fn for_recent_count(recent: u32, threshold: u32) -> Option<Self> {
        if threshold == 0 || recent < threshold {
            return None;
        }
        let level = if recent <= threshold {
            BanLevel::First
        } else if recent <= threshold.saturating_mul(2) {
            BanLevel::Second
        } else {
            BanLevel::Third
        };
        Some(level)
    }

    /// Preview of the level a user with `count` violations is heading towards.
    pub fn next_for_count(count: u32, threshold: u32) -> Self {
        if count < threshold {
            BanLevel::First
        } else if count < threshold.saturating_mul(2) {
            BanLevel::Second
        } else {
            BanLevel::Third
        }
    }
}

impl fmt::Display for BanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BanLevel::First => "First",
            BanLevel::Second => "Second",
            BanLevel::Third => "Third",
        };
        f.write_str(name)
    }
}

impl FromStr for BanLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "First" => Ok(BanLevel::First),
            "Second" => Ok(BanLevel::Second),
            "Third" => Ok(BanLevel::Third),
            other => Err(format!("unknown ban level: {other}")),
        }
    }
}

/// When a ban ends. Serialized as `"permanent"` or an RFC 3339 timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BanExpiry {
    Permanent,
    At(DateTime<Utc>),
}

impl BanExpiry {
    /// Still in force at `now`?
    pub fn is_after(&self, now: DateTime<Utc>) -> bool {
        match self {
            BanExpiry::Permanent => true,
            BanExpiry::At(at) => *at > now,
        }
    }
}

impl From<BanExpiry> for String {
    fn from(expiry: BanExpiry) -> Self {
        match expiry {
            BanExpiry::Permanent => PERMANENT.to_string(),
            BanExpiry::At(at) => at.to_rfc3339(),
        }
    }
}

impl TryFrom<String> for BanExpiry {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == PERMANENT {
            return Ok(BanExpiry::Permanent);
        }
        DateTime::parse_from_rfc3339(&value)
            .map(|at| BanExpiry::At(at.with_timezone(&Utc)))
            .map_err(|e| format!("invalid ban expiry {value:?}: {e}"))
    }
}

/// How long a manual ban lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanDuration {
    Hours(u32),
    Permanent,
}

impl BanDuration {
    pub fn expiry_from(self, now: DateTime<Utc>) -> BanExpiry {
        match self {
            BanDuration::Hours(hours) => BanExpiry::At(now + Duration::hours(i64::from(hours))),
            BanDuration::Permanent => BanExpiry::Permanent,
        }
    }

    pub fn hours(self) -> Option<u32> {
        match self {
            BanDuration::Hours(hours) => Some(hours),
            BanDuration::Permanent => None,
        }
    }
}

impl fmt::Display for BanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanDuration::Hours(hours) => write!(f, "{hours} hours"),
            BanDuration::Permanent => f.write_str("permanently"),
        }
    }
}

/// Who issued a ban: the engine itself or a moderator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum IssuedBy {
    System,
    User(String),
}

impl From<IssuedBy> for String {
    fn from(issuer: IssuedBy) -> Self {
        match issuer {
            IssuedBy::System => SYSTEM_ISSUER.to_string(),
            IssuedBy::User(user_id) => user_id,
        }
    }
}

impl From<String> for IssuedBy {
    fn from(value: String) -> Self {
        if value == SYSTEM_ISSUER {
            IssuedBy::System
        } else {
            IssuedBy::User(value)
        }
    }
}

impl fmt::Display for IssuedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssuedBy::System => f.write_str(SYSTEM_ISSUER),
            IssuedBy::User(user_id) => f.write_str(user_id),
        }
    }
}

/// A ban that was lifted or superseded. The record itself stays in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanLift {
    pub by: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanRecord {
    pub id: u64,
    pub user_id: String,
    pub reason: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: BanExpiry,
    pub issued_by: IssuedBy,
    /// Only set for auto-bans.
    pub level: Option<BanLevel>,
    /// `None` for permanent bans.
    pub duration_hours: Option<u32>,
    pub lifted: Option<BanLift>,
}

impl BanRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.lifted.is_none() && self.expires_at.is_after(now)
    }

    pub fn is_auto(&self) -> bool {
        self.issued_by == IssuedBy::System
    }

    /// "Permanent", "Expired", or the time left as `"{d}d {h}h {m}m"`.
    pub fn remaining(&self, now: DateTime<Utc>) -> String {
        if self.lifted.is_some() {
            return "Lifted".to_string();
        }
        match self.expires_at {
            BanExpiry::Permanent => "Permanent".to_string(),
            BanExpiry::At(at) if at <= now => "Expired".to_string(),
            BanExpiry::At(at) => format_remaining(at - now),
        }
    }

    /// Sort key for "most recent": issue time, ties broken by id.
    pub fn recency_key(&self) -> (DateTime<Utc>, u64) {
        (self.issued_at, self.id)
    }
}

pub fn format_remaining(left: Duration) -> String {
    let days = left.num_days();
    let hours = left.num_hours() % 24;
    let minutes = left.num_minutes() % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Mirror of an auto-issued ban plus the count that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoBanHistoryEntry {
    pub id: u64,
    pub ban_id: u64,
    pub user_id: String,
    pub reason: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub level: BanLevel,
    pub duration_hours: u32,
    pub recent_count: u32,
}

// ============================================================================
// POLICY
// ============================================================================

/// Auto-ban configuration. Editable at runtime, so the engine re-reads it every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBanPolicy {
    pub enabled: bool,
    pub threshold_count: u32,
    pub window_hours: u32,
    pub first_duration_hours: u32,
    pub second_duration_hours: u32,
    pub third_duration_hours: u32,
}

impl Default for AutoBanPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_count: 3,
            window_hours: 24,
            first_duration_hours: 24,
            second_duration_hours: 72,
            third_duration_hours: 168,
        }
    }
}

impl AutoBanPolicy {
    /// Every count and duration must be positive.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("threshold_count", self.threshold_count),
            ("window_hours", self.window_hours),
            ("first_duration_hours", self.first_duration_hours),
            ("second_duration_hours", self.second_duration_hours),
            ("third_duration_hours", self.third_duration_hours),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(format!("{name} must be greater than zero")),
            None => Ok(()),
        }
    }

    pub fn duration_for(&self, level: BanLevel) -> u32 {
        match level {
            BanLevel::First => self.first_duration_hours,
            BanLevel::Second => self.second_duration_hours,
            BanLevel::Third => self.third_duration_hours,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::hours(i64::from(self.window_hours))
    }
}

// ============================================================================
// UNBAN REQUESTS AND SYSTEM LOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnbanRequest {
    pub id: u64,
    pub user_id: String,
    pub reason: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Moderation,
    System,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Moderation => f.write_str("moderation"),
            LogKind::System => f.write_str("system"),
        }
    }
}

impl FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moderation" => Ok(LogKind::Moderation),
            "system" => Ok(LogKind::System),
            other => Err(format!("unknown log kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub id: u64,
    pub kind: LogKind,
    pub message: String,
    pub user: String,
    pub at: DateTime<Utc>,
}

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSummary {
    pub user_id: String,
    /// Everything since the last reset, in or out of the window.
    pub total: u32,
    pub recent: u32,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub next_level: BanLevel,
    pub banned: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OffenderSummary {
    pub user_id: String,
    pub violations: usize,
    pub last_category: String,
    pub last_violation_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoBanStats {
    pub total: usize,
    pub active: usize,
}

/// What `record_violation` did.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationOutcome {
    pub record: ViolationRecord,
    pub recent_count: u32,
    pub auto_ban: Option<BanRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_level_arithmetic_matches_the_escalation_table() {
        assert_eq!(BanLevel::for_recent_count(2, 3), None);
        assert_eq!(BanLevel::for_recent_count(3, 3), Some(BanLevel::First));
        assert_eq!(BanLevel::for_recent_count(4, 3), Some(BanLevel::Second));
        assert_eq!(BanLevel::for_recent_count(6, 3), Some(BanLevel::Second));
        assert_eq!(BanLevel::for_recent_count(7, 3), Some(BanLevel::Third));
        assert_eq!(BanLevel::for_recent_count(5, 0), None);
    }

    #[test]
    fn test_next_level_preview_uses_strict_comparisons() {
        assert_eq!(BanLevel::next_for_count(2, 3), BanLevel::First);
        assert_eq!(BanLevel::next_for_count(3, 3), BanLevel::Second);
        assert_eq!(BanLevel::next_for_count(5, 3), BanLevel::Second);
        assert_eq!(BanLevel::next_for_count(6, 3), BanLevel::Third);
    }

    #[test]
    fn test_recent_count_excludes_entries_at_or_before_the_cutoff() {
        let now = Utc::now();
        let mut tracking = ViolationTracking::default();
        tracking.record(now - Duration::hours(24));
        tracking.record(now - Duration::hours(23));
        tracking.record(now);

        assert_eq!(tracking.count, 3);
        assert_eq!(tracking.count as usize, tracking.violation_timestamps.len());
        assert_eq!(tracking.recent_count(now, Duration::hours(24)), 2);

        tracking.reset();
        assert_eq!(tracking, ViolationTracking::default());
    }

    #[test]
    fn test_ban_expiry_serializes_as_permanent_or_timestamp() {
        let json = serde_json::to_string(&BanExpiry::Permanent).unwrap();
        assert_eq!(json, "\"permanent\"");

        let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_string(&BanExpiry::At(at)).unwrap();
        let back: BanExpiry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BanExpiry::At(at));

        assert!(serde_json::from_str::<BanExpiry>("\"soon\"").is_err());
    }

    #[test]
    fn test_permanent_bans_never_expire() {
        let far_future = Utc::now() + Duration::days(365 * 100);
        assert!(BanExpiry::Permanent.is_after(far_future));
    }

    #[test]
    fn test_remaining_time_is_formatted_by_magnitude() {
        assert_eq!(
            format_remaining(Duration::days(2) + Duration::hours(3) + Duration::minutes(4)),
            "2d 3h 4m"
        );
        assert_eq!(format_remaining(Duration::minutes(90)), "1h 30m");
        assert_eq!(format_remaining(Duration::minutes(5)), "5m");
    }

    #[test]
    fn test_policy_validation_rejects_zero_values() {
        assert!(AutoBanPolicy::default().validate().is_ok());

        let policy = AutoBanPolicy {
            second_duration_hours: 0,
            ..Default::default()
        };
        let err = policy.validate().unwrap_err();
        assert!(err.contains("second_duration_hours"));
    }

    #[test]
    fn test_issuer_round_trips_through_a_plain_string() {
        let json = serde_json::to_string(&IssuedBy::System).unwrap();
        assert_eq!(json, "\"system\"");
        let back: IssuedBy = serde_json::from_str("\"mod@example.com\"").unwrap();
        assert_eq!(back, IssuedBy::User("mod@example.com".to_string()));
    }
}
