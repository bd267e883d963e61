// SQLite-backed moderation store.
//
// Tables:
// - mod_violations: append-only violation audit log
// - mod_tracking: per-user auto-ban counters (timestamps as a JSON array)
// - mod_bans: every ban ever issued, lifted ones included
// - mod_auto_bans: auto-ban history with the triggering count
// - mod_policy: the single auto-ban policy row
// - mod_system_logs: moderation and system log entries
// - mod_unban_requests: pending unban requests

use crate::core::moderation::{
    AutoBanHistoryEntry, AutoBanPolicy, BanExpiry, BanLift, BanRecord, IssuedBy,
    ModerationStore, SystemLogEntry, UnbanRequest, ViolationRecord, ViolationTracking,
};
use crate::core::storage::StoreError;
use crate::infra::sqlite::{backend, insert_error, parse_time};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        // Violation audit log
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mod_violations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                detail TEXT NOT NULL,
                severity TEXT NOT NULL,
                occurred_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_mod_violations_user
                ON mod_violations(user_id, seq);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        // Auto-ban counters
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mod_tracking (
                user_id TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0,
                last_violation_at TEXT,
                timestamps TEXT NOT NULL DEFAULT '[]'
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        // Bans
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mod_bans (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                issued_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                issued_by TEXT NOT NULL,
                level TEXT,
                duration_hours INTEGER,
                lifted_by TEXT,
                lifted_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_mod_bans_user
                ON mod_bans(user_id, seq);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        // Auto-ban history
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mod_auto_bans (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL,
                ban_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                issued_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                level TEXT NOT NULL,
                duration_hours INTEGER NOT NULL,
                recent_count INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        // Policy (single row)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mod_policy (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                enabled BOOLEAN NOT NULL,
                threshold_count INTEGER NOT NULL,
                window_hours INTEGER NOT NULL,
                first_duration_hours INTEGER NOT NULL,
                second_duration_hours INTEGER NOT NULL,
                third_duration_hours INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        // System log and unban requests
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mod_system_logs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                user TEXT NOT NULL,
                at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS mod_unban_requests (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

fn parse_optional_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.as_deref().map(parse_time).transpose()
}

fn ban_from_row(row: &SqliteRow) -> Result<BanRecord, StoreError> {
    let id: i64 = row.get("id");
    let issued_at: String = row.get("issued_at");
    let expires_at: String = row.get("expires_at");
    let issued_by: String = row.get("issued_by");
    let level: Option<String> = row.get("level");
    let duration_hours: Option<i64> = row.get("duration_hours");
    let lifted_by: Option<String> = row.get("lifted_by");
    let lifted_at = parse_optional_time(row.get("lifted_at"))?;

    Ok(BanRecord {
        id: id as u64,
        user_id: row.get("user_id"),
        reason: row.get("reason"),
        issued_at: parse_time(&issued_at)?,
        expires_at: BanExpiry::try_from(expires_at).map_err(StoreError::Backend)?,
        issued_by: IssuedBy::from(issued_by),
        level: level
            .map(|level| level.parse())
            .transpose()
            .map_err(StoreError::Backend)?,
        duration_hours: duration_hours.map(|hours| hours as u32),
        lifted: match (lifted_by, lifted_at) {
            (Some(by), Some(at)) => Some(BanLift { by, at }),
            _ => None,
        },
    })
}

#[async_trait]
impl ModerationStore for SqliteModerationStore {
    async fn save_violation(&self, record: &ViolationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO mod_violations (id, user_id, category, detail, severity, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id as i64)
        .bind(&record.user_id)
        .bind(&record.category)
        .bind(&record.detail)
        .bind(record.severity.to_string())
        .bind(record.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_violations(&self) -> Result<Vec<ViolationRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, category, detail, severity, occurred_at
            FROM mod_violations
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let severity: String = row.get("severity");
            let occurred_at: String = row.get("occurred_at");
            records.push(ViolationRecord {
                id: id as u64,
                user_id: row.get("user_id"),
                category: row.get("category"),
                detail: row.get("detail"),
                severity: severity.parse().map_err(StoreError::Backend)?,
                occurred_at: parse_time(&occurred_at)?,
            });
        }
        Ok(records)
    }

    async fn get_tracking(&self, user_id: &str) -> Result<ViolationTracking, StoreError> {
        let row = sqlx::query(
            "SELECT count, last_violation_at, timestamps FROM mod_tracking WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(ViolationTracking::default());
        };

        let count: i64 = row.get("count");
        let timestamps: String = row.get("timestamps");
        Ok(ViolationTracking {
            count: count as u32,
            last_violation_at: parse_optional_time(row.get("last_violation_at"))?,
            violation_timestamps: serde_json::from_str(&timestamps)?,
        })
    }

    async fn save_tracking(
        &self,
        user_id: &str,
        tracking: &ViolationTracking,
    ) -> Result<(), StoreError> {
        let timestamps = serde_json::to_string(&tracking.violation_timestamps)?;
        sqlx::query(
            r#"
            INSERT INTO mod_tracking (user_id, count, last_violation_at, timestamps)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                count = excluded.count,
                last_violation_at = excluded.last_violation_at,
                timestamps = excluded.timestamps
            "#,
        )
        .bind(user_id)
        .bind(i64::from(tracking.count))
        .bind(tracking.last_violation_at.map(|at| at.to_rfc3339()))
        .bind(timestamps)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_tracking(&self) -> Result<Vec<(String, ViolationTracking)>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, count, last_violation_at, timestamps FROM mod_tracking ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut tracked = Vec::with_capacity(rows.len());
        for row in rows {
            let count: i64 = row.get("count");
            let timestamps: String = row.get("timestamps");
            tracked.push((
                row.get("user_id"),
                ViolationTracking {
                    count: count as u32,
                    last_violation_at: parse_optional_time(row.get("last_violation_at"))?,
                    violation_timestamps: serde_json::from_str(&timestamps)?,
                },
            ));
        }
        Ok(tracked)
    }

    async fn insert_ban(&self, ban: &BanRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO mod_bans
                (id, user_id, reason, issued_at, expires_at, issued_by, level,
                 duration_hours, lifted_by, lifted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ban.id as i64)
        .bind(&ban.user_id)
        .bind(&ban.reason)
        .bind(ban.issued_at.to_rfc3339())
        .bind(String::from(ban.expires_at))
        .bind(ban.issued_by.to_string())
        .bind(ban.level.map(|level| level.to_string()))
        .bind(ban.duration_hours.map(i64::from))
        .bind(ban.lifted.as_ref().map(|lift| lift.by.clone()))
        .bind(ban.lifted.as_ref().map(|lift| lift.at.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(insert_error)?;
        Ok(())
    }

    async fn mark_ban_lifted(&self, id: u64, lift: &BanLift) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE mod_bans SET lifted_by = ?, lifted_at = ? WHERE id = ?")
            .bind(&lift.by)
            .bind(lift.at.to_rfc3339())
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM mod_bans ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(ban_from_row).collect()
    }

    async fn save_auto_ban(&self, entry: &AutoBanHistoryEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO mod_auto_bans
                (id, ban_id, user_id, reason, issued_at, expires_at, level,
                 duration_hours, recent_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id as i64)
        .bind(entry.ban_id as i64)
        .bind(&entry.user_id)
        .bind(&entry.reason)
        .bind(entry.issued_at.to_rfc3339())
        .bind(entry.expires_at.to_rfc3339())
        .bind(entry.level.to_string())
        .bind(i64::from(entry.duration_hours))
        .bind(i64::from(entry.recent_count))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_auto_bans(&self) -> Result<Vec<AutoBanHistoryEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM mod_auto_bans ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let ban_id: i64 = row.get("ban_id");
            let issued_at: String = row.get("issued_at");
            let expires_at: String = row.get("expires_at");
            let level: String = row.get("level");
            let duration_hours: i64 = row.get("duration_hours");
            let recent_count: i64 = row.get("recent_count");
            entries.push(AutoBanHistoryEntry {
                id: id as u64,
                ban_id: ban_id as u64,
                user_id: row.get("user_id"),
                reason: row.get("reason"),
                issued_at: parse_time(&issued_at)?,
                expires_at: parse_time(&expires_at)?,
                level: level.parse().map_err(StoreError::Backend)?,
                duration_hours: duration_hours as u32,
                recent_count: recent_count as u32,
            });
        }
        Ok(entries)
    }

    async fn get_policy(&self) -> Result<Option<AutoBanPolicy>, StoreError> {
        let row = sqlx::query("SELECT * FROM mod_policy WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        Ok(row.map(|row| {
            let hours = |column: &str| row.get::<i64, _>(column) as u32;
            AutoBanPolicy {
                enabled: row.get("enabled"),
                threshold_count: hours("threshold_count"),
                window_hours: hours("window_hours"),
                first_duration_hours: hours("first_duration_hours"),
                second_duration_hours: hours("second_duration_hours"),
                third_duration_hours: hours("third_duration_hours"),
            }
        }))
    }

    async fn save_policy(&self, policy: &AutoBanPolicy) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO mod_policy
                (id, enabled, threshold_count, window_hours, first_duration_hours,
                 second_duration_hours, third_duration_hours)
            VALUES (1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                threshold_count = excluded.threshold_count,
                window_hours = excluded.window_hours,
                first_duration_hours = excluded.first_duration_hours,
                second_duration_hours = excluded.second_duration_hours,
                third_duration_hours = excluded.third_duration_hours
            "#,
        )
        .bind(policy.enabled)
        .bind(i64::from(policy.threshold_count))
        .bind(i64::from(policy.window_hours))
        .bind(i64::from(policy.first_duration_hours))
        .bind(i64::from(policy.second_duration_hours))
        .bind(i64::from(policy.third_duration_hours))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn append_log(&self, entry: &SystemLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mod_system_logs (id, kind, message, user, at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.id as i64)
        .bind(entry.kind.to_string())
        .bind(&entry.message)
        .bind(&entry.user)
        .bind(entry.at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_logs(&self) -> Result<Vec<SystemLogEntry>, StoreError> {
        let rows = sqlx::query("SELECT id, kind, message, user, at FROM mod_system_logs ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let kind: String = row.get("kind");
            let at: String = row.get("at");
            entries.push(SystemLogEntry {
                id: id as u64,
                kind: kind.parse().map_err(StoreError::Backend)?,
                message: row.get("message"),
                user: row.get("user"),
                at: parse_time(&at)?,
            });
        }
        Ok(entries)
    }

    async fn save_unban_request(&self, request: &UnbanRequest) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mod_unban_requests (id, user_id, reason, submitted_at) VALUES (?, ?, ?, ?)",
        )
        .bind(request.id as i64)
        .bind(&request.user_id)
        .bind(&request.reason)
        .bind(request.submitted_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_unban_requests(&self) -> Result<Vec<UnbanRequest>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, reason, submitted_at FROM mod_unban_requests ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let submitted_at: String = row.get("submitted_at");
            requests.push(UnbanRequest {
                id: id as u64,
                user_id: row.get("user_id"),
                reason: row.get("reason"),
                submitted_at: parse_time(&submitted_at)?,
            });
        }
        Ok(requests)
    }

    async fn delete_unban_request(&self, id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM mod_unban_requests WHERE id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{BanLevel, LogKind, ViolationSeverity};
    use crate::infra::sqlite::open_memory;
    use chrono::Duration;

    async fn store() -> SqliteModerationStore {
        let store = SqliteModerationStore::new(open_memory().await.unwrap());
        store.migrate().await.unwrap();
        store
    }

    fn ban(id: u64, expires_at: BanExpiry) -> BanRecord {
        BanRecord {
            id,
            user_id: "user@example.com".to_string(),
            reason: "Automatic ban - 3 violations detected".to_string(),
            issued_at: Utc::now(),
            expires_at,
            issued_by: IssuedBy::System,
            level: Some(BanLevel::First),
            duration_hours: Some(24),
            lifted: None,
        }
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = store().await;
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_bans_round_trip_and_lift_in_place() {
        let store = store().await;
        let temporary = ban(1, BanExpiry::At(Utc::now() + Duration::hours(24)));
        let permanent = BanRecord {
            issued_by: IssuedBy::User("mod@example.com".to_string()),
            level: None,
            duration_hours: None,
            ..ban(2, BanExpiry::Permanent)
        };
        store.insert_ban(&temporary).await.unwrap();
        store.insert_ban(&permanent).await.unwrap();

        let lift = BanLift {
            by: "mod@example.com".to_string(),
            at: Utc::now(),
        };
        assert!(store.mark_ban_lifted(1, &lift).await.unwrap());
        assert!(!store.mark_ban_lifted(99, &lift).await.unwrap());

        let bans = store.load_bans().await.unwrap();
        assert_eq!(bans.len(), 2);
        assert_eq!(bans[0].id, 1);
        assert_eq!(bans[0].lifted.as_ref().unwrap().by, "mod@example.com");
        assert_eq!(bans[0].level, Some(BanLevel::First));
        assert_eq!(bans[0].reason, temporary.reason);
        assert_eq!(bans[1].expires_at, BanExpiry::Permanent);
        assert_eq!(bans[1].issued_by, IssuedBy::User("mod@example.com".to_string()));
    }

    #[tokio::test]
    async fn test_inserting_a_duplicate_ban_id_conflicts_and_keeps_the_first() {
        let store = store().await;
        let alice = ban(7, BanExpiry::Permanent);
        let bob = BanRecord {
            user_id: "bob@example.com".to_string(),
            reason: "bob's ban".to_string(),
            ..ban(7, BanExpiry::At(Utc::now() + Duration::hours(1)))
        };
        store.insert_ban(&alice).await.unwrap();

        let err = store.insert_ban(&bob).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        let bans = store.load_bans().await.unwrap();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].user_id, alice.user_id);
        assert_eq!(bans[0].reason, alice.reason);
        assert_eq!(bans[0].expires_at, BanExpiry::Permanent);
    }

    #[tokio::test]
    async fn test_tracking_defaults_to_empty_and_round_trips() {
        let store = store().await;
        assert_eq!(
            store.get_tracking("nobody").await.unwrap(),
            ViolationTracking::default()
        );

        let mut tracking = ViolationTracking::default();
        tracking.record(Utc::now());
        tracking.record(Utc::now());
        store.save_tracking("user@example.com", &tracking).await.unwrap();

        let loaded = store.get_tracking("user@example.com").await.unwrap();
        assert_eq!(loaded.count, 2);
        assert_eq!(loaded.violation_timestamps.len(), 2);
        assert_eq!(store.load_tracking().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_violations_load_in_insertion_order() {
        let store = store().await;
        for (id, category) in [(5, "flood"), (3, "restricted_word")] {
            store
                .save_violation(&ViolationRecord {
                    id,
                    user_id: "user@example.com".to_string(),
                    category: category.to_string(),
                    detail: String::new(),
                    severity: ViolationSeverity::High,
                    occurred_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let records = store.load_violations().await.unwrap();
        let categories: Vec<&str> = records.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(categories, vec!["flood", "restricted_word"]);
    }

    #[tokio::test]
    async fn test_policy_is_absent_until_saved() {
        let store = store().await;
        assert_eq!(store.get_policy().await.unwrap(), None);

        let policy = AutoBanPolicy {
            enabled: true,
            ..Default::default()
        };
        store.save_policy(&policy).await.unwrap();
        store.save_policy(&policy).await.unwrap();

        assert_eq!(store.get_policy().await.unwrap(), Some(policy));
    }

    #[tokio::test]
    async fn test_logs_and_unban_requests() {
        let store = store().await;
        store
            .append_log(&SystemLogEntry {
                id: 1,
                kind: LogKind::System,
                message: "Auto ban settings updated".to_string(),
                user: "admin@example.com".to_string(),
                at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.load_logs().await.unwrap()[0].kind, LogKind::System);

        let request = UnbanRequest {
            id: 9,
            user_id: "user@example.com".to_string(),
            reason: "sorry".to_string(),
            submitted_at: Utc::now(),
        };
        store.save_unban_request(&request).await.unwrap();
        assert_eq!(store.load_unban_requests().await.unwrap().len(), 1);

        assert!(store.delete_unban_request(9).await.unwrap());
        assert!(!store.delete_unban_request(9).await.unwrap());
    }
}
