// SQLite connection helpers shared by the sqlx-backed stores.

use crate::core::storage::StoreError;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Open (creating if needed) a database file.
pub async fn open_file(path: &Path) -> anyhow::Result<Pool<Sqlite>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new().connect(&url).await?;
    Ok(pool)
}

/// A private in-memory database. One connection, since every `:memory:`
/// connection would otherwise get its own empty database.
#[cfg(test)]
pub async fn open_memory() -> anyhow::Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

pub fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Like `backend`, but a unique-constraint violation becomes `StoreError::Conflict`.
pub fn insert_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => backend(e),
    }
}

/// Timestamps are stored as RFC 3339 text.
pub fn parse_time(value: &str) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::Backend(format!("invalid timestamp {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_file_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("realtime.db");

        let pool = open_file(&path).await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time("2024-05-01T12:00:00Z").is_ok());
        assert!(matches!(parse_time("yesterday"), Err(StoreError::Backend(_))));
    }
}
