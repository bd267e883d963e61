// SQLite-backed message store.
//
// Tables:
// - chat_messages: every persisted message, keyed by (id, sender_id)
// - chat_channels: known group channels

use crate::core::chat::{ChannelInfo, ChatScope, Message, MessageStore};
use crate::core::storage::StoreError;
use crate::infra::sqlite::{backend, parse_time};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteMessageStore {
    pool: Pool<Sqlite>,
}

impl SqliteMessageStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL,
                scope TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                body TEXT NOT NULL,
                kind TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                UNIQUE (id, sender_id)
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_scope
                ON chat_messages(scope, seq);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn save_message(&self, message: &Message) -> Result<u64, StoreError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO chat_messages
                (id, scope, sender_id, sender_name, body, kind, sent_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id as i64)
        .bind(message.scope.id())
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(&message.body)
        .bind(message.kind.to_string())
        .bind(message.sent_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(message.id)
    }

    async fn load_messages(&self, scope: &ChatScope) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, scope, sender_id, sender_name, body, kind, sent_at
            FROM chat_messages
            WHERE scope = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(scope.id())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let scope: String = row.get("scope");
            let kind: String = row.get("kind");
            let sent_at: String = row.get("sent_at");

            messages.push(Message {
                id: id as u64,
                scope: scope
                    .parse()
                    .map_err(|e| StoreError::Backend(format!("bad stored scope: {e}")))?,
                sender_id: row.get("sender_id"),
                sender_name: row.get("sender_name"),
                body: row.get("body"),
                kind: kind.parse().map_err(StoreError::Backend)?,
                sent_at: parse_time(&sent_at)?,
            });
        }
        Ok(messages)
    }

    async fn save_channel(&self, channel: &ChannelInfo) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_channels (id, name, created_by, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                created_by = excluded.created_by,
                created_at = excluded.created_at
            "#,
        )
        .bind(&channel.id)
        .bind(&channel.name)
        .bind(&channel.created_by)
        .bind(channel.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_channels(&self) -> Result<Vec<ChannelInfo>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, created_by, created_at FROM chat_channels ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                Ok(ChannelInfo {
                    id: row.get("id"),
                    name: row.get("name"),
                    created_by: row.get("created_by"),
                    created_at: parse_time(&created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat::MessageKind;
    use crate::infra::sqlite::open_memory;
    use chrono::Utc;

    async fn store() -> SqliteMessageStore {
        let store = SqliteMessageStore::new(open_memory().await.unwrap());
        store.migrate().await.unwrap();
        store
    }

    fn message(id: u64, scope: ChatScope, body: &str) -> Message {
        Message {
            id,
            scope,
            sender_id: "alice@example.com".to_string(),
            sender_name: "Alice".to_string(),
            body: body.to_string(),
            kind: MessageKind::Text,
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_messages_load_back_in_insertion_order() {
        let store = store().await;
        let scope = ChatScope::private("bob@example.com", "alice@example.com");

        store.save_message(&message(20, scope.clone(), "second id, first saved")).await.unwrap();
        store.save_message(&message(10, scope.clone(), "first id, second saved")).await.unwrap();
        store.save_message(&message(30, ChatScope::Public, "elsewhere")).await.unwrap();

        let loaded = store.load_messages(&scope).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, 20);
        assert_eq!(loaded[0].scope, scope);
        assert_eq!(loaded[1].body, "first id, second saved");
    }

    #[tokio::test]
    async fn test_duplicate_saves_are_ignored() {
        let store = store().await;
        let m = message(1, ChatScope::Public, "hello");

        store.save_message(&m).await.unwrap();
        store.save_message(&m).await.unwrap();

        assert_eq!(store.load_messages(&ChatScope::Public).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_channels_upsert_by_id() {
        let store = store().await;
        let mut channel = ChannelInfo {
            id: "study-hall".to_string(),
            name: "Study Hall".to_string(),
            created_by: "teacher@example.com".to_string(),
            created_at: Utc::now(),
        };
        store.save_channel(&channel).await.unwrap();

        channel.name = "Quiet Study Hall".to_string();
        store.save_channel(&channel).await.unwrap();

        let channels = store.load_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Quiet Study Hall");
    }
}
