//! SQLite-backed session store.
//!
//! One row per `session_id`. The message list is stored as a JSON array and
//! replaced wholesale on every save.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::error::StorageError;
use crate::models::{Message, SessionRecord};

const MAX_CONNECTIONS: u32 = 4;

#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Open (creating if missing) the database at `path` and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        tracing::info!("Session store ready at {}", path.display());
        Ok(store)
    }

    /// Create the sessions table and owner index if they do not exist.
    pub async fn init(&self) -> Result<(), StorageError> {
        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS sessions (
                pk INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                user_id TEXT,
                messages TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upsert a session.
    ///
    /// An existing row keeps its `created_at` and, when `user_id` is `None`,
    /// its stored owner. The message list is always replaced.
    pub async fn save(
        &self,
        session_id: &str,
        messages: &[Message],
        user_id: Option<&str>,
    ) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(messages)?;

        sqlx::query(
            "\
            INSERT INTO sessions (session_id, user_id, messages) VALUES (?1, ?2, ?3)
            ON CONFLICT(session_id) DO UPDATE SET
                messages = excluded.messages,
                user_id = COALESCE(excluded.user_id, sessions.user_id)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(encoded)
        .execute(&self.pool)
        .await?;

        tracing::info!("Session saved: {session_id} ({} messages)", messages.len());
        Ok(())
    }

    /// Messages stored for `session_id`; empty when the id is unknown.
    pub async fn get(&self, session_id: &str) -> Result<Vec<Message>, StorageError> {
        let row = sqlx::query("SELECT messages FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let encoded: String = row.try_get("messages")?;
                let messages = serde_json::from_str(&encoded)?;
                tracing::debug!("Session retrieved: {session_id}");
                Ok(messages)
            }
            None => Ok(Vec::new()),
        }
    }

    /// All sessions owned by `user_id`, most recent first.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>, StorageError> {
        let rows = sqlx::query(
            "\
            SELECT session_id, messages, created_at
            FROM sessions
            WHERE user_id = ?1
            ORDER BY created_at DESC, pk DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let sessions = rows
            .into_iter()
            .map(|row| {
                let encoded: String = row.try_get("messages")?;
                let created_at: String = row.try_get("created_at")?;
                Ok(SessionRecord {
                    session_id: row.try_get("session_id")?,
                    messages: serde_json::from_str(&encoded)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        tracing::debug!("Listed {} sessions for user {user_id}", sessions.len());
        Ok(sessions)
    }

    /// Close the pool; later calls fail with a storage error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&dir.path().join("chat.db")).await.unwrap();
        store.init().await.unwrap();
        store.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("chat.db");
        SessionStore::open(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_save_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&dir.path().join("chat.db")).await.unwrap();

        store.save("s1", &[Message::user("hi")], Some("u1")).await.unwrap();
        let before = store.list_by_user("u1").await.unwrap()[0].created_at;

        store
            .save("s1", &[Message::user("hi"), Message::bot("hello")], None)
            .await
            .unwrap();
        let after = store.list_by_user("u1").await.unwrap()[0].created_at;

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_closed_store_reports_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&dir.path().join("chat.db")).await.unwrap();
        store.close().await;

        let err = store.get("s1").await.unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));
    }
}
