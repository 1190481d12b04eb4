//! Conversation history storage
//!
//! A [`ConversationStore`] keeps each session's ordered message history and
//! its last-visit timestamp. `save` always replaces the whole history.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::catalog::Deal;
use crate::conversation::{Message, MessageKind, Role};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt stored record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Ordered history for `session`; empty when nothing was saved
    async fn load(&self, session: &str) -> Result<Vec<Message>, StoreError>;

    /// Replace the full history for `session`
    async fn save(&self, session: &str, messages: &[Message]) -> Result<(), StoreError>;

    /// Drop the history for `session`. The last-visit timestamp is kept.
    async fn clear(&self, session: &str) -> Result<(), StoreError>;

    async fn last_visit(&self, session: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn record_visit(&self, session: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// SQLite-backed store
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database, mainly for tests
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        // A single connection, since each in-memory connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                last_visit TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                session_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                kind TEXT NOT NULL,
                deals TEXT,
                PRIMARY KEY (session_id, position),
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decode_row(role: String, content: String, kind: String, deals: Option<String>) -> Result<Message, StoreError> {
    let role = Role::parse(&role).ok_or_else(|| StoreError::Corrupt(format!("unknown role {role:?}")))?;
    let kind = MessageKind::parse(&kind).ok_or_else(|| StoreError::Corrupt(format!("unknown kind {kind:?}")))?;
    let deals: Vec<Deal> = match deals {
        Some(json) => serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        None => Vec::new(),
    };

    Ok(Message {
        role,
        content,
        kind,
        deals,
    })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn load(&self, session: &str) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT role, content, kind, deals
            FROM messages
            WHERE session_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(session)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(role, content, kind, deals)| decode_row(role, content, kind, deals))
            .collect()
    }

    async fn save(&self, session: &str, messages: &[Message]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id) VALUES (?)")
            .bind(session)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session)
            .execute(&mut *tx)
            .await?;

        for (position, message) in messages.iter().enumerate() {
            let deals = if message.deals.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&message.deals).map_err(|e| StoreError::Corrupt(e.to_string()))?)
            };

            sqlx::query(
                r#"
                INSERT INTO messages (session_id, position, role, content, kind, deals)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session)
            .bind(position as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.kind.as_str())
            .bind(deals)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE sessions SET updated_at = datetime('now') WHERE id = ?")
            .bind(session)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, session: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn last_visit(&self, session: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT last_visit FROM sessions WHERE id = ?")
            .bind(session)
            .fetch_optional(&self.pool)
            .await?;

        match row.and_then(|(at,)| at) {
            Some(at) => DateTime::parse_from_rfc3339(&at)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| StoreError::Corrupt(format!("last_visit {at:?}: {e}"))),
            None => Ok(None),
        }
    }

    async fn record_visit(&self, session: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, last_visit) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET last_visit = excluded.last_visit
            "#,
        )
        .bind(session)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Debug, Default)]
struct SessionRecord {
    messages: Vec<Message>,
    last_visit: Option<DateTime<Utc>>,
}

/// Process-local store; history is lost on restart
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, session: &str) -> Result<Vec<Message>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(session).map(|r| r.messages.clone()).unwrap_or_default())
    }

    async fn save(&self, session: &str, messages: &[Message]) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(session.to_string()).or_default().messages = messages.to_vec();
        Ok(())
    }

    async fn clear(&self, session: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(record) = sessions.get_mut(session) {
            record.messages.clear();
        }
        Ok(())
    }

    async fn last_visit(&self, session: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(session).and_then(|r| r.last_visit))
    }

    async fn record_visit(&self, session: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(session.to_string()).or_default().last_visit = Some(at);
        Ok(())
    }
}
