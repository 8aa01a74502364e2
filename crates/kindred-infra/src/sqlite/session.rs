//! SQLite session repository implementation.
//!
//! The one-active-session-per-user invariant is enforced twice: the
//! deactivate-then-insert runs inside a single transaction, and a partial
//! unique index on `(user_id) WHERE is_active = 1` rejects any second
//! active row that slips past it.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use kindred_core::repository::SessionRepository;
use kindred_types::chat::ChatSession;
use kindred_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SessionRepository`.
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain ChatSession.
struct ChatSessionRow {
    id: String,
    user_id: String,
    persona: String,
    is_active: i64,
    last_activity: String,
}

impl ChatSessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            persona: row.try_get("persona")?,
            is_active: row.try_get("is_active")?,
            last_activity: row.try_get("last_activity")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| RepositoryError::Query(format!("invalid user_id: {e}")))?;
        let last_activity = parse_datetime(&self.last_activity)?;

        Ok(ChatSession {
            id,
            user_id,
            persona: self.persona,
            is_active: self.is_active != 0,
            last_activity,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl SessionRepository for SqliteSessionRepository {
    async fn find_active(
        &self,
        user_id: &Uuid,
        persona: &str,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ? AND persona = ? AND is_active = 1",
        )
        .bind(user_id.to_string())
        .bind(persona)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row = ChatSessionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn touch(&self, session_id: &Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE chat_sessions SET last_activity = ? WHERE id = ?")
            .bind(format_datetime(&at))
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn deactivate_all_and_create(
        &self,
        session: &ChatSession,
    ) -> Result<ChatSession, RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("UPDATE chat_sessions SET is_active = 0 WHERE user_id = ? AND is_active = 1")
            .bind(session.user_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO chat_sessions (id, user_id, persona, is_active, last_activity)
               VALUES (?, ?, ?, 1, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(&session.persona)
        .bind(format_datetime(&session.last_activity))
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(session.clone())
    }

    async fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ? ORDER BY last_activity DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row = ChatSessionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }
}
