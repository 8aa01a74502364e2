//! SQLite conversation repository implementation.
//!
//! Conversation rows are append-only: one row per completed turn, never
//! updated or deleted.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use kindred_core::repository::ConversationRepository;
use kindred_types::chat::ConversationTurn;
use kindred_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConversationRepository`.
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain ConversationTurn.
struct ConversationRow {
    id: String,
    user_id: String,
    session_id: String,
    persona: String,
    message: String,
    response: String,
    token_count: i64,
    created_at: String,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            session_id: row.try_get("session_id")?,
            persona: row.try_get("persona")?,
            message: row.try_get("message")?,
            response: row.try_get("response")?,
            token_count: row.try_get("token_count")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_turn(self) -> Result<ConversationTurn, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid turn id: {e}")))?;
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| RepositoryError::Query(format!("invalid user_id: {e}")))?;
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| RepositoryError::Query(format!("invalid session_id: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))?;

        Ok(ConversationTurn {
            id,
            user_id,
            session_id,
            persona: self.persona,
            message: self.message,
            response: self.response,
            token_count: self.token_count as u32,
            created_at,
        })
    }
}

impl ConversationRepository for SqliteConversationRepository {
    async fn append(&self, turn: &ConversationTurn) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversations (id, user_id, session_id, persona, message, response, token_count, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(turn.id.to_string())
        .bind(turn.user_id.to_string())
        .bind(turn.session_id.to_string())
        .bind(&turn.persona)
        .bind(&turn.message)
        .bind(&turn.response)
        .bind(turn.token_count as i64)
        .bind(turn.created_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: &Uuid,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE session_id = ? ORDER BY created_at ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in &rows {
            let turn_row = ConversationRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            turns.push(turn_row.into_turn()?);
        }

        Ok(turns)
    }
}
