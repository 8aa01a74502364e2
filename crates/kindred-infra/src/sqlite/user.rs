//! SQLite user repository implementation.
//!
//! Implements `UserRepository` from `kindred-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, and conditional
//! single-statement writes for the quota counter.

use chrono::NaiveDate;
use sqlx::Row;
use uuid::Uuid;

use kindred_core::repository::UserRepository;
use kindred_types::error::RepositoryError;
use kindred_types::user::{QuotaDecision, UserAccount};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `UserRepository`.
pub struct SqliteUserRepository {
    pool: DatabasePool,
}

impl SqliteUserRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain UserAccount.
struct UserRow {
    id: String,
    username: String,
    daily_message_count: i64,
    last_reset_date: String,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            daily_message_count: row.try_get("daily_message_count")?,
            last_reset_date: row.try_get("last_reset_date")?,
        })
    }

    fn into_account(self) -> Result<UserAccount, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid user id: {e}")))?;
        let last_reset_date: NaiveDate = self
            .last_reset_date
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid reset date: {e}")))?;

        Ok(UserAccount {
            id,
            username: self.username,
            daily_message_count: self.daily_message_count as u32,
            last_reset_date,
        })
    }
}

impl UserRepository for SqliteUserRepository {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let user_row =
                    UserRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(user_row.into_account()?))
            }
            None => Ok(None),
        }
    }

    /// Spend one quota slot with conditional single-statement writes.
    ///
    /// Each statement carries its own guard, so the read and the write can
    /// never straddle a concurrent update: the same-day increment only fires
    /// below the limit, the reset only fires on a stale date, and the insert
    /// only fires when the username is free. An insert that loses a creation
    /// race retries the whole sequence once.
    async fn check_and_consume(
        &self,
        username: &str,
        today: NaiveDate,
        limit: u32,
    ) -> Result<QuotaDecision, RepositoryError> {
        if limit == 0 {
            return Ok(QuotaDecision::denied());
        }
        let today_str = today.to_string();

        for _ in 0..2 {
            // Same-day increment, guarded by the limit.
            let row = sqlx::query(
                r#"UPDATE users
                   SET daily_message_count = daily_message_count + 1
                   WHERE username = ? AND last_reset_date = ? AND daily_message_count < ?
                   RETURNING daily_message_count"#,
            )
            .bind(username)
            .bind(&today_str)
            .bind(limit as i64)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

            if let Some(row) = row {
                let count: i64 = row
                    .try_get("daily_message_count")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                return Ok(QuotaDecision::allowed(limit.saturating_sub(count as u32)));
            }

            // Stale date: today's first message resets the counter to 1.
            let row = sqlx::query(
                r#"UPDATE users
                   SET daily_message_count = 1, last_reset_date = ?
                   WHERE username = ? AND last_reset_date <> ?
                   RETURNING daily_message_count"#,
            )
            .bind(&today_str)
            .bind(username)
            .bind(&today_str)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

            if row.is_some() {
                return Ok(QuotaDecision::allowed(limit - 1));
            }

            // Unknown user: create lazily with today's first message spent.
            let result = sqlx::query(
                r#"INSERT INTO users (id, username, daily_message_count, last_reset_date)
                   VALUES (?, ?, 1, ?)
                   ON CONFLICT(username) DO NOTHING"#,
            )
            .bind(Uuid::now_v7().to_string())
            .bind(username)
            .bind(&today_str)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

            if result.rows_affected() == 1 {
                return Ok(QuotaDecision::allowed(limit - 1));
            }
            // Lost a creation race: the row exists now, go around again.
        }

        // The row exists, is dated today, and sits at the limit.
        Ok(QuotaDecision::denied())
    }
}
