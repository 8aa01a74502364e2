//! Per-user daily message quota.
//!
//! The counter lives on the user row and is only meaningful relative to its
//! reset date: a stale date means the count is logically zero. All writes go
//! through [`UserRepository::check_and_consume`], which is atomic, so two
//! concurrent requests can never both spend the same remaining slot.

use chrono::Utc;
use tracing::warn;

use kindred_types::error::RepositoryError;
use kindred_types::user::{QuotaDecision, UserAccount};

use crate::repository::UserRepository;

/// Tracks and enforces the per-user daily message quota.
pub struct QuotaTracker<U> {
    users: U,
    daily_limit: u32,
}

impl<U: UserRepository> QuotaTracker<U> {
    pub fn new(users: U, daily_limit: u32) -> Self {
        Self { users, daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Atomically spend one message from the user's quota for today.
    ///
    /// Creates the user lazily on their first ever message. Fails closed:
    /// a storage error denies the message rather than granting a free one.
    pub async fn check_and_consume(&self, username: &str) -> QuotaDecision {
        let today = Utc::now().date_naive();
        match self
            .users
            .check_and_consume(username, today, self.daily_limit)
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                warn!(username, error = %err, "quota check failed, denying message");
                QuotaDecision::denied()
            }
        }
    }

    /// How many messages the user has left today, without consuming one.
    ///
    /// Unknown users and users whose reset date is stale get the full limit.
    pub async fn remaining(&self, username: &str) -> u32 {
        let today = Utc::now().date_naive();
        match self.users.find_by_username(username).await {
            Ok(Some(user)) if user.last_reset_date == today => {
                self.daily_limit.saturating_sub(user.daily_message_count)
            }
            Ok(_) => self.daily_limit,
            Err(err) => {
                warn!(username, error = %err, "remaining-quota lookup failed");
                0
            }
        }
    }

    /// Look up the user row. The quota tracker owns user storage, so other
    /// services resolve identities through it.
    pub async fn find_user(
        &self,
        username: &str,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        self.users.find_by_username(username).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct MemUsers {
        rows: Mutex<HashMap<String, UserAccount>>,
        fail: bool,
    }

    impl MemUsers {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
                fail: true,
            }
        }

        fn seed(&self, username: &str, count: u32, date: NaiveDate) {
            self.rows.lock().unwrap().insert(
                username.to_string(),
                UserAccount {
                    id: Uuid::now_v7(),
                    username: username.to_string(),
                    daily_message_count: count,
                    last_reset_date: date,
                },
            );
        }
    }

    impl UserRepository for MemUsers {
        async fn find_by_username(
            &self,
            username: &str,
        ) -> Result<Option<UserAccount>, RepositoryError> {
            if self.fail {
                return Err(RepositoryError::Connection);
            }
            Ok(self.rows.lock().unwrap().get(username).cloned())
        }

        async fn check_and_consume(
            &self,
            username: &str,
            today: NaiveDate,
            limit: u32,
        ) -> Result<QuotaDecision, RepositoryError> {
            if self.fail {
                return Err(RepositoryError::Connection);
            }
            let mut rows = self.rows.lock().unwrap();
            let user = rows.entry(username.to_string()).or_insert(UserAccount {
                id: Uuid::now_v7(),
                username: username.to_string(),
                daily_message_count: 0,
                last_reset_date: today,
            });
            if user.last_reset_date != today {
                user.last_reset_date = today;
                user.daily_message_count = 0;
            }
            if user.daily_message_count >= limit {
                return Ok(QuotaDecision::denied());
            }
            user.daily_message_count += 1;
            Ok(QuotaDecision::allowed(limit - user.daily_message_count))
        }
    }

    #[tokio::test]
    async fn test_first_message_creates_user_with_full_remaining() {
        let tracker = QuotaTracker::new(MemUsers::new(), 50);
        let decision = tracker.check_and_consume("alice").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 49);
        assert!(tracker.find_user("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_quota_exhausts_at_limit() {
        let tracker = QuotaTracker::new(MemUsers::new(), 3);
        for expected in [2, 1, 0] {
            let decision = tracker.check_and_consume("bob").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
        }
        let decision = tracker.check_and_consume("bob").await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_stale_date_resets_count() {
        let users = MemUsers::new();
        let yesterday = Utc::now().date_naive().pred_opt().unwrap();
        users.seed("carol", 50, yesterday);
        let tracker = QuotaTracker::new(users, 50);
        let decision = tracker.check_and_consume("carol").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 49);
    }

    #[tokio::test]
    async fn test_storage_failure_denies() {
        let tracker = QuotaTracker::new(MemUsers::failing(), 50);
        let decision = tracker.check_and_consume("dave").await;
        assert!(!decision.allowed);
        assert_eq!(tracker.remaining("dave").await, 0);
    }

    #[tokio::test]
    async fn test_remaining_without_consuming() {
        let users = MemUsers::new();
        users.seed("erin", 20, Utc::now().date_naive());
        let tracker = QuotaTracker::new(users, 50);
        assert_eq!(tracker.remaining("erin").await, 30);
        assert_eq!(tracker.remaining("erin").await, 30);
        // Unknown users have spent nothing.
        assert_eq!(tracker.remaining("frank").await, 50);
    }
}
