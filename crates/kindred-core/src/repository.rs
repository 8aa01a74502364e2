//! Repository trait definitions.
//!
//! Implementations live in kindred-infra (e.g., `SqliteUserRepository`).
//! All traits use native async fn in traits (RPITIT, Rust 2024 edition).

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use kindred_types::chat::{ChatSession, ConversationTurn};
use kindred_types::error::RepositoryError;
use kindred_types::user::{QuotaDecision, UserAccount};

/// Repository for user rows and their daily quota counters.
///
/// Owned exclusively by the quota tracker; no other component writes users.
pub trait UserRepository: Send + Sync {
    /// Look up a user by exact (case-sensitive) username.
    fn find_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserAccount>, RepositoryError>> + Send;

    /// Atomically consume one message from the user's daily quota.
    ///
    /// Creates the row (count = 1) when the user is unknown, resets the
    /// count to 1 when `last_reset_date` is not `today`, increments while
    /// below `limit`, and denies otherwise. Implementations must use
    /// conditional single-statement writes so two concurrent calls can
    /// never both increment from the same stale count.
    fn check_and_consume(
        &self,
        username: &str,
        today: NaiveDate,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<QuotaDecision, RepositoryError>> + Send;
}

/// Repository for chat session rows.
///
/// Owned exclusively by the session store.
pub trait SessionRepository: Send + Sync {
    /// Find the active session for an exact (user, persona) pair.
    fn find_active(
        &self,
        user_id: &Uuid,
        persona: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    /// Update a session's last-activity timestamp.
    fn touch(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Deactivate every active session for the user, then insert `session`
    /// as the single active one. Must run as one atomic unit so the
    /// one-active-session-per-user invariant holds under concurrency.
    fn deactivate_all_and_create(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<ChatSession, RepositoryError>> + Send;

    /// List all sessions for a user, ordered by last_activity DESC.
    fn list_for_user(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;
}

/// Repository for completed conversation turns (append-only).
pub trait ConversationRepository: Send + Sync {
    /// Append one completed turn. Rows are immutable once written.
    fn append(
        &self,
        turn: &ConversationTurn,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List a session's turns, ordered by created_at ASC.
    fn list_for_session(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationTurn>, RepositoryError>> + Send;
}
