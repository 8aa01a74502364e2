//! Session store and conversation log.
//!
//! The session store enforces the one-active-session-per-user invariant:
//! switching personas deactivates every other active session for the user,
//! so a user is only ever "in" one conversation at a time. The conversation
//! log is the append-only record of completed turns.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use kindred_types::chat::{ChatSession, ConversationTurn};
use kindred_types::error::RepositoryError;

use crate::repository::{ConversationRepository, SessionRepository};

/// Resolves and lists chat sessions.
pub struct SessionStore<S> {
    sessions: S,
}

impl<S: SessionRepository> SessionStore<S> {
    pub fn new(sessions: S) -> Self {
        Self { sessions }
    }

    /// Resolve the active session for a (user, persona) pair.
    ///
    /// Reuses the active session when one exists for this exact pair,
    /// refreshing its last-activity stamp. Otherwise deactivates every
    /// active session the user has and creates a fresh one. Repeated calls
    /// with no intervening persona switch return the same session id.
    pub async fn resolve(
        &self,
        user_id: &Uuid,
        persona: &str,
    ) -> Result<ChatSession, RepositoryError> {
        let now = Utc::now();
        if let Some(mut session) = self.sessions.find_active(user_id, persona).await? {
            self.sessions.touch(&session.id, now).await?;
            session.last_activity = now;
            return Ok(session);
        }
        let session = ChatSession {
            id: Uuid::now_v7(),
            user_id: *user_id,
            persona: persona.to_string(),
            is_active: true,
            last_activity: now,
        };
        self.sessions.deactivate_all_and_create(&session).await
    }

    /// All sessions for a user, most recently active first.
    ///
    /// Degrades to an empty list on storage failure; listing is a
    /// convenience read, not a correctness path.
    pub async fn list_for_user(&self, user_id: &Uuid) -> Vec<ChatSession> {
        match self.sessions.list_for_user(user_id).await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(%user_id, error = %err, "session listing failed");
                Vec::new()
            }
        }
    }
}

/// Append-only log of completed conversation turns.
pub struct ConversationLog<C> {
    conversations: C,
}

impl<C: ConversationRepository> ConversationLog<C> {
    pub fn new(conversations: C) -> Self {
        Self { conversations }
    }

    /// Record one completed turn. Called exactly once per turn, after the
    /// full model response is known.
    pub async fn record(&self, turn: &ConversationTurn) -> Result<(), RepositoryError> {
        self.conversations.append(turn).await
    }

    /// A session's turns in chronological order.
    ///
    /// Degrades to an empty history on storage failure so a broken read
    /// path costs context, not the whole turn.
    pub async fn history(&self, session_id: &Uuid) -> Vec<ConversationTurn> {
        match self.conversations.list_for_session(session_id).await {
            Ok(turns) => turns,
            Err(err) => {
                warn!(%session_id, error = %err, "history fetch failed, continuing without it");
                Vec::new()
            }
        }
    }
}
