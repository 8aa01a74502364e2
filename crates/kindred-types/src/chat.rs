//! Chat session and conversation turn types.
//!
//! A session is the scoped context between one user and one persona; a turn
//! is one user message plus the model's reply, persisted as a single row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat session between a user and a persona.
///
/// At most one session per user is active at any time; switching personas
/// deactivates every other active session for that user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub persona: String,
    pub is_active: bool,
    pub last_activity: DateTime<Utc>,
}

/// One completed turn: a user message and the model's full response.
///
/// Immutable once written; written exactly once per turn, after the full
/// response is known, even when delivery to the client was streamed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub persona: String,
    pub message: String,
    pub response: String,
    pub token_count: u32,
    pub created_at: DateTime<Utc>,
}
