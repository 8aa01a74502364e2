use thiserror::Error;

/// Errors from repository operations (used by trait definitions in kindred-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by a chat turn, classified for status-code mapping.
///
/// `UnknownUser`, `UnknownPersona` and `MissingField` are caller errors and
/// safe to show. `QuotaExceeded` is its own class so transports can answer
/// with 429. `Dependency` wraps store/provider faults; its detail is for
/// logs only and must never reach the caller verbatim.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("user not found")]
    UnknownUser,

    #[error("invalid persona: '{0}'")]
    UnknownPersona(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("daily message limit exceeded")]
    QuotaExceeded,

    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        ChatError::Dependency(e.to_string())
    }
}

impl From<crate::llm::LlmError> for ChatError {
    fn from(e: crate::llm::LlmError) -> Self {
        ChatError::Dependency(e.to_string())
    }
}
