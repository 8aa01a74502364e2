//! User-scoped read endpoints: quota stats and session listing.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::json;

use kindred_types::error::ChatError;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /user/{username}/stats - remaining quota for today.
///
/// Unknown users have spent nothing, so they report the full limit.
pub async fn user_stats(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Json<serde_json::Value> {
    let quota = state.coordinator.quota();
    let remaining = quota.remaining(&username).await;
    Json(json!({
        "remaining_messages": remaining,
        "daily_limit": quota.daily_limit(),
    }))
}

/// GET /user/{username}/sessions - all sessions, most recent first.
///
/// 404 for unknown users.
pub async fn user_sessions(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = state
        .coordinator
        .quota()
        .find_user(&username)
        .await
        .map_err(ChatError::from)?
        .ok_or(ChatError::UnknownUser)?;

    let sessions = state.coordinator.sessions().list_for_user(&user.id).await;
    Ok(Json(json!({
        "total_sessions": sessions.len(),
        "sessions": sessions,
    })))
}
