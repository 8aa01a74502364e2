//! Session-scoped conversation history endpoint.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

/// GET /session/{id}/conversations - a session's turns in order.
///
/// Unknown sessions simply have no turns; history reads degrade to empty.
pub async fn session_conversations(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Json<serde_json::Value> {
    let conversations = state.coordinator.conversations().history(&session_id).await;
    Json(json!({
        "total_messages": conversations.len(),
        "conversations": conversations,
    }))
}
