//! Persona listing and selection endpoints.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use kindred_core::persona;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /personas - all personas keyed by registry key, prompts excluded.
pub async fn list_personas() -> Json<serde_json::Value> {
    Json(json!(persona::all_profiles()))
}

/// Request body for persona selection.
#[derive(Debug, Deserialize)]
pub struct SelectPersonaRequest {
    pub username: Option<String>,
    pub persona: Option<String>,
}

/// POST /persona/select - switch an existing user's active persona.
///
/// 400 when either field is missing or blank, 404 for unknown users.
pub async fn select_persona(
    State(state): State<AppState>,
    Json(body): Json<SelectPersonaRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let username = body
        .username
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::Validation("username is required".to_string()))?;
    let persona_key = body
        .persona
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("persona is required".to_string()))?;

    let session = state
        .coordinator
        .select_persona(&username, &persona_key)
        .await?;

    // The key was validated by select_persona, so the lookup cannot miss.
    let display_name = persona::get(&persona_key)
        .map(|p| p.name)
        .unwrap_or(persona_key.as_str());

    Ok(Json(json!({
        "success": true,
        "session_id": session.id,
        "persona": persona_key,
        "message": format!("Now chatting with {display_name}"),
    })))
}
