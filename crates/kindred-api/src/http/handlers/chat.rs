//! Chat endpoint, streaming and non-streaming.
//!
//! POST /chat (JSON body) and GET /chat (query params, for EventSource
//! clients). With `stream: true` (the default) the reply is SSE where each
//! event's data is one JSON payload: `{"response", "type": "chunk"}`
//! repeated, then one terminal `{"...", "type": "complete"}` or
//! `{"error", "type": "error"}`. With `stream: false` the reply is a single
//! JSON body.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;

use kindred_core::chat::TurnRequest;
use kindred_types::error::ChatError;

use crate::http::error::AppError;
use crate::state::AppState;

/// Chat parameters, identical in body and query form.
#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub message: Option<String>,
    pub persona: Option<String>,
    pub username: Option<String>,
    /// Defaults to true; `false` selects the single-body reply.
    pub stream: Option<bool>,
}

impl ChatParams {
    fn into_request(self) -> Result<(TurnRequest, bool), ChatError> {
        let stream = self.stream.unwrap_or(true);
        let message = require("message", self.message)?;
        let persona = require("persona", self.persona)?;
        let username = require("username", self.username)?;
        Ok((
            TurnRequest {
                username,
                persona,
                message,
            },
            stream,
        ))
    }
}

fn require(name: &'static str, value: Option<String>) -> Result<String, ChatError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ChatError::MissingField(name)),
    }
}

/// POST /chat - JSON body form.
pub async fn chat_post(
    State(state): State<AppState>,
    Json(params): Json<ChatParams>,
) -> Result<Response, AppError> {
    run_chat(state, params).await
}

/// GET /chat - query param form, for EventSource clients.
pub async fn chat_get(
    State(state): State<AppState>,
    Query(params): Query<ChatParams>,
) -> Result<Response, AppError> {
    run_chat(state, params).await
}

async fn run_chat(state: AppState, params: ChatParams) -> Result<Response, AppError> {
    let (request, stream) = params.into_request().map_err(AppError::from)?;

    if !stream {
        let reply = state.coordinator.complete_turn(request).await?;
        return Ok(Json(reply).into_response());
    }

    let turn_stream = state.coordinator.clone().stream_turn(request).await?;
    let sse_stream = turn_stream.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().data(data))
    });

    Ok(Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response())
}
