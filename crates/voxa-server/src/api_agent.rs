//! Session-aware conversation handlers.

use crate::api::{pipeline_response, read_audio_upload, run_pipeline, ApiError};
use crate::AppState;
use axum::{
    extract::{Extension, Multipart, Path},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use voxa_types::Turn;

/// Response body for `GET /agent/history/{sessionKey}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<Turn>,
    pub history_len: usize,
}

/// Handler for `POST /agent/chat/{sessionKey}`.
pub async fn chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_key): Path<String>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    if session_key.trim().is_empty() {
        return Err(ApiError::BadRequest("session key must not be empty".to_string()));
    }
    let upload = read_audio_upload(multipart).await?;

    let result = run_pipeline(&state, upload, Some(session_key)).await;
    Ok(pipeline_response(&result, &result))
}

/// Handler for `GET /agent/history/{sessionKey}`.
///
/// Unknown sessions answer with an empty history.
pub async fn history_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Json<HistoryResponse> {
    let history = state.pipeline.store().all(&session_key);
    Json(HistoryResponse {
        session_id: session_key,
        history_len: history.len(),
        history,
    })
}
