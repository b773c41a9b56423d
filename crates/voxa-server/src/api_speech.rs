//! Stateless speech handlers: text-to-speech and the echo round trip.

use crate::api::{pipeline_response, read_audio_upload, run_pipeline, run_speak, ApiError};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Multipart},
    response::Response,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

/// Request body for `POST /speak`.
#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    #[serde(default)]
    pub text: String,
}

/// Handler for `POST /speak`.
///
/// Synthesizes the given text. A synthesis failure still answers 200 with
/// the fallback clip and an `error`.
pub async fn speak_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SpeakRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("No text provided".to_string()));
    }

    let result = run_speak(&state, request.text).await;
    Ok(pipeline_response(&result, &result))
}

/// Handler for `POST /tts/echo`.
///
/// Runs the full pipeline on a recording without a session: the reply is
/// generated from the transcript alone and no history is kept.
pub async fn echo_handler(
    Extension(state): Extension<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_audio_upload(multipart).await?;
    let result = run_pipeline(&state, upload, None).await;
    Ok(pipeline_response(&result, &result))
}
