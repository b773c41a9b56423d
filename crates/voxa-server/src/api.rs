//! Shared handler plumbing: errors, multipart extraction, pipeline dispatch.

use crate::AppState;
use axum::{
    extract::Multipart,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use thiserror::Error;
use voxa_pipeline::AudioUpload;
use voxa_types::{FatalKind, PipelineResult};

/// Multipart field carrying the recording.
pub const AUDIO_FIELD: &str = "audio";

const DEFAULT_UPLOAD_NAME: &str = "recording.webm";

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Health check handler.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// HTTP status for a finished pipeline run.
///
/// Complete and degraded runs are 200; client-caused fatal kinds are 400 and
/// the rest 500.
pub fn status_for(result: &PipelineResult) -> StatusCode {
    match result.fatal_kind() {
        None => StatusCode::OK,
        Some(kind) if kind.is_client_error() => StatusCode::BAD_REQUEST,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serializes `body` with the status derived from `result`.
pub(crate) fn pipeline_response<T: Serialize>(result: &PipelineResult, body: &T) -> Response {
    (status_for(result), Json(body)).into_response()
}

/// Reads the `audio` field from a multipart body.
///
/// Other fields are skipped. A missing or empty field is a bad request.
pub(crate) async fn read_audio_upload(mut multipart: Multipart) -> Result<AudioUpload, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(e.body_text())
        } else {
            ApiError::BadRequest(format!("multipart error: {}", e))
        }
    })? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_UPLOAD_NAME)
            .to_string();

        let data = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::PayloadTooLarge(e.body_text())
            } else {
                ApiError::BadRequest(format!("failed to read upload: {}", e))
            }
        })?;

        if data.is_empty() {
            break;
        }

        return Ok(AudioUpload {
            bytes: data.to_vec(),
            file_name,
        });
    }

    Err(ApiError::BadRequest(
        FatalKind::InvalidInput.message().to_string(),
    ))
}

/// Runs one upload on its own task so a panic cannot take the handler down.
pub(crate) async fn run_pipeline(
    state: &AppState,
    upload: AudioUpload,
    session: Option<String>,
) -> PipelineResult {
    let pipeline = state.pipeline.clone();
    let key = session.clone();
    let mut result = run_contained(state, async move {
        pipeline.process(upload, session.as_deref()).await
    })
    .await;
    if result.history_len.is_none() {
        if let Some(key) = key {
            result.history_len = Some(state.pipeline.store().len(&key));
        }
    }
    result
}

/// Synthesizes `text` on its own task, like [`run_pipeline`].
pub(crate) async fn run_speak(state: &AppState, text: String) -> PipelineResult {
    let pipeline = state.pipeline.clone();
    run_contained(state, async move { pipeline.speak(&text).await }).await
}

/// A panicked or cancelled run becomes an internal error carrying the
/// fallback audio.
async fn run_contained<F>(state: &AppState, work: F) -> PipelineResult
where
    F: Future<Output = PipelineResult> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "pipeline task failed");
            let mut result = PipelineResult::fatal(FatalKind::Internal);
            result.audio_url = state.pipeline.fallback().audio_url();
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxa_types::Stage;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&PipelineResult::default()), StatusCode::OK);

        let mut degraded = PipelineResult::default();
        degraded.degrade(Stage::Synthesize, "TTS failed: timeout");
        assert_eq!(status_for(&degraded), StatusCode::OK);

        for (kind, status) in [
            (FatalKind::InvalidInput, StatusCode::BAD_REQUEST),
            (FatalKind::NoSpeech, StatusCode::BAD_REQUEST),
            (FatalKind::Transcode, StatusCode::INTERNAL_SERVER_ERROR),
            (FatalKind::Transcription, StatusCode::INTERNAL_SERVER_ERROR),
            (FatalKind::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            assert_eq!(status_for(&PipelineResult::fatal(kind)), status);
        }
    }
}
