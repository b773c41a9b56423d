//! Voxa server library logic.

pub mod api;
pub mod api_agent;
pub mod api_speech;
pub mod background;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use config::{Config, ConfigError};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use voxa_conversation::{InMemoryStore, StoreSettings};
use voxa_pipeline::{Adapters, FallbackProvider, Pipeline, PipelineSettings};
use voxa_voice::{
    synthesizer_from_config, transcriber_from_config, AudioStore, FfmpegTranscoder, OllamaModel,
};

/// URL prefix of the stored audio files.
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Body limit for the JSON-only routes.
const MAX_JSON_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Directory served under `/uploads`.
    pub upload_dir: PathBuf,
    /// Static client directory, served when it holds an `index.html`.
    pub client_dir: PathBuf,
    /// Body limit for the audio upload routes.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, config: &Config) -> Self {
        Self {
            pipeline,
            upload_dir: config.storage.upload_dir.clone(),
            client_dir: config.server.client_dir.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}

/// Audio store backing `/uploads`.
pub fn audio_store(config: &Config) -> AudioStore {
    AudioStore::new(&config.storage.upload_dir, UPLOADS_PREFIX)
}

/// Builds the provider adapters selected in `config`.
///
/// # Errors
///
/// Returns `ConfigError::Provider` when an HTTP client cannot be built.
pub fn build_adapters(config: &Config) -> Result<Adapters, ConfigError> {
    let model = OllamaModel::new(&config.language)?;
    tracing::info!(
        transcription = ?config.transcription.backend,
        model = model.model_name(),
        speech = ?config.speech.backend,
        "provider adapters configured"
    );

    Ok(Adapters {
        transcoder: Arc::new(FfmpegTranscoder::from_config(&config.transcoder)),
        transcriber: transcriber_from_config(&config.transcription)?,
        model: Arc::new(model),
        synthesizer: synthesizer_from_config(&config.speech, audio_store(config))?,
    })
}

/// Wires the adapters, an in-memory conversation store and the fallback
/// provider into a pipeline.
pub fn build_pipeline(config: &Config, adapters: Adapters) -> Pipeline {
    let store = Arc::new(InMemoryStore::new(StoreSettings {
        max_stored_turns: config.conversation.max_stored_turns,
    }));

    let fallback = match &config.pipeline.fallback_audio_url {
        Some(url) => FallbackProvider::with_audio_url(audio_store(config), url.clone()),
        None => FallbackProvider::new(audio_store(config)),
    };

    let settings = PipelineSettings {
        window_turns: config.conversation.window_turns,
        max_reply_chars: config.pipeline.max_reply_chars,
        voice_id: config.speech.voice_id.clone(),
        preamble: config.conversation.preamble.clone(),
        scratch_dir: config.storage.scratch_dir.clone(),
        timeouts: config.pipeline.timeouts.to_stage_timeouts(),
    };

    Pipeline::new(adapters, store, Arc::new(fallback), settings)
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Audio routes need a larger body limit than the JSON routes.
    let audio_routes = Router::new()
        .route("/tts/echo", post(api_speech::echo_handler))
        .route("/agent/chat/{sessionKey}", post(api_agent::chat_handler))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    let router = Router::new()
        .route("/health", get(api::health))
        .route(
            "/speak",
            post(api_speech::speak_handler).layer(DefaultBodyLimit::max(MAX_JSON_BODY_BYTES)),
        )
        .route(
            "/agent/history/{sessionKey}",
            get(api_agent::history_handler),
        )
        .merge(audio_routes);

    tracing::info!(path = %state.upload_dir.display(), "serving stored audio at /uploads");
    let router = router.nest_service(UPLOADS_PREFIX, ServeDir::new(&state.upload_dir));

    let client_dir = &state.client_dir;
    if !client_dir.is_absolute() {
        tracing::warn!(
            path = %client_dir.display(),
            "client directory is relative; static file serving depends on working directory"
        );
    }
    let index = client_dir.join("index.html");
    let router = if index.exists() {
        tracing::info!(path = %client_dir.display(), "serving client static files");
        router.fallback_service(ServeDir::new(client_dir).fallback(ServeFile::new(index)))
    } else {
        tracing::info!(path = %client_dir.display(), "client directory not found, skipping static file serving");
        router
    };

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
