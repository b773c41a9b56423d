//! Voice conversation pipeline.
//!
//! [`Pipeline::process`] takes one uploaded recording through four stages:
//! transcode to 16 kHz mono WAV, transcribe, generate a reply from the
//! conversation window, and synthesize the reply. Each stage runs under its
//! own timeout. Transcode and transcription failures are fatal; language
//! and synthesis failures fall back to [`FallbackProvider`] content.

pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod scratch;

pub use error::{FallbackError, StageError};
pub use fallback::{FallbackProvider, FALLBACK_AUDIO_STEM};
pub use orchestrator::{
    truncate_chars, Adapters, AudioUpload, Pipeline, PipelineSettings, StageTimeouts,
    DEFAULT_MAX_REPLY_CHARS,
};
pub use scratch::ScratchFiles;
