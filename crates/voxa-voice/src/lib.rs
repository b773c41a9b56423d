//! Provider adapters for the Voxa voice relay.
//!
//! Each adapter is a narrow async trait from typed input to typed output or
//! an [`AdapterError`]:
//!
//! | Trait | Implementations |
//! |-------|-----------------|
//! | [`Transcoder`] | [`FfmpegTranscoder`] |
//! | [`Transcriber`] | [`HttpTranscriber`], [`WhisperCliTranscriber`] |
//! | [`LanguageModel`] | [`OllamaModel`] |
//! | [`Synthesizer`] | [`HttpSynthesizer`], [`PiperSynthesizer`] |
//!
//! Adapters never retry. Retry and timeout policy belongs to the caller.

pub mod audio;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod stt;
pub mod transcode;
pub mod tts;

pub use audio::{pcm_to_wav, AudioContainer, NormalizedAudio};
pub use config::{
    LanguageConfig, SpeechBackend, SpeechConfig, TranscoderConfig, TranscriptionBackend,
    TranscriptionConfig,
};
pub use error::AdapterError;
pub use llm::{LanguageModel, OllamaModel};
pub use store::AudioStore;
pub use stt::{transcriber_from_config, HttpTranscriber, Transcriber, WhisperCliTranscriber};
pub use transcode::{FfmpegTranscoder, Transcoder};
pub use tts::{synthesizer_from_config, HttpSynthesizer, PiperSynthesizer, Synthesizer};
