//! Provider settings, deserialized from the `[transcoder]`, `[transcription]`,
//! `[language]` and `[speech]` sections of the server config.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

fn default_ffmpeg_binary() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_transcode_timeout_secs() -> u64 {
    30
}

fn default_transcription_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_whisper_binary() -> PathBuf {
    PathBuf::from("whisper-cli")
}

fn default_whisper_model() -> PathBuf {
    PathBuf::from("models/ggml-base.en.bin")
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_language_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_language_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    256
}

fn default_speech_endpoint() -> String {
    "https://api.murf.ai/v1/speech/generate".to_string()
}

fn default_voice_id() -> String {
    "en-US-natalie".to_string()
}

fn default_speech_format() -> String {
    "MP3".to_string()
}

fn default_piper_binary() -> PathBuf {
    PathBuf::from("piper")
}

fn default_piper_model() -> PathBuf {
    PathBuf::from("voices/en_US-lessac-medium.onnx")
}

fn default_piper_sample_rate() -> u32 {
    22050
}

/// Settings for the `ffmpeg` transcoder.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: PathBuf,
    #[serde(default = "default_transcode_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: default_ffmpeg_binary(),
            timeout_secs: default_transcode_timeout_secs(),
        }
    }
}

impl TranscoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which speech-to-text implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionBackend {
    /// OpenAI-compatible `/v1/audio/transcriptions` endpoint.
    #[default]
    Http,
    /// Local whisper.cpp binary.
    WhisperCli,
}

#[derive(Clone, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default)]
    pub backend: TranscriptionBackend,
    #[serde(default = "default_transcription_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_transcription_model")]
    pub model: String,
    /// ISO-639-1 hint passed to the provider.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_whisper_binary")]
    pub whisper_binary: PathBuf,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: PathBuf,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            backend: TranscriptionBackend::default(),
            endpoint: default_transcription_endpoint(),
            api_key: String::new(),
            model: default_transcription_model(),
            language: None,
            whisper_binary: default_whisper_binary(),
            whisper_model: default_whisper_model(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("language", &self.language)
            .field("whisper_binary", &self.whisper_binary)
            .field("whisper_model", &self.whisper_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Settings for the hosted language model (Ollama `generate` API).
#[derive(Clone, Deserialize)]
pub struct LanguageConfig {
    #[serde(default = "default_language_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_language_model")]
    pub model: String,
    /// Sent as a bearer token when non-empty (for proxied deployments).
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_language_endpoint(),
            model: default_language_model(),
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl fmt::Debug for LanguageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Which text-to-speech implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechBackend {
    /// Hosted API that returns a URL to the rendered audio.
    #[default]
    Http,
    /// Local Piper binary; output is stored in the audio store.
    Piper,
}

#[derive(Clone, Deserialize)]
pub struct SpeechConfig {
    #[serde(default)]
    pub backend: SpeechBackend,
    #[serde(default = "default_speech_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_speech_format")]
    pub format: String,
    #[serde(default = "default_piper_binary")]
    pub piper_binary: PathBuf,
    #[serde(default = "default_piper_model")]
    pub piper_model: PathBuf,
    /// Sample rate of the raw PCM Piper writes for `piper_model`.
    #[serde(default = "default_piper_sample_rate")]
    pub piper_sample_rate: u32,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::default(),
            endpoint: default_speech_endpoint(),
            api_key: String::new(),
            voice_id: default_voice_id(),
            format: default_speech_format(),
            piper_binary: default_piper_binary(),
            piper_model: default_piper_model(),
            piper_sample_rate: default_piper_sample_rate(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("voice_id", &self.voice_id)
            .field("format", &self.format)
            .field("piper_binary", &self.piper_binary)
            .field("piper_model", &self.piper_model)
            .field("piper_sample_rate", &self.piper_sample_rate)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
