//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use voxa_pipeline::{StageTimeouts, DEFAULT_MAX_REPLY_CHARS};
use voxa_voice::{LanguageConfig, SpeechConfig, TranscoderConfig, TranscriptionConfig};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where synthesized audio and scratch files live.
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[serde(default)]
    pub transcription: TranscriptionConfig,

    #[serde(default)]
    pub language: LanguageConfig,

    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Body limit for the audio upload routes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Static browser client, served as the fallback route when it contains
    /// an `index.html`.
    #[serde(default = "default_client_dir")]
    pub client_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voxa_pipeline=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory served under `/uploads`.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Per-request transcoding files.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    /// Most recent turns rendered into each prompt.
    #[serde(default = "default_window_turns")]
    pub window_turns: usize,

    /// Per-session history cap; 0 keeps everything.
    #[serde(default = "default_max_stored_turns")]
    pub max_stored_turns: usize,

    /// Sessions untouched for this long are dropped; 0 disables eviction.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Optional first line of every prompt.
    #[serde(default)]
    pub preamble: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,

    /// Pre-hosted fallback clip. When unset, one is synthesized at startup.
    #[serde(default)]
    pub fallback_audio_url: Option<String>,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Per-stage timeouts in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_transcode_secs")]
    pub transcode_secs: u64,
    #[serde(default = "default_transcribe_secs")]
    pub transcribe_secs: u64,
    #[serde(default = "default_converse_secs")]
    pub converse_secs: u64,
    #[serde(default = "default_synthesize_secs")]
    pub synthesize_secs: u64,
}

impl TimeoutsConfig {
    pub fn to_stage_timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            transcode: Duration::from_secs(self.transcode_secs),
            transcribe: Duration::from_secs(self.transcribe_secs),
            converse: Duration::from_secs(self.converse_secs),
            synthesize: Duration::from_secs(self.synthesize_secs),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_client_dir() -> PathBuf {
    PathBuf::from("client")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("voxa")
}

fn default_window_turns() -> usize {
    voxa_conversation::DEFAULT_WINDOW_TURNS
}

fn default_max_stored_turns() -> usize {
    500
}

fn default_idle_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_reply_chars() -> usize {
    DEFAULT_MAX_REPLY_CHARS
}

fn default_transcode_secs() -> u64 {
    30
}

fn default_transcribe_secs() -> u64 {
    60
}

fn default_converse_secs() -> u64 {
    30
}

fn default_synthesize_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            client_dir: default_client_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            window_turns: default_window_turns(),
            max_stored_turns: default_max_stored_turns(),
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            preamble: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_reply_chars: default_max_reply_chars(),
            fallback_audio_url: None,
            timeouts: TimeoutsConfig::default(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            transcode_secs: default_transcode_secs(),
            transcribe_secs: default_transcribe_secs(),
            converse_secs: default_converse_secs(),
            synthesize_secs: default_synthesize_secs(),
        }
    }
}

/// Errors that can occur when loading configuration or building providers
/// from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A provider section could not be turned into a client.
    #[error("invalid provider configuration: {0}")]
    Provider(#[from] voxa_voice::AdapterError),

    /// A setting holds a value the server cannot run with.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Rejects settings that would make every request misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversation.window_turns == 0 {
            return Err(ConfigError::Invalid(
                "conversation.window_turns must be at least 1".to_string(),
            ));
        }
        if self.pipeline.max_reply_chars == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_reply_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOXA_HOST` overrides `server.host`
/// - `VOXA_PORT` overrides `server.port`
/// - `VOXA_CLIENT_DIR` overrides `server.client_dir`
/// - `VOXA_LOG_LEVEL` overrides `logging.level`
/// - `VOXA_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VOXA_UPLOAD_DIR` overrides `storage.upload_dir`
/// - `VOXA_STT_API_KEY` overrides `transcription.api_key`
/// - `VOXA_LLM_API_KEY` overrides `language.api_key`
/// - `VOXA_TTS_API_KEY` overrides `speech.api_key`
/// - `VOXA_TTS_VOICE_ID` overrides `speech.voice_id`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the resulting settings fail [`Config::validate`].
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("VOXA_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("VOXA_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(dir) = lookup("VOXA_CLIENT_DIR") {
        config.server.client_dir = PathBuf::from(dir);
    }
    if let Some(level) = lookup("VOXA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOXA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(dir) = lookup("VOXA_UPLOAD_DIR") {
        config.storage.upload_dir = PathBuf::from(dir);
    }
    if let Some(key) = lookup("VOXA_STT_API_KEY") {
        config.transcription.api_key = key;
    }
    if let Some(key) = lookup("VOXA_LLM_API_KEY") {
        config.language.api_key = key;
    }
    if let Some(key) = lookup("VOXA_TTS_API_KEY") {
        config.speech.api_key = key;
    }
    if let Some(voice) = lookup("VOXA_TTS_VOICE_ID") {
        config.speech.voice_id = voice;
    }
}
