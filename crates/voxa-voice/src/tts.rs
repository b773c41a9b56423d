use crate::audio::pcm_to_wav;
use crate::config::{SpeechBackend, SpeechConfig};
use crate::error::{check_input_size, AdapterError};
use crate::store::AudioStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Renders text to speech and returns a playable audio URL.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, AdapterError>;
}

/// Builds the synthesizer selected by `config.backend`.
pub fn synthesizer_from_config(
    config: &SpeechConfig,
    store: AudioStore,
) -> Result<Arc<dyn Synthesizer>, AdapterError> {
    Ok(match config.backend {
        SpeechBackend::Http => Arc::new(HttpSynthesizer::new(config)?),
        SpeechBackend::Piper => Arc::new(PiperSynthesizer::new(
            &config.piper_binary,
            &config.piper_model,
            config.piper_sample_rate,
            Duration::from_secs(config.timeout_secs),
            store,
        )),
    })
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    #[serde(rename = "voiceId")]
    voice_id: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    #[serde(rename = "audioFile")]
    audio_file: Option<String>,
}

/// Client for a hosted TTS API that answers with `{"audioFile": "<url>"}`.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: Client,
    url: String,
    api_key: String,
    format: String,
}

impl HttpSynthesizer {
    pub fn new(config: &SpeechConfig) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdapterError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            format: config.format.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, AdapterError> {
        check_input_size(text.len(), MAX_TTS_INPUT_BYTES)?;

        let body = SpeechRequest {
            text,
            voice_id,
            format: &self.format,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if !self.api_key.is_empty() {
            request = request.header("api-key", &self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SpeechResponse = response.json().await?;
        match parsed.audio_file {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(AdapterError::EmptyOutput),
        }
    }
}

/// Synthesizer backed by a local Piper binary.
///
/// Piper writes raw s16le PCM; it is wrapped into WAV and saved to the
/// audio store, whose public URL is returned.
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    binary_path: PathBuf,
    model_path: PathBuf,
    sample_rate: u32,
    timeout: Duration,
    store: AudioStore,
}

impl PiperSynthesizer {
    pub fn new(
        binary_path: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        sample_rate: u32,
        timeout: Duration,
        store: AudioStore,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            sample_rate,
            timeout,
            store,
        }
    }
}

#[async_trait]
impl Synthesizer for PiperSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, AdapterError> {
        check_input_size(text.len(), MAX_TTS_INPUT_BYTES)?;

        if !self.model_path.exists() {
            return Err(AdapterError::Config(format!(
                "model file not found: {:?}",
                self.model_path
            )));
        }

        let mut command = Command::new(&self.binary_path);
        command
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Multi-speaker models take a numeric speaker id.
        if let Ok(speaker) = voice_id.parse::<u32>() {
            command.arg("--speaker").arg(speaker.to_string());
        }

        let mut child = command
            .spawn()
            .map_err(|e| AdapterError::Process(format!("failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AdapterError::Process("failed to open stdin".to_string()))?;
        let text_owned = text.to_string();

        // Spawn a task to write to stdin to avoid deadlock if output buffer fills up
        let write_task = tokio::spawn(async move {
            let result = stdin.write_all(text_owned.as_bytes()).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout(self.timeout))?
            .map_err(|e| AdapterError::Process(format!("failed to wait for piper: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AdapterError::Process(format!(
                    "failed to write to piper stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(AdapterError::Process(format!("stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Process(format!(
                "piper failed: {}",
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(AdapterError::EmptyOutput);
        }

        let wav = pcm_to_wav(&output.stdout, self.sample_rate)?;
        self.store.save(&wav, "wav").await
    }
}
