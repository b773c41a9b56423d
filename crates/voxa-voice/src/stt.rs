use crate::audio::NormalizedAudio;
use crate::config::{TranscriptionBackend, TranscriptionConfig};
use crate::error::{check_input_size, AdapterError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Turns normalized audio into plain text.
///
/// An empty string is a valid result; deciding what silence means is the
/// caller's job.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &NormalizedAudio) -> Result<String, AdapterError>;
}

/// Builds the transcriber selected by `config.backend`.
pub fn transcriber_from_config(
    config: &TranscriptionConfig,
) -> Result<Arc<dyn Transcriber>, AdapterError> {
    Ok(match config.backend {
        TranscriptionBackend::Http => Arc::new(HttpTranscriber::new(config)?),
        TranscriptionBackend::WhisperCli => Arc::new(WhisperCliTranscriber::new(
            &config.whisper_model,
            &config.whisper_binary,
            Duration::from_secs(config.timeout_secs),
        )),
    })
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for an OpenAI-compatible `/v1/audio/transcriptions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

impl HttpTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdapterError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!(
                "{}/v1/audio/transcriptions",
                config.endpoint.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &NormalizedAudio) -> Result<String, AdapterError> {
        check_input_size(audio.wav_bytes().len(), MAX_STT_INPUT_BYTES)?;

        let file = Part::bytes(audio.wav_bytes().to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AdapterError::Request(e.to_string()))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let mut request = self.client.post(&self.url).multipart(form);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
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

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}

/// Transcriber that shells out to a whisper.cpp binary.
#[derive(Debug, Clone)]
pub struct WhisperCliTranscriber {
    model_path: PathBuf,
    binary_path: PathBuf,
    timeout: Duration,
}

impl WhisperCliTranscriber {
    pub fn new(
        model_path: impl Into<PathBuf>,
        binary_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(&self, audio: &NormalizedAudio) -> Result<String, AdapterError> {
        check_input_size(audio.wav_bytes().len(), MAX_STT_INPUT_BYTES)?;

        // -m <model>, -f - reads WAV from stdin, -nt drops timestamps.
        let mut command = Command::new(&self.binary_path);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-nt")
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| AdapterError::Process(format!("failed to spawn STT binary: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AdapterError::Process("failed to open stdin".to_string()))?;

        // Write from a separate task so a full stdout pipe cannot deadlock us.
        let wav = audio.wav_bytes().to_vec();
        let write_task = tokio::spawn(async move {
            let result = stdin.write_all(&wav).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout(self.timeout))?
            .map_err(|e| AdapterError::Process(format!("failed to read stdout: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            // The binary may exit before consuming all input; its exit status decides.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(AdapterError::Process(format!(
                    "failed to write to STT stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(AdapterError::Process(format!("stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Process(format!(
                "STT binary failed: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
