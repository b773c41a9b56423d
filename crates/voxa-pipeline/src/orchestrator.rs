//! Runs one recording through transcode, transcribe, converse and synthesize.

use crate::error::StageError;
use crate::fallback::FallbackProvider;
use crate::scratch::ScratchFiles;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use voxa_conversation::{build_prompt, ConversationStore, DEFAULT_WINDOW_TURNS};
use voxa_types::{FatalKind, PipelineResult, Role, Stage, Turn};
use voxa_voice::{AdapterError, LanguageModel, NormalizedAudio, Synthesizer, Transcoder, Transcriber};

/// Longest reply, in characters, handed to the synthesizer.
pub const DEFAULT_MAX_REPLY_CHARS: usize = 1000;

/// Upper bound for each stage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub transcode: Duration,
    pub transcribe: Duration,
    pub converse: Duration,
    pub synthesize: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            transcode: Duration::from_secs(30),
            transcribe: Duration::from_secs(60),
            converse: Duration::from_secs(30),
            synthesize: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Most recent turns rendered into the prompt.
    pub window_turns: usize,
    pub max_reply_chars: usize,
    pub voice_id: String,
    /// Optional first line of every prompt.
    pub preamble: Option<String>,
    /// Directory for per-request transcoding files.
    pub scratch_dir: PathBuf,
    pub timeouts: StageTimeouts,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_turns: DEFAULT_WINDOW_TURNS,
            max_reply_chars: DEFAULT_MAX_REPLY_CHARS,
            voice_id: "en-US-natalie".to_string(),
            preamble: None,
            scratch_dir: std::env::temp_dir().join("voxa"),
            timeouts: StageTimeouts::default(),
        }
    }
}

/// The four provider adapters a pipeline drives.
#[derive(Clone)]
pub struct Adapters {
    pub transcoder: Arc<dyn Transcoder>,
    pub transcriber: Arc<dyn Transcriber>,
    pub model: Arc<dyn LanguageModel>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// One uploaded recording.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    /// Client-supplied file name, only used to label scratch files.
    pub file_name: String,
}

/// Sequences the adapters and decides which failures are fatal.
///
/// Transcode and transcription failures abort the run. Language and
/// synthesis failures are replaced with fallback content and the run
/// completes as degraded.
pub struct Pipeline {
    adapters: Adapters,
    store: Arc<dyn ConversationStore>,
    fallback: Arc<FallbackProvider>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        adapters: Adapters,
        store: Arc<dyn ConversationStore>,
        fallback: Arc<FallbackProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            adapters,
            store,
            fallback,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn fallback(&self) -> &Arc<FallbackProvider> {
        &self.fallback
    }

    /// Processes one recording, optionally within a conversation session.
    ///
    /// With a session key, runs for the same key are serialized in arrival
    /// order and both turns are appended to its history. Without one the
    /// prompt holds only the new transcript and nothing is stored.
    pub async fn process(&self, upload: AudioUpload, session: Option<&str>) -> PipelineResult {
        let Some(key) = session else {
            return self.run(upload, None).await;
        };
        let _permit = self.store.acquire(key).await;
        let mut result = self.run(upload, Some(key)).await;
        // Read before the permit drops so the count belongs to this run.
        result.history_len = Some(self.store.len(key));
        result
    }

    async fn run(&self, upload: AudioUpload, session: Option<&str>) -> PipelineResult {
        if upload.bytes.is_empty() {
            return PipelineResult::fatal(FatalKind::InvalidInput);
        }
        let started = Instant::now();

        // Removed on every exit path when this binding drops.
        let scratch = match ScratchFiles::create(
            &self.settings.scratch_dir,
            &upload.file_name,
            &upload.bytes,
        )
        .await
        {
            Ok(scratch) => scratch,
            Err(e) => {
                warn!(session = ?session, error = %e, "failed to create scratch files");
                return PipelineResult::fatal(FatalKind::Transcode);
            }
        };

        let audio = match self
            .run_stage(
                Stage::Transcode,
                self.settings.timeouts.transcode,
                self.transcode(&scratch),
            )
            .await
        {
            Ok(audio) => audio,
            Err(_) => return PipelineResult::fatal(FatalKind::Transcode),
        };
        debug!(
            session = ?session,
            duration_ms = audio.duration_ms(),
            "audio normalized"
        );

        let transcript = match self
            .run_stage(
                Stage::Transcribe,
                self.settings.timeouts.transcribe,
                self.adapters.transcriber.transcribe(&audio),
            )
            .await
        {
            Ok(text) => text,
            Err(_) => {
                let mut result = PipelineResult::fatal(FatalKind::Transcription);
                if session.is_some() {
                    result.audio_url = self.fallback.audio_url();
                }
                return result;
            }
        };

        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            info!(session = ?session, "no speech detected");
            return PipelineResult::fatal(FatalKind::NoSpeech);
        }

        let prompt = match session {
            Some(key) => {
                self.store.append_turn(key, Role::User, &transcript);
                let window = self.store.window(key, self.settings.window_turns);
                build_prompt(&window, self.settings.preamble.as_deref())
            }
            None => build_prompt(
                &[Turn::user(transcript.as_str())],
                self.settings.preamble.as_deref(),
            ),
        };

        let mut result = PipelineResult {
            transcript: Some(transcript),
            ..PipelineResult::default()
        };

        let reply = match self
            .run_stage(
                Stage::Converse,
                self.settings.timeouts.converse,
                self.converse(&prompt),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                result.degrade(Stage::Converse, format!("LLM failed: {}", e.reason()));
                self.fallback.text().to_string()
            }
        };

        if let Some(key) = session {
            self.store.append_turn(key, Role::Assistant, &reply);
        }

        let audio_url = self.synthesize(&reply, &mut result).await;
        result.audio_url = audio_url;
        result.reply_text = Some(reply);

        drop(scratch);
        info!(
            session = ?session,
            degraded = result.is_degraded(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        result
    }

    /// Synthesizes arbitrary text without touching any conversation.
    pub async fn speak(&self, text: &str) -> PipelineResult {
        let text = text.trim();
        if text.is_empty() {
            let mut result = PipelineResult::fatal(FatalKind::InvalidInput);
            result.error = Some("No text provided".to_string());
            return result;
        }

        let mut result = PipelineResult::default();
        let audio_url = self.synthesize(text, &mut result).await;
        result.audio_url = audio_url;
        result
    }

    /// Runs the synthesize stage on the truncated text, degrading `result`
    /// to the fallback clip on failure.
    async fn synthesize(&self, text: &str, result: &mut PipelineResult) -> Option<String> {
        let spoken = truncate_chars(text, self.settings.max_reply_chars);
        let outcome = self
            .run_stage(Stage::Synthesize, self.settings.timeouts.synthesize, async {
                let url = self
                    .adapters
                    .synthesizer
                    .synthesize(spoken, &self.settings.voice_id)
                    .await?;
                if url.trim().is_empty() {
                    return Err(AdapterError::EmptyOutput);
                }
                Ok(url)
            })
            .await;

        match outcome {
            Ok(url) => Some(url),
            Err(e) => {
                result.degrade(Stage::Synthesize, format!("TTS failed: {}", e.reason()));
                self.fallback.audio_url()
            }
        }
    }

    async fn transcode(&self, scratch: &ScratchFiles) -> Result<NormalizedAudio, AdapterError> {
        self.adapters
            .transcoder
            .transcode(scratch.input(), scratch.output())
            .await?;
        let wav = tokio::fs::read(scratch.output()).await?;
        NormalizedAudio::from_wav(wav)
    }

    async fn converse(&self, prompt: &str) -> Result<String, AdapterError> {
        let reply = self.adapters.model.generate(prompt).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(AdapterError::EmptyOutput);
        }
        Ok(reply.to_string())
    }

    /// Awaits one stage under its timeout and logs a classified failure.
    async fn run_stage<T, F>(&self, stage: Stage, limit: Duration, call: F) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, AdapterError>>,
    {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AdapterError::Timeout(limit)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                debug!(stage = %stage, elapsed_ms, "stage completed");
                Ok(value)
            }
            Err(source) => {
                let err = StageError::new(stage, source);
                warn!(
                    stage = %stage,
                    reason = err.reason(),
                    elapsed_ms,
                    error = %err,
                    "stage failed"
                );
                Err(err)
            }
        }
    }
}

/// Returns at most `max_chars` leading characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
