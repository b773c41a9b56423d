use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use voxa_conversation::{ConversationStore, InMemoryStore};
use voxa_pipeline::{
    Adapters, AudioUpload, FallbackProvider, Pipeline, PipelineSettings, StageTimeouts,
};
use voxa_types::{Disposition, FatalKind, Role, Stage, Turn, FALLBACK_REPLY_TEXT};
use voxa_voice::{
    pcm_to_wav, AdapterError, AudioStore, LanguageModel, NormalizedAudio, Synthesizer,
    Transcoder, Transcriber,
};

const FALLBACK_URL: &str = "/uploads/fallback.mp3";

#[derive(Clone, Copy)]
enum Behavior {
    Ok,
    Fail,
    Hang,
    Panic,
}

async fn misbehave(behavior: Behavior) -> Result<(), AdapterError> {
    match behavior {
        Behavior::Ok => Ok(()),
        Behavior::Fail => Err(AdapterError::Process("mock failure".to_string())),
        Behavior::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
        Behavior::Panic => panic!("mock adapter panicked"),
    }
}

/// Writes half a second of silence, or garbage when `valid` is false.
struct MockTranscoder {
    behavior: Behavior,
    valid: bool,
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), AdapterError> {
        assert!(input.exists(), "scratch input missing");
        misbehave(self.behavior).await?;
        let bytes = if self.valid {
            pcm_to_wav(&[0u8; 16_000], 16_000)?
        } else {
            b"definitely not a wav file".to_vec()
        };
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

/// Returns `text`, or `utterance N` with a per-call counter when `text` is None.
struct MockTranscriber {
    behavior: Behavior,
    text: Option<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: &NormalizedAudio) -> Result<String, AdapterError> {
        assert_eq!(audio.duration_ms(), 500);
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        misbehave(self.behavior).await?;
        Ok(self
            .text
            .clone()
            .unwrap_or_else(|| format!("utterance {}", n)))
    }
}

/// Replies `reply to <last user line>` and records every prompt.
struct MockModel {
    behavior: Behavior,
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn generate(&self, prompt: &str) -> Result<String, AdapterError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        misbehave(self.behavior).await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }
        let last_user = prompt
            .lines()
            .filter_map(|l| l.strip_prefix("User: "))
            .last()
            .unwrap_or_default();
        Ok(format!("reply to {}", last_user))
    }
}

struct MockSynthesizer {
    behavior: Behavior,
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, AdapterError> {
        assert_eq!(voice_id, "test-voice");
        self.texts.lock().unwrap().push(text.to_string());
        misbehave(self.behavior).await?;
        Ok("/uploads/reply.mp3".to_string())
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    store: Arc<InMemoryStore>,
    transcriber: Arc<MockTranscriber>,
    model: Arc<MockModel>,
    synthesizer: Arc<MockSynthesizer>,
    scratch: TempDir,
    _uploads: TempDir,
}

struct Setup {
    transcoder: Behavior,
    valid_wav: bool,
    transcriber: Behavior,
    transcript: Option<&'static str>,
    model: Behavior,
    reply: Option<String>,
    synthesizer: Behavior,
    fallback: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            transcoder: Behavior::Ok,
            valid_wav: true,
            transcriber: Behavior::Ok,
            transcript: Some("hello"),
            model: Behavior::Ok,
            reply: None,
            synthesizer: Behavior::Ok,
            fallback: true,
        }
    }
}

impl Setup {
    fn build(self) -> Harness {
        let scratch = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let audio_store = AudioStore::new(uploads.path(), "/uploads");

        let transcriber = Arc::new(MockTranscriber {
            behavior: self.transcriber,
            text: self.transcript.map(str::to_string),
            calls: AtomicUsize::new(0),
        });
        let model = Arc::new(MockModel {
            behavior: self.model,
            reply: self.reply,
            prompts: Mutex::new(Vec::new()),
        });
        let synthesizer = Arc::new(MockSynthesizer {
            behavior: self.synthesizer,
            texts: Mutex::new(Vec::new()),
        });
        let fallback = if self.fallback {
            FallbackProvider::with_audio_url(audio_store, FALLBACK_URL)
        } else {
            FallbackProvider::new(audio_store)
        };

        let store = Arc::new(InMemoryStore::default());
        let pipeline = Pipeline::new(
            Adapters {
                transcoder: Arc::new(MockTranscoder {
                    behavior: self.transcoder,
                    valid: self.valid_wav,
                }),
                transcriber: transcriber.clone(),
                model: model.clone(),
                synthesizer: synthesizer.clone(),
            },
            store.clone(),
            Arc::new(fallback),
            PipelineSettings {
                voice_id: "test-voice".to_string(),
                scratch_dir: scratch.path().to_path_buf(),
                timeouts: StageTimeouts {
                    transcode: Duration::from_millis(200),
                    transcribe: Duration::from_millis(200),
                    converse: Duration::from_millis(200),
                    synthesize: Duration::from_millis(200),
                },
                ..PipelineSettings::default()
            },
        );

        Harness {
            pipeline: Arc::new(pipeline),
            store,
            transcriber,
            model,
            synthesizer,
            scratch,
            _uploads: uploads,
        }
    }
}

impl Harness {
    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
    }
}

fn upload() -> AudioUpload {
    AudioUpload {
        bytes: b"webm bytes".to_vec(),
        file_name: "recording.webm".to_string(),
    }
}

#[tokio::test]
async fn hello_on_fresh_session_completes() {
    let h = Setup::default().build();

    let result = h.pipeline.process(upload(), Some("sess_1")).await;

    assert_eq!(result.disposition, Disposition::Complete);
    assert_eq!(result.transcript.as_deref(), Some("hello"));
    assert_eq!(result.reply_text.as_deref(), Some("reply to hello"));
    assert_eq!(result.audio_url.as_deref(), Some("/uploads/reply.mp3"));
    assert!(result.error.is_none());
    assert_eq!(result.history_len, Some(2));
    assert_eq!(
        h.store.all("sess_1"),
        vec![Turn::user("hello"), Turn::assistant("reply to hello")]
    );
    assert_eq!(h.model.prompts.lock().unwrap()[0], "User: hello\nAssistant:");
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn prompt_carries_prior_turns() {
    let h = Setup {
        transcript: None,
        ..Setup::default()
    }
    .build();

    h.pipeline.process(upload(), Some("k")).await;
    h.pipeline.process(upload(), Some("k")).await;

    let prompts = h.model.prompts.lock().unwrap();
    assert_eq!(
        prompts[1],
        "User: utterance 0\nAssistant: reply to utterance 0\nUser: utterance 1\nAssistant:"
    );
}

#[tokio::test]
async fn prompt_window_is_bounded() {
    let h = Setup::default().build();
    for _ in 0..8 {
        h.pipeline.process(upload(), Some("long")).await;
    }
    assert_eq!(h.store.len("long"), 16);

    let prompts = h.model.prompts.lock().unwrap();
    let last = prompts.last().unwrap();
    // Ten window turns plus the open assistant cue.
    assert_eq!(last.lines().count(), 11);
}

#[tokio::test]
async fn echo_without_session_writes_no_history() {
    let h = Setup::default().build();

    let result = h.pipeline.process(upload(), None).await;

    assert_eq!(result.disposition, Disposition::Complete);
    assert_eq!(result.reply_text.as_deref(), Some("reply to hello"));
    assert_eq!(result.history_len, None);
    assert_eq!(h.store.session_count(), 0);
}

#[tokio::test]
async fn empty_upload_is_invalid_input() {
    let h = Setup::default().build();
    let result = h
        .pipeline
        .process(
            AudioUpload {
                bytes: Vec::new(),
                file_name: "empty.webm".to_string(),
            },
            Some("k"),
        )
        .await;
    assert_eq!(result.fatal_kind(), Some(FatalKind::InvalidInput));
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn whitespace_transcript_is_no_speech() {
    for transcript in ["", "   ", "\n\t "] {
        let h = Setup {
            transcript: Some(transcript),
            ..Setup::default()
        }
        .build();

        let result = h.pipeline.process(upload(), Some("quiet")).await;

        assert_eq!(result.fatal_kind(), Some(FatalKind::NoSpeech));
        assert_eq!(result.error.as_deref(), Some("No speech detected in audio"));
        assert!(result.transcript.is_none());
        assert!(result.audio_url.is_none());
        assert_eq!(h.store.len("quiet"), 0);
        assert!(h.model.prompts.lock().unwrap().is_empty());
        assert!(h.scratch_is_empty());
    }
}

#[tokio::test]
async fn transcode_failure_is_fatal_without_fallback_audio() {
    let h = Setup {
        transcoder: Behavior::Fail,
        ..Setup::default()
    }
    .build();

    let result = h.pipeline.process(upload(), Some("k")).await;

    assert_eq!(result.fatal_kind(), Some(FatalKind::Transcode));
    assert_eq!(result.error.as_deref(), Some("Audio conversion failed"));
    assert!(result.audio_url.is_none());
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn malformed_transcoder_output_is_transcode_failure() {
    let h = Setup {
        valid_wav: false,
        ..Setup::default()
    }
    .build();

    let result = h.pipeline.process(upload(), None).await;

    assert_eq!(result.fatal_kind(), Some(FatalKind::Transcode));
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn transcription_failure_uses_fallback_audio_only_with_session() {
    let h = Setup {
        transcriber: Behavior::Fail,
        ..Setup::default()
    }
    .build();

    let keyed = h.pipeline.process(upload(), Some("k")).await;
    assert_eq!(keyed.fatal_kind(), Some(FatalKind::Transcription));
    assert_eq!(keyed.error.as_deref(), Some("Speech recognition failed"));
    assert_eq!(keyed.audio_url.as_deref(), Some(FALLBACK_URL));
    assert_eq!(h.store.len("k"), 0);

    let echo = h.pipeline.process(upload(), None).await;
    assert_eq!(echo.fatal_kind(), Some(FatalKind::Transcription));
    assert!(echo.audio_url.is_none());
}

#[tokio::test]
async fn language_failure_degrades_to_fallback_text() {
    let h = Setup {
        model: Behavior::Fail,
        ..Setup::default()
    }
    .build();

    let result = h.pipeline.process(upload(), Some("k")).await;

    assert_eq!(result.disposition, Disposition::Degraded(vec![Stage::Converse]));
    assert_eq!(result.reply_text.as_deref(), Some(FALLBACK_REPLY_TEXT));
    assert_eq!(result.error.as_deref(), Some("LLM failed: process_failed"));
    assert_eq!(result.audio_url.as_deref(), Some("/uploads/reply.mp3"));
    assert_eq!(
        h.store.all("k")[1],
        Turn::new(Role::Assistant, FALLBACK_REPLY_TEXT)
    );
    assert_eq!(
        h.synthesizer.texts.lock().unwrap().as_slice(),
        [FALLBACK_REPLY_TEXT.to_string()]
    );
}

#[tokio::test]
async fn blank_model_output_degrades() {
    let h = Setup {
        reply: Some("   ".to_string()),
        ..Setup::default()
    }
    .build();

    let result = h.pipeline.process(upload(), Some("k")).await;

    assert_eq!(result.reply_text.as_deref(), Some(FALLBACK_REPLY_TEXT));
    assert_eq!(result.error.as_deref(), Some("LLM failed: empty_output"));
}

#[tokio::test]
async fn synthesis_failure_returns_fallback_audio() {
    let h = Setup {
        synthesizer: Behavior::Fail,
        ..Setup::default()
    }
    .build();

    let result = h.pipeline.process(upload(), Some("k")).await;

    assert_eq!(result.disposition, Disposition::Degraded(vec![Stage::Synthesize]));
    assert_eq!(result.audio_url.as_deref(), Some(FALLBACK_URL));
    assert_eq!(result.transcript.as_deref(), Some("hello"));
    assert_eq!(result.reply_text.as_deref(), Some("reply to hello"));
    assert_eq!(result.error.as_deref(), Some("TTS failed: process_failed"));
    assert_eq!(h.store.len("k"), 2);
}

#[tokio::test]
async fn synthesis_failure_without_fallback_yields_null_audio() {
    let h = Setup {
        synthesizer: Behavior::Fail,
        fallback: false,
        ..Setup::default()
    }
    .build();

    let result = h.pipeline.process(upload(), Some("k")).await;

    assert!(result.is_degraded());
    assert!(result.audio_url.is_none());
    assert!(result.reply_text.is_some());
}

#[tokio::test]
async fn both_soft_stages_failing_reports_both() {
    let h = Setup {
        model: Behavior::Fail,
        synthesizer: Behavior::Fail,
        ..Setup::default()
    }
    .build();

    let result = h.pipeline.process(upload(), Some("k")).await;

    assert_eq!(
        result.disposition,
        Disposition::Degraded(vec![Stage::Converse, Stage::Synthesize])
    );
    assert_eq!(
        result.error.as_deref(),
        Some("LLM failed: process_failed; TTS failed: process_failed")
    );
    assert_eq!(result.audio_url.as_deref(), Some(FALLBACK_URL));
}

#[tokio::test]
async fn long_reply_is_truncated_only_for_synthesis() {
    let long = "é".repeat(1500);
    let h = Setup {
        reply: Some(long.clone()),
        ..Setup::default()
    }
    .build();

    let result = h.pipeline.process(upload(), Some("k")).await;

    assert_eq!(result.reply_text.as_deref(), Some(long.as_str()));
    assert_eq!(h.store.all("k")[1].text, long);
    let spoken = h.synthesizer.texts.lock().unwrap();
    assert_eq!(spoken[0].chars().count(), 1000);
    assert!(long.starts_with(spoken[0].as_str()));
}

#[tokio::test]
async fn stage_timeouts_are_classified_like_failures() {
    let h = Setup {
        transcoder: Behavior::Hang,
        ..Setup::default()
    }
    .build();
    let result = h.pipeline.process(upload(), Some("k")).await;
    assert_eq!(result.fatal_kind(), Some(FatalKind::Transcode));
    assert!(h.scratch_is_empty());

    let h = Setup {
        transcriber: Behavior::Hang,
        ..Setup::default()
    }
    .build();
    let result = h.pipeline.process(upload(), Some("k")).await;
    assert_eq!(result.fatal_kind(), Some(FatalKind::Transcription));
    assert_eq!(result.audio_url.as_deref(), Some(FALLBACK_URL));

    let h = Setup {
        model: Behavior::Hang,
        ..Setup::default()
    }
    .build();
    let result = h.pipeline.process(upload(), Some("k")).await;
    assert_eq!(result.reply_text.as_deref(), Some(FALLBACK_REPLY_TEXT));
    assert_eq!(result.error.as_deref(), Some("LLM failed: timeout"));

    let h = Setup {
        synthesizer: Behavior::Hang,
        ..Setup::default()
    }
    .build();
    let result = h.pipeline.process(upload(), Some("k")).await;
    assert_eq!(result.audio_url.as_deref(), Some(FALLBACK_URL));
    assert_eq!(result.error.as_deref(), Some("TTS failed: timeout"));
}

#[tokio::test]
async fn panic_releases_scratch_files_and_session() {
    let h = Setup {
        transcriber: Behavior::Panic,
        ..Setup::default()
    }
    .build();

    let pipeline = h.pipeline.clone();
    let joined = tokio::spawn(async move { pipeline.process(upload(), Some("k")).await }).await;

    assert!(joined.unwrap_err().is_panic());
    assert!(h.scratch_is_empty());

    let permit = tokio::time::timeout(Duration::from_secs(1), h.store.acquire("k")).await;
    assert!(permit.is_ok(), "session gate still held after panic");
}

#[tokio::test]
async fn concurrent_calls_on_one_key_keep_turns_paired() {
    let h = Setup {
        transcript: None,
        ..Setup::default()
    }
    .build();

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let pipeline = h.pipeline.clone();
            tokio::spawn(async move { pipeline.process(upload(), Some("busy")).await })
        })
        .collect();
    let mut lengths = Vec::new();
    for task in tasks {
        let result = task.await.unwrap();
        assert_eq!(result.disposition, Disposition::Complete);
        lengths.push(result.history_len.unwrap());
    }
    // Each run reports the length it left behind, never a later run's.
    lengths.sort_unstable();
    assert_eq!(lengths, (1..=12).map(|n| n * 2).collect::<Vec<_>>());

    let turns = h.store.all("busy");
    assert_eq!(turns.len(), 24);
    for pair in turns.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        assert_eq!(pair[1].text, format!("reply to {}", pair[0].text));
    }
    assert!(h.scratch_is_empty());
}

/// Encodes the upload index as the sample count of the normalized audio.
struct TaggingTranscoder;

#[async_trait]
impl Transcoder for TaggingTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), AdapterError> {
        let raw = tokio::fs::read_to_string(input).await?;
        let index: usize = raw.trim_start_matches("clip ").parse().unwrap();
        tokio::fs::write(output, pcm_to_wav(&vec![0u8; (index + 1) * 2], 16_000)?).await?;
        Ok(())
    }
}

struct TaggedTranscriber;

#[async_trait]
impl Transcriber for TaggedTranscriber {
    async fn transcribe(&self, audio: &NormalizedAudio) -> Result<String, AdapterError> {
        Ok(format!("utterance {}", audio.sample_count() - 1))
    }
}

#[tokio::test]
async fn same_key_calls_run_in_arrival_order() {
    let scratch = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::default());
    let pipeline = Arc::new(Pipeline::new(
        Adapters {
            transcoder: Arc::new(TaggingTranscoder),
            transcriber: Arc::new(TaggedTranscriber),
            model: Arc::new(MockModel {
                behavior: Behavior::Ok,
                reply: None,
                prompts: Mutex::new(Vec::new()),
            }),
            synthesizer: Arc::new(MockSynthesizer {
                behavior: Behavior::Ok,
                texts: Mutex::new(Vec::new()),
            }),
        },
        store.clone(),
        Arc::new(FallbackProvider::new(AudioStore::new(uploads.path(), "/uploads"))),
        PipelineSettings {
            voice_id: "test-voice".to_string(),
            scratch_dir: scratch.path().to_path_buf(),
            ..PipelineSettings::default()
        },
    ));

    // Hold the session so every call queues behind it.
    let permit = store.acquire("ordered").await;
    let mut tasks = Vec::new();
    for i in 0..6 {
        let pipeline = pipeline.clone();
        tasks.push(tokio::spawn(async move {
            let upload = AudioUpload {
                bytes: format!("clip {}", i).into_bytes(),
                file_name: "clip.webm".to_string(),
            };
            pipeline.process(upload, Some("ordered")).await
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(permit);

    for task in tasks {
        assert_eq!(task.await.unwrap().disposition, Disposition::Complete);
    }

    let users: Vec<_> = store
        .all("ordered")
        .into_iter()
        .filter(|turn| turn.role == Role::User)
        .map(|turn| turn.text)
        .collect();
    let expected: Vec<_> = (0..6).map(|i| format!("utterance {}", i)).collect();
    assert_eq!(users, expected);
}

#[tokio::test]
async fn speak_synthesizes_text() {
    let h = Setup::default().build();

    let result = h.pipeline.speak("  Good morning  ").await;

    assert_eq!(result.disposition, Disposition::Complete);
    assert_eq!(result.audio_url.as_deref(), Some("/uploads/reply.mp3"));
    assert!(result.transcript.is_none());
    assert_eq!(
        h.synthesizer.texts.lock().unwrap().as_slice(),
        ["Good morning".to_string()]
    );
}

#[tokio::test]
async fn speak_rejects_blank_text_and_degrades_on_failure() {
    let h = Setup {
        synthesizer: Behavior::Fail,
        ..Setup::default()
    }
    .build();

    let blank = h.pipeline.speak("  ").await;
    assert_eq!(blank.fatal_kind(), Some(FatalKind::InvalidInput));
    assert_eq!(blank.error.as_deref(), Some("No text provided"));

    let failed = h.pipeline.speak("hi").await;
    assert!(failed.is_degraded());
    assert_eq!(failed.audio_url.as_deref(), Some(FALLBACK_URL));
    assert_eq!(failed.error.as_deref(), Some("TTS failed: process_failed"));
}
