//! Pipeline stage identifiers and the result shape returned to callers.

use serde::Serialize;
use std::fmt;

/// Reply text substituted when the language stage fails.
pub const FALLBACK_REPLY_TEXT: &str = "I am having trouble connecting right now.";

/// A named stage of the conversation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transcode,
    Transcribe,
    Converse,
    Synthesize,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcode => "transcode",
            Self::Transcribe => "transcribe",
            Self::Converse => "converse",
            Self::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pipeline run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// Missing or empty audio/text in the request.
    InvalidInput,
    /// The transcoder failed or produced audio of the wrong shape.
    Transcode,
    /// The speech-to-text adapter errored.
    Transcription,
    /// Transcription succeeded but returned only whitespace.
    NoSpeech,
    /// A pipeline task panicked or was cancelled.
    Internal,
}

impl FatalKind {
    /// User-visible message placed in the `error` field.
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidInput => "No audio file provided",
            Self::Transcode => "Audio conversion failed",
            Self::Transcription => "Speech recognition failed",
            Self::NoSpeech => "No speech detected in audio",
            Self::Internal => "Internal processing error",
        }
    }

    /// Whether the failure is attributable to the caller's input.
    pub fn is_client_error(self) -> bool {
        matches!(self, Self::InvalidInput | Self::NoSpeech)
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Every stage produced real output.
    #[default]
    Complete,
    /// At least one stage substituted fallback content.
    Degraded(Vec<Stage>),
    /// The run was aborted.
    Fatal(FatalKind),
}

/// Outcome of one pipeline run.
///
/// Fields are independently nullable: a degraded run carries both a
/// fallback `audio_url` and an `error`. `transcript` is only set once
/// transcription completed, `reply_text` once the language stage resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    #[serde(rename = "audioUrl")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(rename = "llm_text", skip_serializing_if = "Option::is_none")]
    pub reply_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Turns stored for the session when the run released it; `None` for
    /// runs without a session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_len: Option<usize>,
    #[serde(skip)]
    pub disposition: Disposition,
}

impl PipelineResult {
    /// Builds an aborted result with the kind's standard message.
    pub fn fatal(kind: FatalKind) -> Self {
        Self {
            error: Some(kind.message().to_string()),
            disposition: Disposition::Fatal(kind),
            ..Self::default()
        }
    }

    /// Returns the fatal kind if the run was aborted.
    pub fn fatal_kind(&self) -> Option<FatalKind> {
        match self.disposition {
            Disposition::Fatal(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.disposition, Disposition::Degraded(_))
    }

    /// Records a degraded stage and appends its message to `error`.
    pub fn degrade(&mut self, stage: Stage, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.error = Some(match self.error.take() {
            Some(existing) => format!("{existing}; {message}"),
            None => message.to_string(),
        });
        match &mut self.disposition {
            Disposition::Degraded(stages) => stages.push(stage),
            other => *other = Disposition::Degraded(vec![stage]),
        }
    }
}
