use thiserror::Error;
use voxa_types::Stage;
use voxa_voice::AdapterError;

/// A classified failure of one named pipeline stage.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: AdapterError,
}

impl StageError {
    pub fn new(stage: Stage, source: AdapterError) -> Self {
        Self { stage, source }
    }

    /// Machine-readable reason from the underlying adapter failure.
    pub fn reason(&self) -> &'static str {
        self.source.reason()
    }
}

/// Errors raised while provisioning the fallback audio clip.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("fallback synthesis failed: {0}")]
    Synthesis(#[source] AdapterError),

    #[error("failed to download fallback audio: {0}")]
    Download(String),

    #[error("failed to store fallback audio: {0}")]
    Storage(#[source] AdapterError),
}
