use std::time::Duration;
use thiserror::Error;

/// Failure returned by a provider adapter.
///
/// `reason()` gives a short machine-readable code; `Display` carries the
/// human-readable detail.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider returned empty output")]
    EmptyOutput,

    #[error("timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("process error: {0}")]
    Process(String),

    #[error("input exceeds maximum size: {size} bytes (limit: {limit} bytes)")]
    InputTooLarge { size: usize, limit: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Short machine-readable failure code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Request(_) => "request_failed",
            Self::Status { .. } => "http_status",
            Self::InvalidResponse(_) => "invalid_response",
            Self::EmptyOutput => "empty_output",
            Self::Timeout(_) => "timeout",
            Self::Process(_) => "process_failed",
            Self::InputTooLarge { .. } => "input_too_large",
            Self::Config(_) => "misconfigured",
            Self::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Rejects inputs larger than `limit` bytes.
pub(crate) fn check_input_size(size: usize, limit: usize) -> Result<(), AdapterError> {
    if size > limit {
        return Err(AdapterError::InputTooLarge { size, limit });
    }
    Ok(())
}
