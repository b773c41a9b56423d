//! Shared types for the Voxa voice relay.
//!
//! This crate holds the conversation and pipeline result types used by every
//! other crate in the workspace. It has no runtime dependencies beyond
//! `serde`, which keeps the dependency graph acyclic.

pub mod pipeline;

use serde::{Deserialize, Serialize};

pub use pipeline::{Disposition, FatalKind, PipelineResult, Stage, FALLBACK_REPLY_TEXT};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human talking into the microphone.
    User,
    /// The language model reply.
    Assistant,
}

impl Role {
    /// Returns the label used when rendering a prompt line.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One utterance or reply in a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}
