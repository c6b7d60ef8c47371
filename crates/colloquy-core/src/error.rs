use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Uniform classification shared by tool results, failed turns and run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed tool input, rejected before any external call.
    InvalidArgument,
    /// A valid call that produced no data. A result variant, not a failure.
    EmptyResult,
    /// An external backend (model, search service, human input) was unreachable.
    DependencyUnavailable,
    /// The selection policy named a participant outside the eligible set.
    InvalidSelection,
    /// A participant could not complete its turn.
    TurnFailed,
    /// No participant may speak any more. Signals normal completion.
    NoEligibleSpeaker,
    /// A tool call was refused by the approval hook.
    Denied,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::DependencyUnavailable => "dependency_unavailable",
            ErrorKind::InvalidSelection => "invalid_selection",
            ErrorKind::TurnFailed => "turn_failed",
            ErrorKind::NoEligibleSpeaker => "no_eligible_speaker",
            ErrorKind::Denied => "denied",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ColloquyError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Invalid argument for {tool}: {message}")]
    InvalidArgument { tool: String, message: String },

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Invalid selection: '{selected}' is not an eligible speaker")]
    InvalidSelection { selected: String },

    #[error("Transcript integrity violation: {0}")]
    Transcript(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ColloquyError {
    pub fn invalid_argument(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ColloquyError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            ColloquyError::InvalidSelection { .. } => ErrorKind::InvalidSelection,
            ColloquyError::Transcript(_) => ErrorKind::TurnFailed,
            ColloquyError::Llm(_)
            | ColloquyError::DependencyUnavailable(_)
            | ColloquyError::Http(_)
            | ColloquyError::Io(_) => ErrorKind::DependencyUnavailable,
            ColloquyError::Json(_) => ErrorKind::InvalidArgument,
            ColloquyError::Config(_) | ColloquyError::Other(_) => ErrorKind::TurnFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, ColloquyError>;
