use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Difficulty;
use crate::session::BattleStatus;

/// Errors raised by the battle engine and its collaborators.
#[derive(Error, Debug)]
pub enum BattleError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Insufficient questions for {category}/{difficulty}: requested {requested}, available {available}"
    )]
    InsufficientQuestions {
        category: String,
        difficulty: Difficulty,
        requested: usize,
        available: usize,
    },

    #[error("Matchmaking timed out after {waited_secs}s")]
    MatchmakingTimeout { waited_secs: u32 },

    #[error("Realtime channel disconnected: {0}")]
    ChannelDisconnected(String),

    #[error("Cannot {operation} while session is {status}")]
    InvalidState { operation: &'static str, status: BattleStatus },

    #[error("Question source failure: {0}")]
    QuestionSource(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Session runtime has stopped")]
    RuntimeStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BattleError {
    /// Stable machine-readable code surfaced to the UI layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            BattleError::Configuration(_) => "CONFIGURATION_ERROR",
            BattleError::InsufficientQuestions { .. } => "INSUFFICIENT_QUESTIONS",
            BattleError::MatchmakingTimeout { .. } => "MATCHMAKING_TIMEOUT",
            BattleError::ChannelDisconnected(_) => "CHANNEL_DISCONNECTED",
            BattleError::InvalidState { .. } => "INVALID_STATE",
            BattleError::QuestionSource(_) => "QUESTION_SOURCE_FAILED",
            BattleError::Persistence(_) => "PERSISTENCE_FAILED",
            BattleError::RuntimeStopped => "RUNTIME_STOPPED",
            BattleError::Io(_) => "IO_ERROR",
            BattleError::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether this error ends the session it occurred in.
    ///
    /// Start-time validation errors leave the session idle, and round-level
    /// misses never surface as errors at all.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            BattleError::MatchmakingTimeout { .. } => true,
            BattleError::ChannelDisconnected(_) => true,
            BattleError::QuestionSource(_) => true,
            BattleError::Configuration(_) => false,
            BattleError::InsufficientQuestions { .. } => false,
            BattleError::InvalidState { .. } => false,
            BattleError::Persistence(_) => false,
            BattleError::RuntimeStopped => false,
            BattleError::Io(_) | BattleError::Json(_) => false,
        }
    }
}

/// Error payload stored on a session that ended in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub message: String,
    pub code: String,
}

impl SessionError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { message: message.into(), code: code.into() }
    }
}

impl From<&BattleError> for SessionError {
    fn from(err: &BattleError) -> Self {
        Self { message: err.to_string(), code: err.error_code().to_string() }
    }
}

pub type Result<T> = std::result::Result<T, BattleError>;
