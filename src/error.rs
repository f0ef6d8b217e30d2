//! Error types for chunkscribe.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Input errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Audio extraction failed: {message}")]
    AudioExtraction { message: String },

    #[error("WAV decoding failed: {0}")]
    Wav(#[from] hound::Error),

    // Recognition errors
    #[error("Recognition model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Failed to open recognition session: {message}")]
    SessionOpen { message: String },

    #[error("Transcription of window {window} failed: {message}")]
    WindowTranscription { window: usize, message: String },

    // Enrichment errors
    #[error("Alignment failed: {message}")]
    Alignment { message: String },

    #[error("Diarization failed: {message}")]
    Diarization { message: String },

    // Progress delivery
    #[error("Progress callback delivery failed: {message}")]
    CallbackDelivery { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl ScribeError {
    /// Shorthand for [`ScribeError::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Classify this error into the pipeline's failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScribeError::InvalidInput { .. }
            | ScribeError::AudioExtraction { .. }
            | ScribeError::Wav(_)
            | ScribeError::ConfigFileNotFound { .. }
            | ScribeError::ConfigInvalidValue { .. }
            | ScribeError::Config(_) => ErrorKind::InvalidInput,
            ScribeError::ModelNotFound { .. } | ScribeError::SessionOpen { .. } => {
                ErrorKind::SessionOpenFailure
            }
            ScribeError::WindowTranscription { .. } => ErrorKind::WindowTranscriptionFailure,
            ScribeError::Alignment { .. } => ErrorKind::AlignmentFailure,
            ScribeError::Diarization { .. } => ErrorKind::DiarizationFailure,
            ScribeError::CallbackDelivery { .. } => ErrorKind::CallbackDeliveryFailure,
            ScribeError::Json(_) | ScribeError::Io(_) | ScribeError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ScribeError>;

/// Failure categories a job can run into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    SessionOpenFailure,
    WindowTranscriptionFailure,
    AlignmentFailure,
    DiarizationFailure,
    CallbackDeliveryFailure,
    Internal,
}

impl ErrorKind {
    /// Fatal kinds move a job to `failed`; the rest are logged and absorbed.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInput | ErrorKind::SessionOpenFailure | ErrorKind::Internal
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::SessionOpenFailure => "session_open_failure",
            ErrorKind::WindowTranscriptionFailure => "window_transcription_failure",
            ErrorKind::AlignmentFailure => "alignment_failure",
            ErrorKind::DiarizationFailure => "diarization_failure",
            ErrorKind::CallbackDeliveryFailure => "callback_delivery_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error handed to the caller when a job produces no transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ScribeError> for JobError {
    fn from(error: &ScribeError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<ScribeError> for JobError {
    fn from(error: ScribeError) -> Self {
        Self::from(&error)
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for JobError {}
