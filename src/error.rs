//! Error types for the sweep engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Errors that can occur while building, running or evaluating a sweep.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The dataset path does not exist.
    #[error("Document not found at '{0}'")]
    DocumentNotFound(PathBuf),

    /// The dataset was readable but violates the document contract.
    #[error("Invalid document '{name}': {reason}")]
    InvalidDocument { name: String, reason: String },

    /// Invalid strategy configuration (chunk length, overlap, top-k...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error that is not worth retrying.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Connection loss, rate limiting or a 5xx response.
    #[error("Transient service error: {0}")]
    Transient(String),

    /// A transient failure persisted past the retry budget.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// Configuration file or environment error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two distinct pipeline combinations render to the same cell key.
    #[error("Cell key '{key}' is produced by more than one combination")]
    CellKeyCollision { key: String },

    /// A cell key clashes with a reserved run-state entry.
    #[error("Cell key '{0}' clashes with a reserved results entry")]
    ReservedCellKey(String),

    /// A chunker, ranker or QA model failed for a reason of its own.
    #[error("{role} '{identity}' failed: {reason}")]
    Collaborator {
        role: &'static str,
        identity: String,
        reason: String,
    },
}

impl SweepError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SweepError::Transient(_))
    }
}

impl From<reqwest::Error> for SweepError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            SweepError::Transient(err.to_string())
        } else {
            SweepError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        SweepError::LlmParse(err.to_string())
    }
}
