use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::orchestrator::TaskError;
use crate::reasoning::ReasoningError;
use crate::retrieval::RetrievalError;

/// Main error type for the IEDP application
#[derive(Error, Debug)]
pub enum IedpError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// A document could not be loaded
    #[error("Failed to load document {path}: {message}")]
    DocumentLoad { path: PathBuf, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Retrieval failures surfaced outside of a task
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Reasoning failures surfaced outside of a task
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    /// A dispatched task failed
    #[error(transparent)]
    Task(#[from] TaskError),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),
}

impl IedpError {
    /// The core error kind behind this error, if it came from the query core
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            IedpError::Retrieval(e) => Some(e.kind()),
            IedpError::Reasoning(e) => Some(e.kind()),
            IedpError::Task(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        self.kind().map(|k| k.exit_code()).unwrap_or(1)
    }
}

/// Failure categories shared by the retriever, reasoner and orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Empty query text, `k < 1`, or a task that names nothing to work on
    InvalidQuery,
    /// The dense/sparse index or the embedding backend could not be reached
    RetrievalUnavailable,
    /// Content type outside `text | image | table | pdf`
    UnsupportedContentType,
    /// The reasoning backend did not answer within its timeout
    ReasoningTimeout,
    /// The task needed more sub-calls than `agent.max_iterations`
    IterationLimitExceeded,
    /// The task deadline elapsed
    Timeout,
    /// A referenced document is not in the corpus
    DocumentNotFound,
    /// A backend answered with something unusable
    Backend,
}

impl ErrorKind {
    /// Transient failures the orchestrator retries
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RetrievalUnavailable | ErrorKind::ReasoningTimeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::RetrievalUnavailable => "retrieval_unavailable",
            ErrorKind::UnsupportedContentType => "unsupported_content_type",
            ErrorKind::ReasoningTimeout => "reasoning_timeout",
            ErrorKind::IterationLimitExceeded => "iteration_limit_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::DocumentNotFound => "document_not_found",
            ErrorKind::Backend => "backend",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InvalidQuery => 2,
            ErrorKind::DocumentNotFound => 3,
            ErrorKind::UnsupportedContentType => 4,
            ErrorKind::RetrievalUnavailable => 5,
            ErrorKind::ReasoningTimeout => 6,
            ErrorKind::IterationLimitExceeded => 7,
            ErrorKind::Timeout => 8,
            ErrorKind::Backend => 9,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for IEDP operations
pub type Result<T> = std::result::Result<T, IedpError>;
