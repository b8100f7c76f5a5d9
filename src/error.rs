//! Unified error handling for the crawl-orchestrator crate
//!
//! Each layer owns a domain error type:
//!
//! - [`OrchestratorError`] - admission, validation and job failures
//! - [`CrawlerError`] - failures raised by platform crawlers
//! - [`StorageError`] - failures raised by result stores
//!
//! [`Error`] wraps all of them so callers crossing module boundaries can use a
//! single type, and [`OrchestratorErrorTrait`] exposes the classification used
//! by the API layer to pick status codes.

use std::io;
use thiserror::Error;

pub use crate::crawler::CrawlerError;
pub use crate::orchestrator::error::OrchestratorError;
pub use crate::storage::StorageError;

/// Common trait for all crate error types
pub trait OrchestratorErrorTrait: std::error::Error {
    /// Whether the caller may retry the same request later and expect success
    fn is_recoverable(&self) -> bool;

    /// Error category used for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Another job holds the global slot
    Conflict,
    /// Malformed or unsupported request fields
    Validation,
    /// Unknown job or document
    NotFound,
    /// Crawler worker and network failures
    Crawler,
    /// Storage and I/O failures
    Storage,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Crawler => "crawler",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Orchestration errors
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// Crawler adapter errors
    #[error("Crawler error: {0}")]
    Crawler(#[from] CrawlerError),

    /// Result store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl OrchestratorErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Orchestrator(e) => e.is_recoverable(),
            Self::Crawler(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Orchestrator(e) => e.category(),
            Self::Crawler(_) => ErrorCategory::Crawler,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Validation,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
