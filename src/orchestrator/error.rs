//! Error types for the orchestrator module

use std::fmt;

use crate::crawler::CrawlerError;
use crate::error::{ErrorCategory, OrchestratorErrorTrait};
use crate::models::Platform;
use crate::storage::StorageError;

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Orchestrator-specific errors
#[derive(Debug)]
pub enum OrchestratorError {
    /// A job already holds the global slot
    AdmissionConflict {
        running_task: Option<String>,
    },

    /// Request fields are malformed, empty or unsupported
    Validation {
        reason: String,
    },

    /// No job with the given id is known
    NotFound {
        task_id: String,
    },

    /// A platform crawler failed during a step
    CrawlFailure {
        platform: Platform,
        source: CrawlerError,
    },

    /// The result store failed during a step
    PersistenceFailure {
        platform: Platform,
        source: StorageError,
    },

    /// The job was stopped by process shutdown
    Interrupted,

    /// The job task died without reporting an outcome
    Aborted {
        reason: String,
    },

    /// A job record was mutated after reaching a terminal state
    TerminalJob {
        task_id: String,
    },
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdmissionConflict { running_task } => match running_task {
                Some(id) => write!(
                    f,
                    "Task queue is full. Task {} is currently running.",
                    id
                ),
                None => write!(f, "Task queue is full. Another task is currently running."),
            },
            Self::Validation { reason } => write!(f, "Validation error: {}", reason),
            Self::NotFound { task_id } => {
                write!(f, "Task {} not found or has expired", task_id)
            }
            Self::CrawlFailure { platform, source } => {
                write!(f, "Crawl failed on platform '{}': {}", platform, source)
            }
            Self::PersistenceFailure { platform, source } => {
                write!(f, "Saving results failed for platform '{}': {}", platform, source)
            }
            Self::Interrupted => write!(f, "Task interrupted by shutdown"),
            Self::Aborted { reason } => write!(f, "Task aborted: {}", reason),
            Self::TerminalJob { task_id } => {
                write!(f, "Task {} already finished and cannot be modified", task_id)
            }
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CrawlFailure { source, .. } => Some(source),
            Self::PersistenceFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl OrchestratorError {
    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(task_id: impl Into<String>) -> Self {
        Self::NotFound {
            task_id: task_id.into(),
        }
    }
}

impl OrchestratorErrorTrait for OrchestratorError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::AdmissionConflict { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::AdmissionConflict { .. } => ErrorCategory::Conflict,
            Self::Validation { .. } | Self::TerminalJob { .. } => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::CrawlFailure { .. } => ErrorCategory::Crawler,
            Self::PersistenceFailure { .. } => ErrorCategory::Storage,
            Self::Interrupted | Self::Aborted { .. } => ErrorCategory::Other,
        }
    }
}
