//! Error types for the orchestration engine
//!
//! Worker-side failures (non-zero exit, unparseable stdout) are not errors;
//! they are recorded in `ExecutionResult`. The variants below are reserved for
//! problems the orchestrator itself detects.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use weave_core::domain::pipeline::FailureKind;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No worker registered under this name
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    /// A worker with this name is already registered
    #[error("Worker already registered: {0} (pass replace to overwrite)")]
    DuplicateWorker(String),

    /// Registry entry is unusable
    #[error("Invalid worker descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// Compile step of a build-then-run worker exited non-zero
    #[error("Build failed: {stderr}")]
    BuildFailed { stderr: String },

    /// Executable missing or not executable
    #[error("Failed to launch '{program}': {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Wall-clock deadline exceeded; the process group was killed
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Invocation was cancelled; the process group was killed
    #[error("Invocation cancelled")]
    Cancelled,

    /// A mailbox artifact could not be decoded
    #[error("Malformed mailbox file {path}: {reason}")]
    MailboxCorruption { path: PathBuf, reason: String },

    /// Pipeline definition has no stages
    #[error("Pipeline '{0}' has no stages")]
    EmptyPipeline(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wraps an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for registry/configuration problems that must never be retried
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownWorker(_) | Self::DuplicateWorker(_) | Self::InvalidDescriptor { .. }
        )
    }

    /// Classification recorded in a stage report
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::UnknownWorker(_) | Self::DuplicateWorker(_) | Self::InvalidDescriptor { .. } => {
                FailureKind::Configuration
            }
            Self::BuildFailed { .. } => FailureKind::BuildFailed,
            Self::LaunchFailed { .. } => FailureKind::LaunchFailed,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Cancelled
            | Self::MailboxCorruption { .. }
            | Self::EmptyPipeline(_)
            | Self::Io { .. }
            | Self::Json(_) => FailureKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(Error::UnknownWorker("cobol".into()).is_configuration());
        assert!(!Error::Timeout(Duration::from_secs(1)).is_configuration());
    }

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            Error::BuildFailed { stderr: "x".into() }.failure_kind(),
            FailureKind::BuildFailed
        );
        assert_eq!(
            Error::Timeout(Duration::from_millis(5)).failure_kind(),
            FailureKind::Timeout
        );
        let launch = Error::LaunchFailed {
            program: "nope".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(launch.failure_kind(), FailureKind::LaunchFailed);
        assert!(launch.to_string().contains("nope"));
    }
}
