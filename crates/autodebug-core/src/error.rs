//! Error taxonomy for the repair loop.

use std::path::PathBuf;

/// Errors produced while running a repair session.
///
/// Execution and proposal variants are recoverable: the controller turns them
/// into state transitions. `SourceIo` is fatal for the session and
/// `InvalidInvocation` is raised before a session exists.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("Error: Code execution timed out after {limit_secs} seconds")]
    ExecutionTimeout { limit_secs: u64 },

    #[error("execution failed (exit status {}): {diagnostic}", display_status(.exit_status))]
    ExecutionFailure {
        exit_status: Option<i32>,
        diagnostic: String,
    },

    #[error("proposal service error: {0}")]
    ProposalService(String),

    #[error("proposal service timed out after {timeout_secs}s")]
    ProposalServiceTimeout { timeout_secs: u64 },

    #[error("proposal contained no usable code")]
    ProposalUnusable,

    #[error("could not create backup {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source i/o failed for {}: {source}", .path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepairError {
    /// Wrap an I/O error on the target source.
    pub fn source_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SourceIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the controller can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ExecutionTimeout { .. }
                | Self::ExecutionFailure { .. }
                | Self::ProposalService(_)
                | Self::ProposalServiceTimeout { .. }
                | Self::ProposalUnusable
                | Self::Backup { .. }
        )
    }
}

fn display_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "unknown".to_string(), |code| code.to_string())
}

/// Result type for repair operations.
pub type Result<T> = std::result::Result<T, RepairError>;
