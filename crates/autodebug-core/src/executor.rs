//! Target execution under a wall-clock limit.
//!
//! [`ProgramRunner`] is the seam the controller talks to; [`ScriptExecutor`]
//! is the concrete runner that spawns `<interpreter> <target>`.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::RepairConfig;
use crate::error::RepairError;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one execution of the target program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Process exited with status zero.
    Success,

    /// Non-zero exit, or the process could not be run at all.
    Failure {
        raw_stderr: String,
        exit_status: Option<i32>,
    },

    /// Wall-clock limit reached; the process was killed.
    Timeout { limit_secs: u64 },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Raw failure text handed to the diagnostic extractor.
    ///
    /// `None` for a successful run.
    pub fn failure_text(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::Failure { raw_stderr, .. } => Some(raw_stderr.clone()),
            Self::Timeout { limit_secs } => Some(
                RepairError::ExecutionTimeout {
                    limit_secs: *limit_secs,
                }
                .to_string(),
            ),
        }
    }

    /// The error this outcome represents, if any.
    pub fn as_error(&self) -> Option<RepairError> {
        match self {
            Self::Success => None,
            Self::Failure {
                raw_stderr,
                exit_status,
            } => Some(RepairError::ExecutionFailure {
                exit_status: *exit_status,
                diagnostic: raw_stderr.clone(),
            }),
            Self::Timeout { limit_secs } => Some(RepairError::ExecutionTimeout {
                limit_secs: *limit_secs,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Runner trait
// ---------------------------------------------------------------------------

/// Anything that can run the target and report how it went.
///
/// Implementations must not fail past this boundary: spawn problems are
/// reported as [`ExecutionOutcome::Failure`].
#[async_trait]
pub trait ProgramRunner: Send + Sync {
    async fn run(&self, path: &Path) -> ExecutionOutcome;
}

// ---------------------------------------------------------------------------
// Script executor
// ---------------------------------------------------------------------------

/// Runs the target through an interpreter as a child process.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    interpreter: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ScriptExecutor {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn from_config(config: &RepairConfig) -> Self {
        Self::new(config.interpreter.clone(), config.execution_timeout())
            .with_args(config.interpreter_args.clone())
    }

    /// Arguments placed between the interpreter and the target path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn limit_secs(&self) -> u64 {
        // Sub-second limits are only used in tests; report them as one second.
        self.timeout.as_secs().max(1)
    }
}

#[async_trait]
impl ProgramRunner for ScriptExecutor {
    async fn run(&self, path: &Path) -> ExecutionOutcome {
        let start = Instant::now();

        let child = Command::new(&self.interpreter)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(err) => {
                warn!(interpreter = %self.interpreter, error = %err, "failed to spawn target");
                return ExecutionOutcome::Failure {
                    raw_stderr: format!("failed to start {}: {err}", self.interpreter),
                    exit_status: None,
                };
            }
        };

        // Dropping the wait future on expiry drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(error = %err, "failed to collect target output");
                return ExecutionOutcome::Failure {
                    raw_stderr: format!("failed to wait for target: {err}"),
                    exit_status: None,
                };
            }
            Err(_elapsed) => {
                warn!(limit_ms = self.timeout.as_millis() as u64, "target timed out");
                return ExecutionOutcome::Timeout {
                    limit_secs: self.limit_secs(),
                };
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        debug!(duration_ms, stdout = %stdout, "target finished");

        if output.status.success() {
            ExecutionOutcome::Success
        } else {
            ExecutionOutcome::Failure {
                raw_stderr: stderr,
                exit_status: output.status.code(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_text_for_each_outcome() {
        assert_eq!(ExecutionOutcome::Success.failure_text(), None);

        let failure = ExecutionOutcome::Failure {
            raw_stderr: "boom".to_string(),
            exit_status: Some(2),
        };
        assert_eq!(failure.failure_text().as_deref(), Some("boom"));

        let timeout = ExecutionOutcome::Timeout { limit_secs: 30 };
        assert_eq!(
            timeout.failure_text().as_deref(),
            Some("Error: Code execution timed out after 30 seconds")
        );
    }

    #[test]
    fn test_as_error_maps_variants() {
        assert!(ExecutionOutcome::Success.as_error().is_none());
        assert!(matches!(
            ExecutionOutcome::Timeout { limit_secs: 1 }.as_error(),
            Some(RepairError::ExecutionTimeout { limit_secs: 1 })
        ));
        assert!(matches!(
            ExecutionOutcome::Failure {
                raw_stderr: String::new(),
                exit_status: Some(1)
            }
            .as_error(),
            Some(RepairError::ExecutionFailure {
                exit_status: Some(1),
                ..
            })
        ));
    }

    #[test]
    fn test_outcome_serde_tagging() {
        let json = serde_json::to_value(ExecutionOutcome::Timeout { limit_secs: 30 }).unwrap();
        assert_eq!(json["status"], "timeout");
        assert_eq!(json["limit_secs"], 30);
    }

    #[test]
    fn test_from_config_uses_interpreter_and_timeout() {
        let config = RepairConfig::default()
            .with_interpreter("sh")
            .with_execution_timeout_secs(7);
        let executor = ScriptExecutor::from_config(&config);
        assert_eq!(executor.interpreter, "sh");
        assert_eq!(executor.timeout, Duration::from_secs(7));
        assert_eq!(executor.limit_secs(), 7);
    }

    #[tokio::test]
    async fn test_missing_interpreter_maps_to_failure() {
        let executor = ScriptExecutor::new(
            "definitely-not-an-interpreter-4f1c",
            Duration::from_secs(5),
        );
        match executor.run(Path::new("whatever.py")).await {
            ExecutionOutcome::Failure {
                raw_stderr,
                exit_status,
            } => {
                assert!(raw_stderr.contains("failed to start"));
                assert_eq!(exit_status, None);
            }
            other => panic!("expected Failure, got {:?}", other),
        }
    }
}
