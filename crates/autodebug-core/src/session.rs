//! Repair session controller.
//!
//! Drives one target through the bounded execute → diagnose → propose →
//! decide loop. States are explicit: every [`RepairController::step`]
//! consumes one [`SessionState`] and yields the next, until a terminal state
//! is reached.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::completion::{complete_with_deadline, CompletionRequest, CompletionService};
use crate::config::RepairConfig;
use crate::diagnostics::{extract, Diagnostic};
use crate::error::{RepairError, Result};
use crate::executor::{ExecutionOutcome, ProgramRunner};
use crate::operator::{Operator, ProposalReview, RecoveryChoice, SessionEvent};
use crate::patch::{apply_patch, backup_path_for, read_backup, read_source};
use crate::proposal::{parse_proposal, RepairProposal};
use crate::sanitize::sanitize_with_fence;

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// The file under repair and its most recently read content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSource {
    pub path: PathBuf,
    pub content: String,
}

/// How the operator closed an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Decline,
    Retry,
    Abort,
}

/// One execute → diagnose → propose → decide cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub index: u32,
    pub outcome: ExecutionOutcome,
    pub proposal: Option<RepairProposal>,
    pub decision: Option<Decision>,
    pub applied: bool,
}

impl AttemptRecord {
    fn new(index: u32, outcome: ExecutionOutcome) -> Self {
        Self {
            index,
            outcome,
            proposal: None,
            decision: None,
            applied: false,
        }
    }
}

/// State owned by the controller for the lifetime of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSession {
    pub id: Uuid,
    pub target: TargetSource,
    pub max_attempts: u32,
    /// Append-only audit trail.
    pub attempts: Vec<AttemptRecord>,
    pub backup_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Why a session stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The operator chose to stop.
    Operator,
    /// Reading or writing the target (or talking to the operator) failed.
    SourceIo { message: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator => write!(f, "operator requested exit"),
            Self::SourceIo { message } => write!(f, "i/o failure: {message}"),
        }
    }
}

/// Final state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    Succeeded,
    Exhausted,
    Aborted { reason: AbortReason },
}

impl TerminalState {
    pub fn aborted_by_operator() -> Self {
        Self::Aborted {
            reason: AbortReason::Operator,
        }
    }

    fn aborted_by_io(err: &dyn fmt::Display) -> Self {
        Self::Aborted {
            reason: AbortReason::SourceIo {
                message: err.to_string(),
            },
        }
    }

    /// Whether the runner should exit non-zero.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Aborted {
                reason: AbortReason::SourceIo { .. }
            }
        )
    }
}

/// Everything known about a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session: DebugSession,
    pub terminal: TerminalState,
    /// Number of times the target was executed, including the final
    /// verification run after the last attempt.
    pub executions: u32,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Controller states. `Idle` is implicit in [`RepairController::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Running,
    Diagnosing { outcome: ExecutionOutcome },
    Proposing { diagnostic: Diagnostic },
    /// No usable proposal; the operator picks one of four recovery options.
    Recovery { reason: String },
    AwaitingDecision { proposal: RepairProposal },
    Applying { code: String },
    Skipped,
    Done(TerminalState),
}

/// Orchestrates executor, completion service, patcher and operator.
pub struct RepairController<R, S, O> {
    config: RepairConfig,
    runner: R,
    service: S,
    operator: O,
}

struct Progress {
    session: DebugSession,
    /// Failures seen so far; compared against the attempt budget.
    failures: u32,
    executions: u32,
    open_attempt: Option<AttemptRecord>,
}

impl Progress {
    fn close_attempt(&mut self) {
        if let Some(record) = self.open_attempt.take() {
            self.session.attempts.push(record);
        }
    }

    fn attempt(&mut self) -> Option<&mut AttemptRecord> {
        self.open_attempt.as_mut()
    }
}

impl<R, S, O> RepairController<R, S, O>
where
    R: ProgramRunner,
    S: CompletionService,
    O: Operator,
{
    pub fn new(config: RepairConfig, runner: R, service: S, operator: O) -> Self {
        Self {
            config,
            runner,
            service,
            operator,
        }
    }

    /// Run a full session against `path`.
    ///
    /// Returns `Err` only when no session could be started (bad config or an
    /// unreadable target). In-session I/O failures end in
    /// [`TerminalState::Aborted`] inside the report.
    pub async fn run(&mut self, path: &Path) -> Result<SessionReport> {
        self.config.validate()?;
        let content = read_source(path)?;

        let session = DebugSession {
            id: Uuid::new_v4(),
            target: TargetSource {
                path: path.to_path_buf(),
                content,
            },
            max_attempts: self.config.max_attempts,
            attempts: Vec::new(),
            backup_path: backup_path_for(path),
            started_at: Utc::now(),
        };
        info!(session = %session.id, target = %path.display(), "repair session started");

        let mut progress = Progress {
            session,
            failures: 0,
            executions: 0,
            open_attempt: None,
        };

        self.emit(&SessionEvent::Started {
            target: path.to_path_buf(),
            max_attempts: self.config.max_attempts,
        });

        let mut state = SessionState::Running;
        let terminal = loop {
            state = match state {
                SessionState::Done(terminal) => break terminal,
                other => self.step(&mut progress, other).await,
            };
        };

        progress.close_attempt();
        info!(
            session = %progress.session.id,
            attempts = progress.session.attempts.len(),
            executions = progress.executions,
            terminal = ?terminal,
            "repair session finished"
        );
        self.emit(&SessionEvent::Finished {
            terminal: terminal.clone(),
        });

        Ok(SessionReport {
            session: progress.session,
            terminal,
            executions: progress.executions,
            finished_at: Utc::now(),
        })
    }

    /// Perform one transition.
    async fn step(&mut self, progress: &mut Progress, state: SessionState) -> SessionState {
        match state {
            SessionState::Running => self.execute(progress).await,
            SessionState::Diagnosing { outcome } => self.diagnose(progress, &outcome),
            SessionState::Proposing { diagnostic } => self.propose(progress, &diagnostic).await,
            SessionState::Recovery { reason } => self.recover(progress, reason),
            SessionState::AwaitingDecision { proposal } => self.decide(progress, proposal),
            SessionState::Applying { code } => self.apply(progress, &code),
            SessionState::Skipped => self.after_skip(),
            done @ SessionState::Done(_) => done,
        }
    }

    async fn execute(&mut self, progress: &mut Progress) -> SessionState {
        progress.close_attempt();

        let attempt = progress.failures + 1;
        let verifying = attempt > self.config.max_attempts;
        if verifying {
            self.emit(&SessionEvent::VerificationRun);
        } else {
            self.emit(&SessionEvent::AttemptStarted {
                attempt,
                max_attempts: self.config.max_attempts,
            });
        }

        let outcome = self.runner.run(&progress.session.target.path).await;
        progress.executions += 1;

        if outcome.is_success() {
            // The verification run only confirms the last attempt's fix.
            if !verifying {
                progress.open_attempt = Some(AttemptRecord::new(attempt, outcome));
            }
            return SessionState::Done(TerminalState::Succeeded);
        }

        progress.failures += 1;
        if let Some(err) = outcome.as_error() {
            warn!(attempt = progress.failures, error = %err, "target failed");
        }
        if progress.failures > self.config.max_attempts {
            return SessionState::Done(TerminalState::Exhausted);
        }

        progress.open_attempt = Some(AttemptRecord::new(progress.failures, outcome.clone()));
        SessionState::Diagnosing { outcome }
    }

    fn diagnose(&mut self, progress: &mut Progress, outcome: &ExecutionOutcome) -> SessionState {
        let raw = outcome.failure_text().unwrap_or_default();
        let mut diagnostic = extract(&raw);
        if diagnostic.is_empty() {
            let status = match outcome {
                ExecutionOutcome::Failure {
                    exit_status: Some(code),
                    ..
                } => code.to_string(),
                _ => "unknown".to_string(),
            };
            diagnostic = extract(&format!("process exited with status {status}"));
        }

        self.emit(&SessionEvent::FailureDetected {
            attempt: progress.failures,
            diagnostic: diagnostic.clone(),
        });
        SessionState::Proposing { diagnostic }
    }

    async fn propose(&mut self, progress: &mut Progress, diagnostic: &Diagnostic) -> SessionState {
        let path = progress.session.target.path.clone();
        match read_source(&path) {
            Ok(content) => progress.session.target.content = content,
            Err(err) => return SessionState::Done(TerminalState::aborted_by_io(&err)),
        }

        self.emit(&SessionEvent::Proposing);
        let request = CompletionRequest::for_repair(&progress.session.target.content, diagnostic);
        let reply =
            match complete_with_deadline(&self.service, &request, self.config.request_timeout())
                .await
            {
                Ok(reply) => reply,
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "completion request failed");
                    return SessionState::Recovery {
                        reason: err.to_string(),
                    };
                }
                Err(err) => return SessionState::Done(TerminalState::aborted_by_io(&err)),
            };

        let mut proposal = parse_proposal(&reply);
        proposal.code = sanitize_with_fence(&proposal.code, &self.config.language_fence());
        if !proposal.is_usable() {
            let err = RepairError::ProposalUnusable;
            warn!(error = %err, "discarding proposal");
            return SessionState::Recovery {
                reason: err.to_string(),
            };
        }

        SessionState::AwaitingDecision { proposal }
    }

    fn recover(&mut self, progress: &mut Progress, reason: String) -> SessionState {
        self.emit(&SessionEvent::RecoveryRequired { reason });

        let choice = match self.operator.recovery_choice() {
            Ok(choice) => choice,
            Err(err) => return SessionState::Done(TerminalState::aborted_by_io(&err)),
        };
        info!(%choice, "recovery option selected");

        match choice {
            RecoveryChoice::Retry => {
                if let Some(record) = progress.attempt() {
                    record.decision = Some(Decision::Retry);
                }
                SessionState::Running
            }
            RecoveryChoice::ManualEntry => match self.operator.manual_code() {
                Ok(code) => SessionState::AwaitingDecision {
                    proposal: RepairProposal::manual(code),
                },
                Err(err) => SessionState::Done(TerminalState::aborted_by_io(&err)),
            },
            RecoveryChoice::RestoreBackup => match read_backup(&progress.session.target.path) {
                Ok(Some(code)) => SessionState::AwaitingDecision {
                    proposal: RepairProposal::from_backup(code),
                },
                Ok(None) => {
                    self.emit(&SessionEvent::NoBackup);
                    if let Some(record) = progress.attempt() {
                        record.decision = Some(Decision::Retry);
                    }
                    SessionState::Running
                }
                Err(err) => SessionState::Done(TerminalState::aborted_by_io(&err)),
            },
            RecoveryChoice::Abort => {
                if let Some(record) = progress.attempt() {
                    record.decision = Some(Decision::Abort);
                }
                SessionState::Done(TerminalState::aborted_by_operator())
            }
        }
    }

    fn decide(&mut self, progress: &mut Progress, proposal: RepairProposal) -> SessionState {
        let review = ProposalReview::new(progress.session.target.content.clone(), proposal);
        let accepted = match self.operator.review(&review) {
            Ok(accepted) => accepted,
            Err(err) => return SessionState::Done(TerminalState::aborted_by_io(&err)),
        };

        let code = review.proposal.code.clone();
        if let Some(record) = progress.attempt() {
            record.proposal = Some(review.proposal);
            record.decision = Some(if accepted {
                Decision::Accept
            } else {
                Decision::Decline
            });
        }

        if accepted {
            SessionState::Applying { code }
        } else {
            SessionState::Skipped
        }
    }

    fn apply(&mut self, progress: &mut Progress, code: &str) -> SessionState {
        let outcome = match apply_patch(&progress.session.target.path, code) {
            Ok(outcome) => outcome,
            Err(err) => return SessionState::Done(TerminalState::aborted_by_io(&err)),
        };

        if let Some(warning) = &outcome.backup_warning {
            self.emit(&SessionEvent::BackupWarning {
                message: warning.to_string(),
            });
        }
        self.emit(&SessionEvent::Applied {
            backup_created: outcome.backup_created(),
        });

        progress.session.target.content = code.to_string();
        progress.session.backup_path = outcome.backup_path;
        if let Some(record) = progress.attempt() {
            record.applied = true;
        }
        SessionState::Running
    }

    fn after_skip(&mut self) -> SessionState {
        self.emit(&SessionEvent::Skipped);
        match self.operator.continue_after_skip() {
            Ok(true) => SessionState::Running,
            Ok(false) => SessionState::Done(TerminalState::aborted_by_operator()),
            Err(err) => SessionState::Done(TerminalState::aborted_by_io(&err)),
        }
    }

    fn emit(&mut self, event: &SessionEvent) {
        if let Err(err) = self.operator.notify(event) {
            warn!(error = %err, "failed to report session event");
        }
    }
}
