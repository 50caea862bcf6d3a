//! autodebug core library
//!
//! A bounded repair loop for a failing script: run it, reduce the failure to
//! its diagnostic lines, ask a completion service for a fix, clean and review
//! the proposal, and apply it with a backup. An operator checkpoint sits
//! before every write.

pub mod audit;
pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod operator;
pub mod patch;
pub mod proposal;
pub mod sanitize;
pub mod session;
pub mod telemetry;

pub use audit::{content_digest, read_session_artifact, write_session_artifact};
pub use completion::{
    build_prompt, complete_with_deadline, CompletionRequest, CompletionService, OllamaClient,
    SYSTEM_PROMPT,
};
pub use config::{ModelOptions, RepairConfig, ServiceConfig};
pub use diagnostics::{extract, Diagnostic, DIAGNOSTIC_MARKERS};
pub use error::{RepairError, Result};
pub use executor::{ExecutionOutcome, ProgramRunner, ScriptExecutor};
pub use operator::{
    parse_yes_no, ConsoleOperator, Operator, ProposalReview, RecoveryChoice, SessionEvent,
};
pub use patch::{
    apply_patch, backup_path_for, read_backup, read_source, ApplyOutcome, BACKUP_SUFFIX,
};
pub use proposal::{parse_proposal, ProposalOrigin, RepairProposal, CODE_MARKER};
pub use sanitize::{sanitize, sanitize_with_fence};
pub use session::{
    AbortReason, AttemptRecord, DebugSession, Decision, RepairController, SessionReport,
    SessionState, TargetSource, TerminalState,
};
pub use telemetry::init_tracing;

/// autodebug version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
