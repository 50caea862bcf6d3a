//! Operator decision points and the console surface.
//!
//! The controller never reads stdin or writes stdout itself. It reports
//! [`SessionEvent`]s and asks an [`Operator`] to decide at the two
//! checkpoints: the recovery menu and the apply/continue prompts.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;

use similar::TextDiff;

use crate::diagnostics::Diagnostic;
use crate::proposal::RepairProposal;
use crate::session::TerminalState;

// ---------------------------------------------------------------------------
// Choices
// ---------------------------------------------------------------------------

/// Options offered when no usable proposal is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    /// `1`: run again and re-query.
    Retry,
    /// `2`: type replacement code, terminated by end of input.
    ManualEntry,
    /// `3`: propose the `.backup` content.
    RestoreBackup,
    /// `4`: stop the session.
    Abort,
}

impl FromStr for RecoveryChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Self::Retry),
            "2" => Ok(Self::ManualEntry),
            "3" => Ok(Self::RestoreBackup),
            "4" => Ok(Self::Abort),
            other => Err(format!("invalid choice '{other}', expected 1-4")),
        }
    }
}

/// Parse a y/n answer. Anything else is `None`.
pub fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Events and review material
// ---------------------------------------------------------------------------

/// Status updates emitted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { target: PathBuf, max_attempts: u32 },
    AttemptStarted { attempt: u32, max_attempts: u32 },
    /// Run after the last attempt to check its fix; never opens an attempt.
    VerificationRun,
    FailureDetected { attempt: u32, diagnostic: Diagnostic },
    Proposing,
    RecoveryRequired { reason: String },
    NoBackup,
    BackupWarning { message: String },
    Applied { backup_created: bool },
    Skipped,
    Finished { terminal: TerminalState },
}

/// Everything the operator needs to accept or decline a proposal.
#[derive(Debug, Clone)]
pub struct ProposalReview {
    pub before: String,
    pub proposal: RepairProposal,
}

impl ProposalReview {
    pub fn new(before: impl Into<String>, proposal: RepairProposal) -> Self {
        Self {
            before: before.into(),
            proposal,
        }
    }

    /// Unified diff from the current source to the proposed code.
    pub fn unified_diff(&self) -> String {
        TextDiff::from_lines(self.before.as_str(), self.proposal.code.as_str())
            .unified_diff()
            .context_radius(3)
            .header("Before", "After")
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Operator trait
// ---------------------------------------------------------------------------

/// The human (or policy) in the loop.
///
/// Methods block until a decision is made. An `Err` means the operator
/// channel itself broke and ends the session.
pub trait Operator {
    fn notify(&mut self, event: &SessionEvent) -> io::Result<()>;

    fn recovery_choice(&mut self) -> io::Result<RecoveryChoice>;

    /// Replacement code typed by the operator. Accepted as-is.
    fn manual_code(&mut self) -> io::Result<String>;

    /// `true` to apply the proposal.
    fn review(&mut self, review: &ProposalReview) -> io::Result<bool>;

    /// Asked after a declined proposal; `false` aborts the session.
    fn continue_after_skip(&mut self) -> io::Result<bool>;
}

// ---------------------------------------------------------------------------
// Console operator
// ---------------------------------------------------------------------------

const RULE_WIDTH: usize = 50;

/// Prompts on a reader/writer pair, normally stdin/stdout.
///
/// With `auto_approve` every proposal is applied, skipped proposals continue,
/// and the recovery menu picks retry; the decisions are still echoed.
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
    auto_approve: bool,
}

impl ConsoleOperator<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            auto_approve: false,
        }
    }

    pub fn auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = enabled;
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn read_answer(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed while waiting for an answer",
            ));
        }
        Ok(line)
    }

    fn ask_yes_no(&mut self, prompt: &str) -> io::Result<bool> {
        loop {
            let answer = self.read_answer(prompt)?;
            match parse_yes_no(&answer) {
                Some(value) => return Ok(value),
                None => writeln!(self.output, "Please answer y or n.")?,
            }
        }
    }

    fn rule(&mut self) -> io::Result<()> {
        writeln!(self.output, "{}", "─".repeat(RULE_WIDTH))
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn notify(&mut self, event: &SessionEvent) -> io::Result<()> {
        let out = &mut self.output;
        match event {
            SessionEvent::Started {
                target,
                max_attempts,
            } => {
                writeln!(out, "\n🔍 Starting debug session for: {}", target.display())?;
                writeln!(out, "   attempt budget: {max_attempts}")?;
                writeln!(out, "{}", "=".repeat(60))?;
            }
            SessionEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => {
                writeln!(out, "\n📌 Debug attempt {attempt}/{max_attempts}")?;
                writeln!(out, "▶ Running code...")?;
            }
            SessionEvent::VerificationRun => {
                writeln!(out, "\n🔎 Verifying the last fix...")?;
                writeln!(out, "▶ Running code...")?;
            }
            SessionEvent::FailureDetected { diagnostic, .. } => {
                writeln!(out, "\n❌ Error detected:")?;
                writeln!(out, "{diagnostic}")?;
            }
            SessionEvent::Proposing => {
                writeln!(out, "\n🤖 Analyzing code and generating fix...")?;
            }
            SessionEvent::RecoveryRequired { reason } => {
                writeln!(out, "\n⚠ Failed to get a usable suggestion: {reason}")?;
            }
            SessionEvent::NoBackup => writeln!(out, "No backup file found")?,
            SessionEvent::BackupWarning { message } => {
                writeln!(out, "⚠ Warning: could not create backup: {message}")?;
            }
            SessionEvent::Applied { backup_created } => {
                if *backup_created {
                    writeln!(out, "✓ Backup created")?;
                }
                writeln!(out, "✓ Fix applied")?;
            }
            SessionEvent::Skipped => writeln!(out, "\n⚠ Fix skipped")?,
            SessionEvent::Finished { terminal } => {
                let line = match terminal {
                    TerminalState::Succeeded => "✨ Success! Code ran without errors!".to_string(),
                    TerminalState::Exhausted => {
                        "⛔ Attempt budget exhausted; the program still fails.".to_string()
                    }
                    TerminalState::Aborted { reason } => format!("⏹ Session aborted: {reason}"),
                };
                writeln!(out, "\n{line}")?;
            }
        }
        out.flush()
    }

    fn recovery_choice(&mut self) -> io::Result<RecoveryChoice> {
        writeln!(self.output, "Options:")?;
        writeln!(self.output, "1. Try again")?;
        writeln!(self.output, "2. Enter code manually")?;
        writeln!(self.output, "3. Restore from backup")?;
        writeln!(self.output, "4. Exit")?;

        if self.auto_approve {
            writeln!(self.output, "Enter choice (1-4): 1 (auto)")?;
            return Ok(RecoveryChoice::Retry);
        }

        loop {
            let answer = self.read_answer("Enter choice (1-4): ")?;
            match answer.parse::<RecoveryChoice>() {
                Ok(choice) => return Ok(choice),
                Err(msg) => writeln!(self.output, "{msg}")?,
            }
        }
    }

    fn manual_code(&mut self) -> io::Result<String> {
        writeln!(self.output, "\nEnter new code (Ctrl+D when done):")?;
        self.output.flush()?;
        let mut bytes = Vec::new();
        self.input.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn review(&mut self, review: &ProposalReview) -> io::Result<bool> {
        if let Some(explanation) = &review.proposal.explanation {
            writeln!(self.output, "\n💡 Analysis:")?;
            writeln!(self.output, "{explanation}")?;
        }

        writeln!(self.output, "\n📋 Code changes:")?;
        self.rule()?;
        write!(self.output, "{}", review.unified_diff())?;
        self.rule()?;

        if self.auto_approve {
            writeln!(self.output, "\nApply this fix? (y/n): y (auto)")?;
            return Ok(true);
        }
        self.ask_yes_no("\nApply this fix? (y/n): ")
    }

    fn continue_after_skip(&mut self) -> io::Result<bool> {
        if self.auto_approve {
            writeln!(self.output, "Continue debugging? (y/n): y (auto)")?;
            return Ok(true);
        }
        self.ask_yes_no("Continue debugging? (y/n): ")
    }
}

impl fmt::Display for RecoveryChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Retry => "retry",
            Self::ManualEntry => "manual entry",
            Self::RestoreBackup => "restore from backup",
            Self::Abort => "abort",
        };
        f.write_str(label)
    }
}
