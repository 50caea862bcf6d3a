//! autodebug - interactive repair loop for a failing script
//!
//! Runs the target, sends the failure to a local Ollama model, shows the
//! proposed fix as a diff and applies it on approval. Repeats until the
//! script runs cleanly, the attempt budget is spent, or the operator exits.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use autodebug_core::{
    init_tracing, write_session_artifact, ConsoleOperator, OllamaClient, RepairConfig,
    RepairController, ScriptExecutor, SessionReport,
};

#[derive(Parser, Debug)]
#[command(name = "autodebug")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a script and repair it with a local code model", long_about = None)]
struct Cli {
    /// Script to run and repair
    target: PathBuf,

    /// Interpreter used to run the target
    #[arg(long, env = "AUTODEBUG_INTERPRETER", default_value = "python3")]
    interpreter: String,

    /// Extra interpreter argument placed before the target (repeatable)
    #[arg(long = "interpreter-arg", value_name = "ARG", allow_hyphen_values = true)]
    interpreter_args: Vec<String>,

    /// Language tag stripped from fenced code in proposals
    #[arg(long, default_value = "python")]
    fence_language: String,

    /// Model name served by the completion endpoint
    #[arg(long, env = "AUTODEBUG_MODEL", default_value = "qwen2.5-coder:0.5b")]
    model: String,

    /// Base URL of the Ollama server
    #[arg(long, env = "OLLAMA_HOST", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.1)]
    temperature: f32,

    /// Number of diagnosed attempts before giving up
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Wall-clock limit for one run of the target, in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Limit for one completion request, in seconds
    #[arg(long, default_value_t = 120)]
    request_timeout_secs: u64,

    /// Apply every proposal without prompting
    #[arg(short, long)]
    yes: bool,

    /// Write a digest-checked session record under this directory
    #[arg(long)]
    audit_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn repair_config(&self) -> RepairConfig {
        RepairConfig::default()
            .with_interpreter(self.interpreter.clone())
            .with_interpreter_args(self.interpreter_args.clone())
            .with_fence_language(self.fence_language.clone())
            .with_model(self.model.clone())
            .with_service_url(self.ollama_url.clone())
            .with_temperature(self.temperature)
            .with_max_attempts(self.max_attempts)
            .with_execution_timeout_secs(self.timeout_secs)
            .with_request_timeout_secs(self.request_timeout_secs)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    init_tracing(cli.json, level);

    let report = run_session(&cli).await?;

    if let Some(dir) = &cli.audit_dir {
        let path = record_session(&report, dir)?;
        println!("Session record: {}", path.display());
    }

    if report.terminal.is_fatal() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_session(cli: &Cli) -> Result<SessionReport> {
    let config = cli.repair_config();
    config.validate().context("Invalid options")?;

    let runner = ScriptExecutor::from_config(&config);
    let service =
        OllamaClient::from_config(&config).context("Failed to set up the completion client")?;
    let operator = ConsoleOperator::stdio().auto_approve(cli.yes);

    let mut controller = RepairController::new(config, runner, service, operator);
    controller
        .run(&cli.target)
        .await
        .with_context(|| format!("Failed to start a session for {}", cli.target.display()))
}

fn record_session(report: &SessionReport, dir: &Path) -> Result<PathBuf> {
    let path = write_session_artifact(report, dir)
        .with_context(|| format!("Failed to write session record to {}", dir.display()))?;
    info!(session = %report.session.id, path = %path.display(), "session record written");
    Ok(path)
}
