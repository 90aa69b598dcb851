//! Command-line front end: one-shot or interactive query loop.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::agent_engine::engine::{AgentLoop, AgentParts};
use crate::agent_engine::history::default_episodes_dir;
use crate::agent_engine::state::{EpisodeOutcome, LoopConfig, TerminalStatus};
use crate::config::{self, AppConfig, PermissionMode};
use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::executor::dispatcher::{ActionExecutor, DryRunExecutor};
use crate::executor::input::EnigoExecutor;
use crate::executor::safety::gate_for;
use crate::llm::decision::LlmDecisionProvider;
use crate::logging;
use crate::perception::scaling::scale;
use crate::perception::screenshot::PrimaryMonitorCapture;
use crate::platform::notify::platform_notifier;

#[derive(Debug, Parser)]
#[command(
    name = "screenpilot",
    version,
    about = "Drive the desktop from natural-language instructions"
)]
pub struct Cli {
    /// Path to config.toml (default: next to the binary, working dir, user config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run this instruction once and exit instead of prompting.
    #[arg(short, long)]
    instruction: Option<String>,

    /// Step budget per episode (at least 1).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_steps: Option<u32>,

    /// How proposed actions are confirmed.
    #[arg(long, value_enum)]
    permission: Option<PermissionArg>,

    /// Log approved actions instead of performing them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PermissionArg {
    Dialog,
    Terminal,
    Auto,
}

impl From<PermissionArg> for PermissionMode {
    fn from(arg: PermissionArg) -> Self {
        match arg {
            PermissionArg::Dialog => PermissionMode::Dialog,
            PermissionArg::Terminal => PermissionMode::Terminal,
            PermissionArg::Auto => PermissionMode::Auto,
        }
    }
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) -> ScreenPilotResult<()> {
        if let Some(max_steps) = self.max_steps {
            config.agent.max_steps = max_steps;
        }
        if let Some(permission) = self.permission {
            config.safety.permission = permission.into();
        }
        config.validate()
    }
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("screenpilot: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ScreenPilotResult<ExitCode> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let (mut config, source) = config::load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config)?;
    let log = Arc::new(logging::init(&config.logging)?);
    tracing::info!(run_id = log.run_id(), permission = ?config.safety.permission, "screenpilot starting");
    source.log(&config);

    let (width, height) = PrimaryMonitorCapture::screen_size()?;
    let (scaled_w, scaled_h) = scale(width, height, config.screen.max_dim);
    tracing::info!(width, height, scaled_w, scaled_h, "primary screen");

    let mut agent = build_agent(&cli, &config, log)?;

    if let Some(instruction) = &cli.instruction {
        let outcome = agent.run(instruction).await?;
        report(&outcome);
        return Ok(ExitCode::from(exit_status(&outcome.status)));
    }

    loop {
        let Some(query) = prompt_query().await? else {
            break;
        };
        if query.trim().is_empty() {
            continue;
        }
        agent.reset();
        let outcome = agent.run(&query).await?;
        report(&outcome);
        if !prompt_another().await? {
            break;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn build_agent(cli: &Cli, config: &AppConfig, log: Arc<logging::LogContext>) -> ScreenPilotResult<AgentLoop> {
    let executor: Box<dyn ActionExecutor> = if cli.dry_run {
        Box::new(DryRunExecutor)
    } else {
        Box::new(EnigoExecutor)
    };
    let parts = AgentParts {
        capture: Box::new(PrimaryMonitorCapture),
        provider: Box::new(LlmDecisionProvider::from_config(config)?),
        gate: gate_for(config.safety.permission),
        executor,
        notifier: platform_notifier(),
    };

    let agent = AgentLoop::new(LoopConfig::from_config(&config.agent, &config.screen), parts, log);
    if !config.agent.record_episodes {
        return Ok(agent);
    }
    let dir = config.agent.episodes_dir.clone().unwrap_or_else(default_episodes_dir);
    Ok(agent.with_episodes_dir(dir))
}

/// `None` when the prompt was closed (Ctrl-D / no terminal).
async fn prompt_query() -> ScreenPilotResult<Option<String>> {
    let answer = tokio::task::spawn_blocking(|| {
        dialoguer::Input::<String>::new()
            .with_prompt("Query")
            .allow_empty(true)
            .interact_text()
    })
    .await
    .map_err(|e| ScreenPilotError::Agent(format!("prompt task: {e}")))?;
    match answer {
        Ok(query) => Ok(Some(query)),
        Err(e) => {
            tracing::debug!(error = %e, "query prompt closed");
            Ok(None)
        }
    }
}

async fn prompt_another() -> ScreenPilotResult<bool> {
    let answer = tokio::task::spawn_blocking(|| {
        dialoguer::Confirm::new()
            .with_prompt("Would you like to provide another query?")
            .default(false)
            .interact()
    })
    .await
    .map_err(|e| ScreenPilotError::Agent(format!("prompt task: {e}")))?;
    Ok(answer.unwrap_or(false))
}

fn report(outcome: &EpisodeOutcome) {
    let summary = match &outcome.status {
        TerminalStatus::Completed => "completed".to_string(),
        TerminalStatus::Failed => "failed".to_string(),
        TerminalStatus::BudgetExhausted => "ran out of steps".to_string(),
        TerminalStatus::CaptureError { message } => format!("screen capture error: {message}"),
        TerminalStatus::DecisionError { message } => format!("decision error: {message}"),
        TerminalStatus::DecisionTimeout { after_ms } => format!("no decision within {after_ms} ms"),
        TerminalStatus::ExecutionError { message } => format!("execution error: {message}"),
    };
    println!("Task {summary} after {} step(s).", outcome.steps_taken);
}

/// 0 completed, 1 failed or out of steps, 2 error.
fn exit_status(status: &TerminalStatus) -> u8 {
    match status {
        TerminalStatus::Completed => 0,
        status if status.is_error() => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::parse_from(["screenpilot", "--max-steps", "3", "--permission", "terminal", "--dry-run"]);
        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config).expect("valid overrides");
        assert_eq!(config.agent.max_steps, 3);
        assert_eq!(config.safety.permission, PermissionMode::Terminal);
        assert!(cli.dry_run);
    }

    #[test]
    fn zero_max_steps_is_rejected_up_front() {
        assert!(Cli::try_parse_from(["screenpilot", "--max-steps", "0"]).is_err());

        let cli = Cli::parse_from(["screenpilot"]);
        let mut config = AppConfig::default();
        config.agent.max_steps = 0;
        assert!(matches!(
            cli.apply_overrides(&mut config),
            Err(ScreenPilotError::Config(_))
        ));
    }

    #[test]
    fn error_statuses_exit_with_two() {
        assert_eq!(exit_status(&TerminalStatus::Completed), 0);
        assert_eq!(exit_status(&TerminalStatus::Failed), 1);
        assert_eq!(exit_status(&TerminalStatus::BudgetExhausted), 1);
        assert_eq!(exit_status(&TerminalStatus::CaptureError { message: "x".into() }), 2);
    }
}
