//! Process-wide logging context.
//!
//! `init` installs the subscriber once per process run and returns a [`LogContext`]
//! that owns the file-sink guards. The context is handed to the agent loop, which
//! opens one `episode` span per run under the context's root span. Dropping the
//! context flushes the file sinks.

use std::path::Path;

use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::errors::{ScreenPilotError, ScreenPilotResult};

pub struct LogContext {
    run_id: String,
    root: Span,
    _guards: Vec<WorkerGuard>,
}

impl LogContext {
    /// A context with no subscriber and no sinks. Spans are created but go nowhere
    /// unless the caller installed a subscriber itself.
    pub fn disabled() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            root: Span::none(),
            _guards: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Child span for one episode of the agent loop.
    pub fn episode_span(&self, episode_id: &str, instruction: &str) -> Span {
        tracing::info_span!(
            parent: &self.root,
            "episode",
            id = %episode_id,
            instruction = %instruction
        )
    }
}

/// Install the global subscriber: stderr always, plus `normal-<ts>.log` (INFO) and
/// `debug-<ts>.log` (DEBUG) when `log_dir` is configured.
pub fn init(config: &LoggingConfig) -> ScreenPilotResult<LogContext> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ScreenPilotError::Config(format!("invalid log level '{}': {e}", config.level)))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter);

    let mut guards = Vec::new();
    let mut file_layers = Vec::new();
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d@%H%M%S").to_string();
        for (prefix, level) in [("normal", LevelFilter::INFO), ("debug", LevelFilter::DEBUG)] {
            let (writer, guard) = file_sink(dir, &format!("{prefix}-{stamp}.log"));
            guards.push(guard);
            file_layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(level)
                    .boxed(),
            );
        }
    }

    Registry::default()
        .with(file_layers)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| ScreenPilotError::Config(format!("logging already initialised: {e}")))?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let root = tracing::info_span!("screenpilot", run = %run_id);
    if let Some(dir) = &config.log_dir {
        tracing::info!(dir = %dir.display(), run = %run_id, "file logging enabled");
    }
    Ok(LogContext {
        run_id,
        root,
        _guards: guards,
    })
}

fn file_sink(dir: &Path, file_name: &str) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let appender = tracing_appender::rolling::never(dir, file_name);
    tracing_appender::non_blocking(appender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_context_has_unique_run_ids() {
        let a = LogContext::disabled();
        let b = LogContext::disabled();
        assert_ne!(a.run_id(), b.run_id());
        assert!(!a.run_id().is_empty());
    }
}
