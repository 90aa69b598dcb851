use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ScreenPilotError, ScreenPilotResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

impl LlmConfig {
    /// The entry named by `active_provider`, or the only configured entry.
    pub fn active_entry(&self) -> ScreenPilotResult<(&str, &ProviderEntry)> {
        if let Some((id, entry)) = self.providers.get_key_value(&self.active_provider) {
            return Ok((id.as_str(), entry));
        }
        if self.active_provider.is_empty() && self.providers.len() == 1 {
            if let Some((id, entry)) = self.providers.iter().next() {
                return Ok((id.as_str(), entry));
            }
        }
        Err(ScreenPilotError::Config(format!(
            "active provider '{}' not found under [llm.providers]",
            self.active_provider
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Use SSE streaming for the chat call.
    #[serde(default)]
    pub stream: bool,
    /// Optional API key stored in config.toml (env var SCREENPILOT_<ID>_API_KEY wins).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderEntry {
    pub fn resolve_api_key(&self, id: &str) -> String {
        std::env::var(format!("SCREENPILOT_{}_API_KEY", id.to_uppercase()))
            .unwrap_or_else(|_| self.api_key.clone().unwrap_or_default())
    }
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorPolicy {
    /// End the episode with `ExecutionError`.
    Abort,
    /// Re-run the same approved action, then abort once retries are spent.
    Retry,
    /// Record the failure and ask for a fresh decision on the next step.
    #[default]
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_action_delay_ms")]
    pub pre_action_delay_ms: u64,
    #[serde(default = "default_action_delay_ms")]
    pub post_action_delay_ms: u64,
    #[serde(default = "default_wait_delay_ms")]
    pub wait_delay_ms: u64,
    #[serde(default = "default_decision_timeout_secs")]
    pub decision_timeout_secs: u64,
    #[serde(default)]
    pub on_execution_error: ExecutionErrorPolicy,
    #[serde(default = "default_max_execution_retries")]
    pub max_execution_retries: u32,
    /// Upper bound on the trajectory text sent to the model. 0 = unbounded.
    #[serde(default)]
    pub context_char_limit: usize,
    #[serde(default = "default_true")]
    pub record_episodes: bool,
    #[serde(default)]
    pub episodes_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            pre_action_delay_ms: default_action_delay_ms(),
            post_action_delay_ms: default_action_delay_ms(),
            wait_delay_ms: default_wait_delay_ms(),
            decision_timeout_secs: default_decision_timeout_secs(),
            on_execution_error: ExecutionErrorPolicy::default(),
            max_execution_retries: default_max_execution_retries(),
            context_char_limit: 0,
            record_episodes: true,
            episodes_dir: None,
        }
    }
}

fn default_max_steps() -> u32 {
    15
}

fn default_action_delay_ms() -> u64 {
    1000
}

fn default_wait_delay_ms() -> u64 {
    5000
}

fn default_decision_timeout_secs() -> u64 {
    120
}

fn default_max_execution_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Screenshots are downscaled so neither side exceeds this many pixels.
    #[serde(default = "default_max_dim")]
    pub max_dim: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            max_dim: default_max_dim(),
        }
    }
}

fn default_max_dim() -> u32 {
    2400
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Native confirmation dialog (zenity / osascript).
    #[default]
    Dialog,
    /// Yes/no prompt on the controlling terminal.
    Terminal,
    /// Approve everything. Every approval is still logged at WARN.
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SafetyConfig {
    #[serde(default)]
    pub permission: PermissionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for `normal-*.log` / `debug-*.log`. Unset = stderr only.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line.
    Explicit(PathBuf),
    /// First `config.toml` found in the search path.
    Discovered(PathBuf),
    /// Nothing found; built-in defaults.
    Defaults,
}

impl ConfigSource {
    /// Report the resolution. Called once the subscriber is installed, since the
    /// logging configuration itself comes from the loaded file.
    pub fn log(&self, config: &AppConfig) {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Discovered(path) => tracing::info!(
                path = %path.display(),
                explicit = matches!(self, ConfigSource::Explicit(_)),
                provider = %config.llm.active_provider,
                max_steps = config.agent.max_steps,
                "config loaded"
            ),
            ConfigSource::Defaults => tracing::warn!("no config.toml found; using built-in defaults"),
        }
    }
}

/// Next to the executable, then the working directory, then the user config dir.
fn resolve_config_path() -> Option<PathBuf> {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")));
    let in_cwd = std::env::current_dir().ok().map(|cwd| cwd.join("config.toml"));
    let in_user_dir = dirs::config_dir().map(|dir| dir.join("screenpilot").join("config.toml"));

    [beside_exe, in_cwd, in_user_dir]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.exists())
}

impl AppConfig {
    /// Reject values the agent loop cannot run with.
    pub fn validate(&self) -> ScreenPilotResult<()> {
        if self.agent.max_steps == 0 {
            return Err(ScreenPilotError::Config("agent.max_steps must be at least 1".into()));
        }
        if self.screen.max_dim == 0 {
            return Err(ScreenPilotError::Config("screen.max_dim must be at least 1".into()));
        }
        Ok(())
    }
}

pub fn load_config_from(path: &Path) -> ScreenPilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load `explicit` if given (it must exist), otherwise the first config.toml found
/// by `resolve_config_path`, otherwise built-in defaults.
///
/// Nothing is logged here; pass the returned [`ConfigSource`] to
/// [`ConfigSource::log`] after logging is initialised.
pub fn load_config(explicit: Option<&Path>) -> ScreenPilotResult<(AppConfig, ConfigSource)> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ScreenPilotError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        return Ok((load_config_from(path)?, ConfigSource::Explicit(path.to_path_buf())));
    }
    match resolve_config_path() {
        Some(path) => Ok((load_config_from(&path)?, ConfigSource::Discovered(path))),
        None => Ok((AppConfig::default(), ConfigSource::Defaults)),
    }
}

pub fn save_config(config: &AppConfig, path: &Path) -> ScreenPilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: AppConfig = toml::from_str("").expect("parse");
        assert_eq!(config.agent.max_steps, 15);
        assert_eq!(config.agent.wait_delay_ms, 5000);
        assert_eq!(config.agent.on_execution_error, ExecutionErrorPolicy::Continue);
        assert_eq!(config.screen.max_dim, 2400);
        assert_eq!(config.safety.permission, PermissionMode::Dialog);
        assert!(config.logging.log_dir.is_none());
    }

    #[test]
    fn parses_provider_and_policies() {
        let config: AppConfig = toml::from_str(
            r#"
            [llm]
            active_provider = "local"
            [llm.providers.local]
            display_name = "Local"
            api_base = "http://127.0.0.1:8000/v1/chat/completions"
            model = "ui-tars"
            stream = true

            [agent]
            max_steps = 4
            on_execution_error = "retry"
            max_execution_retries = 2

            [safety]
            permission = "terminal"
            "#,
        )
        .expect("parse");

        let (id, entry) = config.llm.active_entry().expect("active entry");
        assert_eq!(id, "local");
        assert_eq!(entry.model, "ui-tars");
        assert!(entry.stream);
        assert!((entry.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.agent.max_steps, 4);
        assert_eq!(config.agent.on_execution_error, ExecutionErrorPolicy::Retry);
        assert_eq!(config.safety.permission, PermissionMode::Terminal);
    }

    #[test]
    fn missing_active_provider_is_a_config_error() {
        let config = AppConfig::default();
        assert!(matches!(
            config.llm.active_entry(),
            Err(ScreenPilotError::Config(_))
        ));
    }

    #[test]
    fn explicit_missing_path_is_rejected() {
        let err = load_config(Some(Path::new("/definitely/not/here/config.toml")))
            .expect_err("missing file");
        assert!(matches!(err, ScreenPilotError::Config(_)));
    }

    #[test]
    fn save_then_load_keeps_agent_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.agent.max_steps = 7;
        config.safety.permission = PermissionMode::Auto;
        save_config(&config, &path).expect("save");

        let (loaded, source) = load_config(Some(&path)).expect("load");
        assert_eq!(loaded.agent.max_steps, 7);
        assert_eq!(loaded.safety.permission, PermissionMode::Auto);
        assert_eq!(source, ConfigSource::Explicit(path));
    }

    #[test]
    fn zero_step_budget_is_rejected_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_steps = 0\n").expect("write");

        let err = load_config(Some(&path)).expect_err("zero budget");
        assert!(matches!(err, ScreenPilotError::Config(ref msg) if msg.contains("max_steps")));
        assert!(AppConfig::default().validate().is_ok());
    }
}
