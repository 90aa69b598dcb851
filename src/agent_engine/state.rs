use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{AgentConfig, ExecutionErrorPolicy, ScreenConfig};

/// What the loop does with a decision, derived from its first action string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    Done,
    Fail,
    Wait,
    Next,
    Execute,
}

impl ActionClass {
    /// Case-insensitive substring match, first hit wins: fail, done, next, wait.
    ///
    /// A string naming both "fail" and "done" is treated as a failure.
    pub fn classify(action_code: &str) -> ActionClass {
        let lower = action_code.to_lowercase();
        if lower.contains("fail") {
            ActionClass::Fail
        } else if lower.contains("done") {
            ActionClass::Done
        } else if lower.contains("next") {
            ActionClass::Next
        } else if lower.contains("wait") {
            ActionClass::Wait
        } else {
            ActionClass::Execute
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ActionClass::Done | ActionClass::Fail)
    }
}

/// How an episode ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalStatus {
    Completed,
    Failed,
    BudgetExhausted,
    CaptureError { message: String },
    DecisionError { message: String },
    DecisionTimeout { after_ms: u64 },
    ExecutionError { message: String },
}

impl TerminalStatus {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TerminalStatus::CaptureError { .. }
                | TerminalStatus::DecisionError { .. }
                | TerminalStatus::DecisionTimeout { .. }
                | TerminalStatus::ExecutionError { .. }
        )
    }

    /// Text for the end-user acknowledgement, for terminal classifications only.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            TerminalStatus::Completed => Some("Task Completed"),
            TerminalStatus::Failed => Some("Task Failed"),
            _ => None,
        }
    }
}

/// Result of one `AgentLoop::run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub episode_id: String,
    pub status: TerminalStatus,
    pub steps_taken: u32,
    pub trajectory: String,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_steps: u32,
    pub pre_action_delay: Duration,
    pub post_action_delay: Duration,
    pub wait_delay: Duration,
    /// `None` waits for the decision provider indefinitely.
    pub decision_timeout: Option<Duration>,
    pub on_execution_error: ExecutionErrorPolicy,
    pub max_execution_retries: u32,
    pub max_dim: u32,
}

impl LoopConfig {
    pub fn from_config(agent: &AgentConfig, screen: &ScreenConfig) -> Self {
        Self {
            max_steps: agent.max_steps,
            pre_action_delay: Duration::from_millis(agent.pre_action_delay_ms),
            post_action_delay: Duration::from_millis(agent.post_action_delay_ms),
            wait_delay: Duration::from_millis(agent.wait_delay_ms),
            decision_timeout: match agent.decision_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            on_execution_error: agent.on_execution_error,
            max_execution_retries: agent.max_execution_retries,
            max_dim: screen.max_dim,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default(), &ScreenConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_words_win_over_everything() {
        assert_eq!(ActionClass::classify("DONE"), ActionClass::Done);
        assert_eq!(ActionClass::classify("agent.fail()"), ActionClass::Fail);
        assert_eq!(ActionClass::classify("wait then next, then done"), ActionClass::Done);
        assert_eq!(ActionClass::classify("Fail: done is impossible"), ActionClass::Fail);
    }

    #[test]
    fn next_precedes_wait() {
        assert_eq!(ActionClass::classify("NEXT"), ActionClass::Next);
        assert_eq!(ActionClass::classify("wait for the next frame"), ActionClass::Next);
        assert_eq!(ActionClass::classify("Wait"), ActionClass::Wait);
    }

    #[test]
    fn everything_else_executes() {
        assert_eq!(ActionClass::classify("click(10, 20)"), ActionClass::Execute);
        assert_eq!(ActionClass::classify("hotkey(\"ctrl\", \"s\")"), ActionClass::Execute);
        assert!(!ActionClass::Execute.is_terminal());
        assert!(ActionClass::Fail.is_terminal());
    }

    #[test]
    fn notices_only_for_terminal_classes() {
        assert_eq!(TerminalStatus::Completed.notice(), Some("Task Completed"));
        assert_eq!(TerminalStatus::Failed.notice(), Some("Task Failed"));
        assert_eq!(TerminalStatus::BudgetExhausted.notice(), None);
        assert!(TerminalStatus::DecisionTimeout { after_ms: 1 }.is_error());
        assert!(!TerminalStatus::BudgetExhausted.is_error());
    }

    #[test]
    fn loop_config_mirrors_agent_config() {
        let cfg = LoopConfig::default();
        assert_eq!(cfg.max_steps, 15);
        assert_eq!(cfg.wait_delay, Duration::from_secs(5));
        assert_eq!(cfg.pre_action_delay, Duration::from_secs(1));
        assert_eq!(cfg.decision_timeout, Some(Duration::from_secs(120)));
        assert_eq!(cfg.max_dim, 2400);

        let agent = AgentConfig {
            decision_timeout_secs: 0,
            ..AgentConfig::default()
        };
        assert_eq!(LoopConfig::from_config(&agent, &ScreenConfig::default()).decision_timeout, None);
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_value(TerminalStatus::ExecutionError { message: "boom".into() })
            .expect("serialize");
        assert_eq!(json, serde_json::json!({"status": "execution_error", "message": "boom"}));
    }
}
