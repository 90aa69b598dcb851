//! Scripted stand-ins for every collaborator of [`AgentLoop`](crate::agent_engine::engine::AgentLoop).
//!
//! Each fake is `Clone` and shares its call log, so a test keeps one handle for
//! assertions and boxes the other into [`AgentParts`](crate::agent_engine::engine::AgentParts).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::agent_engine::decision::{Decision, DecisionProvider};
use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::executor::action::Action;
use crate::executor::dispatcher::ActionExecutor;
use crate::executor::safety::PermissionGate;
use crate::perception::screenshot::ScreenCapture;
use crate::perception::types::{Observation, Screenshot};
use crate::platform::notify::Notifier;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Decision with a single action and no reflection.
pub fn decision(action: &str) -> Decision {
    Decision {
        actions: vec![action.to_string()],
        reflection: None,
        executor_plan: None,
    }
}

/// Decision carrying a full trajectory block.
pub fn decision_with(action: &str, reflection: &str, plan: &str) -> Decision {
    Decision {
        actions: vec![action.to_string()],
        reflection: Some(reflection.to_string()),
        executor_plan: Some(plan.to_string()),
    }
}

// ── Decision provider ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Reply {
    Decide(Decision),
    Fail(String),
    /// Answer only after the given delay.
    Slow(Duration, Decision),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictCall {
    pub instruction: String,
    pub context: String,
    pub image_width: u32,
    pub image_height: u32,
}

#[derive(Default)]
struct ProviderState {
    script: VecDeque<Reply>,
    fallback: Option<Reply>,
    calls: Vec<PredictCall>,
    resets: usize,
}

/// Replies from a script, then from the fallback (if any), then with an error.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl ScriptedProvider {
    pub fn new(script: impl IntoIterator<Item = Reply>) -> Self {
        let provider = Self::default();
        lock(&provider.state).script = script.into_iter().collect();
        provider
    }

    /// Shorthand for a script of plain decisions.
    pub fn deciding(actions: &[&str]) -> Self {
        Self::new(actions.iter().map(|a| Reply::Decide(decision(a))))
    }

    pub fn with_fallback(self, reply: Reply) -> Self {
        lock(&self.state).fallback = Some(reply);
        self
    }

    /// Append replies for a later episode.
    pub fn push(&self, reply: Reply) {
        lock(&self.state).script.push_back(reply);
    }

    pub fn calls(&self) -> Vec<PredictCall> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }

    pub fn resets(&self) -> usize {
        lock(&self.state).resets
    }
}

#[async_trait]
impl DecisionProvider for ScriptedProvider {
    async fn predict(
        &self,
        instruction: &str,
        observation: &Observation,
        context: &str,
    ) -> ScreenPilotResult<Decision> {
        let reply = {
            let mut state = lock(&self.state);
            state.calls.push(PredictCall {
                instruction: instruction.to_string(),
                context: context.to_string(),
                image_width: observation.meta.image_width,
                image_height: observation.meta.image_height,
            });
            let next = state.script.pop_front();
            next.or_else(|| state.fallback.clone())
        };
        match reply {
            Some(Reply::Decide(decision)) => Ok(decision),
            Some(Reply::Fail(message)) => Err(ScreenPilotError::Decision(message)),
            Some(Reply::Slow(delay, decision)) => {
                tokio::time::sleep(delay).await;
                Ok(decision)
            }
            None => Err(ScreenPilotError::Decision("script exhausted".into())),
        }
    }

    fn reset(&mut self) {
        lock(&self.state).resets += 1;
    }
}

// ── Screen capture ───────────────────────────────────────────────────────────

/// Returns a blank frame of a fixed size, or fails every time.
#[derive(Clone)]
pub struct StaticCapture {
    width: u32,
    height: u32,
    failure: Option<String>,
    captures: Arc<Mutex<usize>>,
}

impl StaticCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            failure: None,
            captures: Arc::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(1, 1)
        }
    }

    pub fn captures(&self) -> usize {
        *lock(&self.captures)
    }
}

#[async_trait]
impl ScreenCapture for StaticCapture {
    async fn capture(&self) -> ScreenPilotResult<Screenshot> {
        *lock(&self.captures) += 1;
        if let Some(message) = &self.failure {
            return Err(ScreenPilotError::Capture(message.clone()));
        }
        Ok(Screenshot {
            rgba: vec![255; (self.width * self.height * 4) as usize],
            width: self.width,
            height: self.height,
            accessibility_tree: None,
        })
    }
}

// ── Permission gate ──────────────────────────────────────────────────────────

/// Answers from a script, then with `default`. Records every request.
#[derive(Clone)]
pub struct ScriptedGate {
    answers: Arc<Mutex<VecDeque<bool>>>,
    default: bool,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedGate {
    pub fn new(answers: impl IntoIterator<Item = bool>, default: bool) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().collect())),
            default,
            requests: Arc::default(),
        }
    }

    pub fn approving() -> Self {
        Self::new([], true)
    }

    pub fn denying() -> Self {
        Self::new([], false)
    }

    /// `(action_code, action_description)` per request, in order.
    pub fn requests(&self) -> Vec<(String, String)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PermissionGate for ScriptedGate {
    async fn approve(&self, action_code: &str, action_description: &str) -> bool {
        lock(&self.requests).push((action_code.to_string(), action_description.to_string()));
        lock(&self.answers).pop_front().unwrap_or(self.default)
    }
}

// ── Executor ─────────────────────────────────────────────────────────────────

/// Records every attempted action; fails the first `failures` attempts.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    attempts: Arc<Mutex<Vec<Action>>>,
    failures: Arc<Mutex<usize>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_times(n: usize) -> Self {
        let executor = Self::default();
        *lock(&executor.failures) = n;
        executor
    }

    pub fn always_failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    pub fn attempts(&self) -> Vec<Action> {
        lock(&self.attempts).clone()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, action: &Action) -> ScreenPilotResult<()> {
        lock(&self.attempts).push(action.clone());
        let mut failures = lock(&self.failures);
        if *failures > 0 {
            *failures -= 1;
            return Err(ScreenPilotError::Executor(format!("injected failure for {action}")));
        }
        Ok(())
    }
}

// ── Notifier ─────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }
}
