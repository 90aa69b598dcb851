use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::agent_engine::decision::{Decision, DecisionProvider};
use crate::agent_engine::history::{EpisodeRecorder, StepRecord};
use crate::agent_engine::loop_control::StepBudget;
use crate::agent_engine::state::{ActionClass, EpisodeOutcome, LoopConfig, TerminalStatus};
use crate::agent_engine::trajectory::Trajectory;
use crate::config::ExecutionErrorPolicy;
use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::executor::action::Action;
use crate::executor::dispatcher::ActionExecutor;
use crate::executor::safety::PermissionGate;
use crate::logging::LogContext;
use crate::perception::scaling::prepare_observation;
use crate::perception::screenshot::ScreenCapture;
use crate::perception::types::Observation;
use crate::platform::notify::Notifier;

/// External capabilities the loop drives.
pub struct AgentParts {
    pub capture: Box<dyn ScreenCapture>,
    pub provider: Box<dyn DecisionProvider>,
    pub gate: Box<dyn PermissionGate>,
    pub executor: Box<dyn ActionExecutor>,
    pub notifier: Box<dyn Notifier>,
}

enum StepFlow {
    Continue,
    Stop(TerminalStatus),
}

/// Observe → decide → classify → gate → execute, one step at a time, until the
/// episode reaches a terminal classification, an error, or its step budget.
///
/// One instance runs one episode at a time; concurrent episodes need separate loops.
pub struct AgentLoop {
    config: LoopConfig,
    parts: AgentParts,
    log: Arc<LogContext>,
    episodes_dir: Option<PathBuf>,

    // ── Episode state (cleared by `reset`) ────────────────────────────────
    trajectory: Trajectory,
    budget: StepBudget,
    recorder: Option<EpisodeRecorder>,
}

impl AgentLoop {
    pub fn new(config: LoopConfig, parts: AgentParts, log: Arc<LogContext>) -> Self {
        let budget = StepBudget::new(config.max_steps);
        Self {
            config,
            parts,
            log,
            episodes_dir: None,
            trajectory: Trajectory::default(),
            budget,
            recorder: None,
        }
    }

    /// Record every episode as JSONL under `dir`.
    pub fn with_episodes_dir(mut self, dir: PathBuf) -> Self {
        self.episodes_dir = Some(dir);
        self
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn budget(&self) -> &StepBudget {
        &self.budget
    }

    /// Forget the previous episode: empty trajectory, full budget, fresh provider.
    pub fn reset(&mut self) {
        self.trajectory = Trajectory::default();
        self.budget = StepBudget::new(self.config.max_steps);
        self.recorder = None;
        self.parts.provider.reset();
    }

    /// Run one episode with the configured step budget.
    pub async fn run(&mut self, instruction: &str) -> ScreenPilotResult<EpisodeOutcome> {
        let max_steps = self.config.max_steps;
        self.run_with_budget(instruction, max_steps).await
    }

    /// Run one episode. Only invalid input is an `Err`; every episode-level failure is
    /// reported through the outcome's status.
    pub async fn run_with_budget(
        &mut self,
        instruction: &str,
        max_steps: u32,
    ) -> ScreenPilotResult<EpisodeOutcome> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(ScreenPilotError::Agent("instruction must not be empty".into()));
        }
        if max_steps == 0 {
            return Err(ScreenPilotError::Agent("max_steps must be at least 1".into()));
        }

        self.reset();
        self.trajectory = Trajectory::new(instruction);
        self.budget = StepBudget::new(max_steps);
        let episode_id = uuid::Uuid::new_v4().to_string();
        self.recorder = self.open_recorder(&episode_id);

        let span = self.log.episode_span(&episode_id, instruction);
        let status = self.drive(instruction).instrument(span.clone()).await;

        let outcome = EpisodeOutcome {
            episode_id,
            status,
            steps_taken: self.budget.used(),
            trajectory: self.trajectory.as_str().to_owned(),
        };
        span.in_scope(|| {
            tracing::info!(
                status = ?outcome.status,
                steps = outcome.steps_taken,
                blocks = self.trajectory.blocks(),
                "episode finished"
            );
        });
        if let Some(recorder) = &self.recorder {
            if let Err(e) = recorder.record_outcome(&outcome) {
                tracing::warn!(error = %e, "could not record episode outcome");
            }
        }
        Ok(outcome)
    }

    fn open_recorder(&self, episode_id: &str) -> Option<EpisodeRecorder> {
        let dir = self.episodes_dir.as_ref()?;
        match EpisodeRecorder::create(dir, episode_id) {
            Ok(recorder) => {
                tracing::debug!(path = %recorder.path().display(), "recording episode");
                Some(recorder)
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "episode recording disabled");
                None
            }
        }
    }

    async fn drive(&mut self, instruction: &str) -> TerminalStatus {
        while self.budget.try_consume() {
            let step = self.budget.used();
            if let StepFlow::Stop(status) = self.step(instruction, step).await {
                return status;
            }
        }
        tracing::warn!(max_steps = self.budget.max_steps(), "step budget exhausted");
        TerminalStatus::BudgetExhausted
    }

    async fn step(&mut self, instruction: &str, step: u32) -> StepFlow {
        let observation = match self.observe().await {
            Ok(observation) => observation,
            Err(e) => {
                tracing::error!(step, error = %e, "screen capture failed");
                let mut record = StepRecord::new(step);
                record.error = Some(e.to_string());
                self.record(record);
                return StepFlow::Stop(TerminalStatus::CaptureError { message: e.to_string() });
            }
        };

        let decision = match self.decide(instruction, &observation).await {
            Ok(decision) => decision,
            Err(status) => {
                tracing::error!(step, status = ?status, "decision provider failed");
                let mut record = StepRecord::new(step);
                record.error = Some(format!("{status:?}"));
                self.record(record);
                return StepFlow::Stop(status);
            }
        };
        drop(observation);

        let Some(code) = decision.first_action() else {
            tracing::error!(step, "decision carried no actions");
            return StepFlow::Stop(TerminalStatus::DecisionError {
                message: "decision carried no actions".into(),
            });
        };
        let class = ActionClass::classify(code);
        tracing::info!(step, class = ?class, action = code, "decision received");

        let mut record = StepRecord::new(step);
        record.class = Some(class);
        record.action = Some(code.to_string());
        record.reflection = decision.reflection.clone();
        record.plan = decision.executor_plan.clone();

        match class {
            class if class.is_terminal() => {
                let status = if class == ActionClass::Done {
                    TerminalStatus::Completed
                } else {
                    TerminalStatus::Failed
                };
                self.record(record);
                if let Some(notice) = status.notice() {
                    self.parts.notifier.notify(notice);
                }
                StepFlow::Stop(status)
            }
            ActionClass::Next => {
                self.record(record);
                StepFlow::Continue
            }
            ActionClass::Wait => {
                self.record(record);
                tracing::info!(step, delay_ms = self.config.wait_delay.as_millis() as u64, "waiting");
                tokio::time::sleep(self.config.wait_delay).await;
                StepFlow::Continue
            }
            _ => self.execute_step(step, code, &decision, record).await,
        }
    }

    async fn observe(&self) -> ScreenPilotResult<Observation> {
        let shot = self.parts.capture.capture().await?;
        let max_dim = self.config.max_dim;
        tokio::task::spawn_blocking(move || prepare_observation(shot, max_dim))
            .await
            .map_err(|e| ScreenPilotError::Capture(format!("join: {e}")))?
    }

    async fn decide(&self, instruction: &str, observation: &Observation) -> Result<Decision, TerminalStatus> {
        let predict = self
            .parts
            .provider
            .predict(instruction, observation, self.trajectory.as_str());
        let result = match self.config.decision_timeout {
            Some(limit) => match tokio::time::timeout(limit, predict).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(TerminalStatus::DecisionTimeout {
                        after_ms: duration_ms(limit),
                    })
                }
            },
            None => predict.await,
        };
        result.map_err(|e| TerminalStatus::DecisionError { message: e.to_string() })
    }

    async fn execute_step(
        &mut self,
        step: u32,
        code: &str,
        decision: &Decision,
        mut record: StepRecord,
    ) -> StepFlow {
        let action = match Action::parse(code) {
            Ok(action) => action,
            Err(e) => {
                tracing::error!(step, action = code, error = %e, "action code rejected");
                record.error = Some(e.to_string());
                self.record(record);
                return StepFlow::Stop(TerminalStatus::DecisionError { message: e.to_string() });
            }
        };

        // Let dialogs and animations from the previous step settle.
        tokio::time::sleep(self.config.pre_action_delay).await;

        let approved = self.parts.gate.approve(code, &action.describe()).await;
        record.approved = Some(approved);
        if !approved {
            tracing::info!(step, action = code, "permission denied; action skipped");
            self.record(record);
            return StepFlow::Continue;
        }

        tracing::info!(step, action = %action, "executing");
        let result = self.execute_with_policy(&action).await;
        tokio::time::sleep(self.config.post_action_delay).await;

        match result {
            Ok(()) => {
                record.executed = Some(true);
                if let Some((reflection, plan)) = decision.reflection_and_plan() {
                    self.trajectory.append(reflection, plan);
                }
                self.record(record);
                StepFlow::Continue
            }
            Err(e) => {
                record.executed = Some(false);
                record.error = Some(e.to_string());
                self.record(record);
                match self.config.on_execution_error {
                    ExecutionErrorPolicy::Continue => {
                        tracing::warn!(step, error = %e, "action failed; requesting a fresh decision");
                        StepFlow::Continue
                    }
                    ExecutionErrorPolicy::Abort | ExecutionErrorPolicy::Retry => {
                        tracing::error!(step, error = %e, "action failed; aborting episode");
                        StepFlow::Stop(TerminalStatus::ExecutionError { message: e.to_string() })
                    }
                }
            }
        }
    }

    async fn execute_with_policy(&self, action: &Action) -> ScreenPilotResult<()> {
        let retries = match self.config.on_execution_error {
            ExecutionErrorPolicy::Retry => self.config.max_execution_retries,
            _ => 0,
        };
        let mut attempt = 0;
        loop {
            match self.parts.executor.execute(action).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < retries => {
                    attempt += 1;
                    tracing::warn!(attempt, retries, error = %e, "action failed; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn record(&self, record: StepRecord) {
        if let Some(recorder) = &self.recorder {
            if let Err(e) = recorder.record_step(record) {
                tracing::warn!(error = %e, "could not record step");
            }
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
