use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::{ActionClass, EpisodeOutcome, TerminalStatus};
use crate::errors::ScreenPilotResult;

/// One line of an episode's JSONL record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Step(StepRecord),
    Outcome {
        ts: i64,
        status: TerminalStatus,
        steps: u32,
        trajectory: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub ts: i64,
    pub step: u32,
    pub class: Option<ActionClass>,
    pub action: Option<String>,
    /// `None` when the gate was never consulted.
    pub approved: Option<bool>,
    /// `None` when nothing was executed.
    pub executed: Option<bool>,
    pub error: Option<String>,
    pub reflection: Option<String>,
    pub plan: Option<String>,
}

impl StepRecord {
    pub fn new(step: u32) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            step,
            class: None,
            action: None,
            approved: None,
            executed: None,
            error: None,
            reflection: None,
            plan: None,
        }
    }
}

/// Appends an episode's steps and outcome to `episode_<id>.jsonl`.
pub struct EpisodeRecorder {
    pub episode_id: String,
    file_path: PathBuf,
}

impl EpisodeRecorder {
    pub fn create(dir: &Path, episode_id: &str) -> ScreenPilotResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            episode_id: episode_id.to_string(),
            file_path: dir.join(format!("episode_{episode_id}.jsonl")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn record_step(&self, record: StepRecord) -> ScreenPilotResult<()> {
        self.append(&HistoryEntry::Step(record))
    }

    pub fn record_outcome(&self, outcome: &EpisodeOutcome) -> ScreenPilotResult<()> {
        self.append(&HistoryEntry::Outcome {
            ts: chrono::Utc::now().timestamp_millis(),
            status: outcome.status.clone(),
            steps: outcome.steps_taken,
            trajectory: outcome.trajectory.clone(),
        })
    }

    fn append(&self, entry: &HistoryEntry) -> ScreenPilotResult<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        tracing::debug!(path = %self.file_path.display(), "history entry flushed");
        Ok(())
    }
}

/// `~/.local/share/screenpilot/episodes` (platform equivalent), falling back to the
/// current working directory.
pub fn default_episodes_dir() -> PathBuf {
    match dirs::data_local_dir() {
        Some(base) => base.join("screenpilot").join("episodes"),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Read back every entry of a recorded episode.
pub fn read_history(path: &Path) -> ScreenPilotResult<Vec<HistoryEntry>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_and_outcome_round_trip_through_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recorder = EpisodeRecorder::create(&dir.path().join("nested"), "abc").expect("create");
        assert!(recorder.path().ends_with("episode_abc.jsonl"));

        let mut step = StepRecord::new(1);
        step.class = Some(ActionClass::Execute);
        step.action = Some("click(1, 2)".into());
        step.approved = Some(false);
        recorder.record_step(step).expect("step");
        recorder
            .record_outcome(&EpisodeOutcome {
                episode_id: "abc".into(),
                status: TerminalStatus::BudgetExhausted,
                steps_taken: 1,
                trajectory: "Task:\nx".into(),
            })
            .expect("outcome");

        let entries = read_history(recorder.path()).expect("read");
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            HistoryEntry::Step(step) => {
                assert_eq!(step.step, 1);
                assert_eq!(step.approved, Some(false));
                assert_eq!(step.executed, None);
            }
            other => panic!("expected step, got {other:?}"),
        }
        match &entries[1] {
            HistoryEntry::Outcome { status, steps, .. } => {
                assert_eq!(*status, TerminalStatus::BudgetExhausted);
                assert_eq!(*steps, 1);
            }
            other => panic!("expected outcome, got {other:?}"),
        }
    }
}
