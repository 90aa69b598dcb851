use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ScreenPilotResult;
use crate::perception::types::Observation;

/// One step's output from the model pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Proposed action codes, in order. Only the first one drives the step.
    pub actions: Vec<String>,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub executor_plan: Option<String>,
}

impl Decision {
    pub fn first_action(&self) -> Option<&str> {
        self.actions.first().map(String::as_str)
    }

    /// Both halves of a trajectory block, when the decision carries them.
    pub fn reflection_and_plan(&self) -> Option<(&str, &str)> {
        match (&self.reflection, &self.executor_plan) {
            (Some(reflection), Some(plan)) => Some((reflection, plan)),
            _ => None,
        }
    }
}

/// The model pipeline (planning, reflection and grounding) behind the loop.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn predict(
        &self,
        instruction: &str,
        observation: &Observation,
        context: &str,
    ) -> ScreenPilotResult<Decision>;

    /// Drop any per-episode state before a new episode.
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_actions_is_malformed() {
        let parsed = serde_json::from_str::<Decision>(r#"{"reflection": "r"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn reflection_and_plan_requires_both() {
        let mut decision: Decision =
            serde_json::from_str(r#"{"actions": ["click(1, 2)"], "reflection": "ok"}"#).expect("parse");
        assert_eq!(decision.first_action(), Some("click(1, 2)"));
        assert_eq!(decision.reflection_and_plan(), None);

        decision.executor_plan = Some("click the button".into());
        assert_eq!(decision.reflection_and_plan(), Some(("ok", "click the button")));
    }
}
