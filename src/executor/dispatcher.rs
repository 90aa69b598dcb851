use async_trait::async_trait;

use crate::errors::ScreenPilotResult;
use crate::executor::action::Action;

/// Runs one approved action against the live environment.
///
/// Called at most once per approval; implementations must not re-interpret or
/// sandbox the action, only perform it and report whether it failed.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> ScreenPilotResult<()>;
}

/// Logs the action instead of dispatching input events.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutor;

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(&self, action: &Action) -> ScreenPilotResult<()> {
        tracing::info!(action = %action, description = %action.describe(), "dry run: action not dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_always_succeeds() {
        let action = Action::parse("type(\"hello\")").expect("parse");
        DryRunExecutor.execute(&action).await.expect("dry run");
    }
}
