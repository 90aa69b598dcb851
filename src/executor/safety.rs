// Human-in-the-loop permission gate.
use async_trait::async_trait;

use crate::config::PermissionMode;
use crate::platform::dialog::{confirm_dialog, PERMISSION_TITLE};
use crate::platform::Platform;

/// Decides whether one proposed action may run.
///
/// Returns `true` only on an explicit affirmative answer. Dismissal, a failure to
/// show the prompt, or any other answer is a denial. Asking must never execute.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn approve(&self, action_code: &str, action_description: &str) -> bool;
}

fn permission_text(action_code: &str, action_description: &str) -> String {
    format!(
        "Do you want to execute this action?\n\n{action_code}\n\nwhich will try to {action_description}"
    )
}

/// Native confirmation dialog.
#[derive(Debug, Clone, Copy)]
pub struct DialogGate {
    platform: Platform,
}

impl DialogGate {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl PermissionGate for DialogGate {
    async fn approve(&self, action_code: &str, action_description: &str) -> bool {
        let text = permission_text(action_code, action_description);
        let Some(dialog) = confirm_dialog(self.platform, PERMISSION_TITLE, &text) else {
            tracing::warn!(platform = ?self.platform, "no permission dialog on this platform; denying");
            return false;
        };
        match dialog.to_command().status().await {
            Ok(status) => {
                let approved = status.success();
                tracing::info!(approved, code = ?status.code(), "permission dialog answered");
                approved
            }
            Err(e) => {
                tracing::warn!(program = dialog.program, error = %e, "permission dialog failed to launch; denying");
                false
            }
        }
    }
}

/// Yes/no prompt on the controlling terminal. Defaults to "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalGate;

#[async_trait]
impl PermissionGate for TerminalGate {
    async fn approve(&self, action_code: &str, action_description: &str) -> bool {
        let prompt = permission_text(action_code, action_description);
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;
        match answer {
            Ok(Ok(approved)) => {
                tracing::info!(approved, "terminal permission answered");
                approved
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "terminal prompt failed; denying");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "terminal prompt task failed; denying");
                false
            }
        }
    }
}

/// Approves everything. Only reachable through explicit `permission = "auto"`, and
/// every approval is logged at WARN.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApproveGate;

#[async_trait]
impl PermissionGate for AutoApproveGate {
    async fn approve(&self, action_code: &str, action_description: &str) -> bool {
        tracing::warn!(code = action_code, description = action_description, "auto-approved action");
        true
    }
}

/// Build the gate selected in config for the running platform.
pub fn gate_for(mode: PermissionMode) -> Box<dyn PermissionGate> {
    match mode {
        PermissionMode::Dialog => Box::new(DialogGate::new(Platform::current())),
        PermissionMode::Terminal => Box::new(TerminalGate),
        PermissionMode::Auto => Box::new(AutoApproveGate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dialog_gate_denies_where_no_dialog_exists() {
        let gate = DialogGate::new(Platform::Other);
        assert!(!gate.approve("click(1, 2)", "left click at (1, 2)").await);
    }

    #[tokio::test]
    async fn auto_gate_approves() {
        assert!(AutoApproveGate.approve("scroll(0, 1)", "scroll down by 1").await);
    }

    #[test]
    fn permission_text_shows_code_and_description() {
        let text = permission_text("hotkey(\"ctrl\", \"s\")", "press ctrl+s");
        assert!(text.starts_with("Do you want to execute this action?"));
        assert!(text.contains("hotkey(\"ctrl\", \"s\")"));
        assert!(text.ends_with("press ctrl+s"));
    }
}
