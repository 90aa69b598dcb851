use crate::platform::dialog::{info_dialog, NOTICE_TITLE};
use crate::platform::Platform;

/// Fire-and-forget end-of-episode acknowledgement. Must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Writes the notice to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::info!(message, "episode notice");
    }
}

/// Pops a native info dialog and returns immediately; the dialog process is reaped
/// in the background.
#[derive(Debug, Clone, Copy)]
pub struct DialogNotifier {
    platform: Platform,
}

impl DialogNotifier {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

impl Notifier for DialogNotifier {
    fn notify(&self, message: &str) {
        let Some(dialog) = info_dialog(self.platform, NOTICE_TITLE, message) else {
            LogNotifier.notify(message);
            return;
        };
        match dialog.to_command().spawn() {
            Ok(mut child) => {
                tokio::spawn(async move {
                    if let Err(e) = child.wait().await {
                        tracing::debug!(error = %e, "notice dialog wait failed");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(program = dialog.program, error = %e, "could not show notice dialog");
                LogNotifier.notify(message);
            }
        }
    }
}

/// Pick the notifier for the running platform.
pub fn platform_notifier() -> Box<dyn Notifier> {
    match Platform::current() {
        Platform::Other => Box::new(LogNotifier),
        platform => Box::new(DialogNotifier::new(platform)),
    }
}
