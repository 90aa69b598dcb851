use async_trait::async_trait;

use crate::errors::ScreenPilotResult;
use crate::perception::types::Screenshot;

/// Source of desktop frames. Must tolerate being called once per step, indefinitely.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self) -> ScreenPilotResult<Screenshot>;
}

/// Captures the primary monitor through `xcap`.
#[cfg(feature = "desktop")]
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimaryMonitorCapture;

#[cfg(feature = "desktop")]
impl PrimaryMonitorCapture {
    /// Physical size of the primary monitor.
    pub fn screen_size() -> ScreenPilotResult<(u32, u32)> {
        let monitor = primary_monitor()?;
        Ok((monitor.width(), monitor.height()))
    }
}

#[cfg(feature = "desktop")]
fn primary_monitor() -> ScreenPilotResult<xcap::Monitor> {
    use crate::errors::ScreenPilotError;

    let monitors = xcap::Monitor::all()
        .map_err(|e| ScreenPilotError::Capture(format!("enumerate monitors: {e}")))?;
    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary() {
            return Ok(monitor);
        }
        fallback.get_or_insert(monitor);
    }
    fallback.ok_or_else(|| ScreenPilotError::Capture("no monitor found".into()))
}

#[cfg(feature = "desktop")]
#[async_trait]
impl ScreenCapture for PrimaryMonitorCapture {
    async fn capture(&self) -> ScreenPilotResult<Screenshot> {
        use crate::errors::ScreenPilotError;

        tokio::task::spawn_blocking(|| {
            let monitor = primary_monitor()?;
            let frame = monitor
                .capture_image()
                .map_err(|e| ScreenPilotError::Capture(format!("capture primary monitor: {e}")))?;
            let (width, height) = (frame.width(), frame.height());
            tracing::debug!(width, height, "primary monitor captured");
            Ok(Screenshot {
                rgba: frame.into_raw(),
                width,
                height,
                accessibility_tree: None,
            })
        })
        .await
        .map_err(|e| ScreenPilotError::Capture(format!("join: {e}")))?
    }
}
