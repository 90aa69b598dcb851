use serde::{Deserialize, Serialize};

/// Raw frame as returned by a [`ScreenCapture`](super::screenshot::ScreenCapture).
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Optional accessibility tree dump for the captured screen.
    pub accessibility_tree: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    pub physical_width: u32,
    pub physical_height: u32,
    /// Size of the image actually handed to the decision provider.
    pub image_width: u32,
    pub image_height: u32,
}

impl ScreenshotMeta {
    /// Map a point in image space to physical screen pixels.
    pub fn to_physical(&self, x: i32, y: i32) -> (i32, i32) {
        (
            rescale_axis(x, self.image_width, self.physical_width),
            rescale_axis(y, self.image_height, self.physical_height),
        )
    }
}

fn rescale_axis(v: i32, from: u32, to: u32) -> i32 {
    if from == 0 || from == to {
        return v;
    }
    ((v as i64 * to as i64) / from as i64) as i32
}

/// One step's view of the desktop.
#[derive(Debug, Clone)]
pub struct Observation {
    /// PNG-encoded, already scaled to `meta.image_width` x `meta.image_height`.
    pub screenshot_png: Vec<u8>,
    pub meta: ScreenshotMeta,
    pub accessibility_tree: Option<String>,
}
