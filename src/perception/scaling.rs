//! Screenshot downscaling for vision-model input limits.
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::perception::types::{Observation, Screenshot, ScreenshotMeta};

/// Uniformly shrink `(width, height)` so neither side exceeds `max_dim`.
///
/// Never upscales and keeps the aspect ratio; the shorter side is floored.
pub fn scale(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }
    let (w, h, m) = (width as u64, height as u64, max_dim as u64);
    if w >= h {
        (max_dim, (h * m / w) as u32)
    } else {
        ((w * m / h) as u32, max_dim)
    }
}

/// Resize a raw capture to fit `max_dim` (Lanczos) and encode it as PNG.
pub fn prepare_observation(shot: Screenshot, max_dim: u32) -> ScreenPilotResult<Observation> {
    let Screenshot {
        rgba,
        width,
        height,
        accessibility_tree,
    } = shot;

    let frame = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        ScreenPilotError::Capture(format!("frame buffer does not match {width}x{height} RGBA"))
    })?;

    let (image_width, image_height) = scale(width, height, max_dim);
    let frame = if (image_width, image_height) == (width, height) {
        frame
    } else {
        image::imageops::resize(&frame, image_width, image_height, FilterType::Lanczos3)
    };

    let mut png = Vec::new();
    DynamicImage::ImageRgba8(frame).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    tracing::debug!(
        physical = %format!("{width}x{height}"),
        scaled = %format!("{image_width}x{image_height}"),
        png_bytes = png.len(),
        "observation prepared"
    );

    Ok(Observation {
        screenshot_png: png,
        meta: ScreenshotMeta {
            physical_width: width,
            physical_height: height,
            image_width,
            image_height,
        },
        accessibility_tree,
    })
}
