//! Image normalisation: raw embedded blob → bounded 3-channel `RgbImage`.
//!
//! Screenshots pasted into Word documents arrive as PNG, JPEG, GIF, BMP or
//! TIFF, frequently with an alpha channel or a palette. Everything is decoded
//! and converted to RGB8 here so later stages can rely on one pixel layout.
//!
//! ## Why cap the longest side?
//!
//! A 4K screenshot costs several times the tokens of a 1500 px one and the
//! timesheet grid is already legible at that size. Images at or below the
//! cap are passed through untouched; larger ones are downscaled with
//! Lanczos3, preserving the aspect ratio.

use image::imageops::FilterType;
use image::RgbImage;
use tracing::debug;

/// Decode `bytes` and bound the result to `max_dim` on its longest side.
///
/// Deterministic for identical input.
pub fn normalize_image(bytes: &[u8], max_dim: u32) -> Result<RgbImage, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (w, h) = (img.width(), img.height());

    let img = if w > max_dim || h > max_dim {
        // `resize` keeps the aspect ratio and fits inside max_dim × max_dim.
        let resized = img.resize(max_dim, max_dim, FilterType::Lanczos3);
        debug!(
            "Downscaled {}x{} → {}x{}",
            w,
            h,
            resized.width(),
            resized.height()
        );
        resized
    } else {
        img
    };

    Ok(img.to_rgb8())
}
