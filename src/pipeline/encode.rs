//! Image encoding: `RgbImage` → base64 JPEG wrapped in `ImageData`.
//!
//! Timesheet screenshots are flat UI renders; JPEG at quality 90 keeps the
//! grid text legible while a four-image batch stays well below provider
//! upload limits.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use tracing::debug;

pub const JPEG_MIME: &str = "image/jpeg";

/// Encode a normalised image as a base64 JPEG ready for the inference request.
pub fn encode_image(img: &RgbImage, quality: u8) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, JPEG_MIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn encode_small_image() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 255, 0]));
        let data = encode_image(&img, 90).expect("encode should succeed");
        assert_eq!(data.mime_type, JPEG_MIME);
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn lower_quality_is_not_larger() {
        let img = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        let hi = encode_image(&img, 95).unwrap();
        let lo = encode_image(&img, 20).unwrap();
        assert!(lo.data.len() <= hi.data.len());
    }
}
