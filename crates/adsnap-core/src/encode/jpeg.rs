//! JPEG encoding for banner exports.
//!
//! This module wraps the `image` crate's JPEG encoder. Qualities come in two
//! scales: the encoder's integer `1..=100` and the canvas-style `0.0..=1.0`
//! used by the byte-budget search.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Errors that can occur during JPEG encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes (width * height * 3), got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// JPEG encoding failed
    #[error("JPEG encoding failed: {0}")]
    EncodingFailed(String),

    /// The encoder produced no output at any quality
    #[error("Encoder produced no output")]
    NoOutput,
}

/// Map a canvas-style quality (`0.0..=1.0`) onto the encoder's `1..=100` scale.
///
/// Non-finite values map to the lowest quality.
pub fn quality_to_u8(quality: f32) -> u8 {
    if !quality.is_finite() {
        return 1;
    }
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Encode RGB pixel data to JPEG bytes.
///
/// # Arguments
///
/// * `pixels` - RGB pixel data (3 bytes per pixel, row-major order)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `quality` - JPEG quality (1-100); out-of-range values are clamped
///
/// # Quality Guidelines
///
/// * 90-100: Near-lossless, rarely fits ad network weight limits
/// * 60-90: Typical range for banner screenshots under 50 KB
/// * 35-60: Visible artifacts on text and gradients
pub fn encode_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    let expected_len = (width as usize) * (height as usize) * 3;
    if pixels.len() != expected_len {
        return Err(EncodeError::InvalidPixelData {
            expected: expected_len,
            actual: pixels.len(),
        });
    }

    let quality = quality.clamp(1, 100);
    let mut buffer = Cursor::new(Vec::new());

    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(pixels, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(buffer.into_inner())
}

/// Encode an RGB image at a canvas-style quality (`0.0..=1.0`).
pub fn encode_rgb(image: &RgbImage, quality: f32) -> Result<Vec<u8>, EncodeError> {
    encode_jpeg(
        image.as_raw(),
        image.width(),
        image.height(),
        quality_to_u8(quality),
    )
}
