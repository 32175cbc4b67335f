//! JPEG encoding for banner exports.
//!
//! This module provides:
//! - Plain JPEG encoding with an integer quality ([`encode_jpeg`])
//! - Encoding at the highest quality that fits a byte budget
//!   ([`encode_under_budget`])
//!
//! # Examples
//!
//! ```ignore
//! use adsnap_core::encode::{encode_under_budget, ByteBudget};
//!
//! let frame = image::RgbImage::new(300, 250);
//! let jpeg = encode_under_budget(&frame, ByteBudget::from_kib(48)).unwrap();
//! println!("{} bytes at quality {}", jpeg.bytes.len(), jpeg.quality);
//! ```

mod budget;
mod jpeg;

pub use budget::{
    encode_under_budget, BudgetedJpeg, ByteBudget, QualityEncoder, MAX_ITERATIONS, MIN_QUALITY,
    PROBE_QUALITY,
};
pub use jpeg::{encode_jpeg, encode_rgb, quality_to_u8, EncodeError};
