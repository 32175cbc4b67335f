//! JPEG export bindings.
//!
//! The page captures the banner into a canvas itself, hands the RGBA pixels
//! over, and gets back a JPEG that fits the byte budget.
//!
//! ```typescript
//! import { downscale_half, encode_jpeg_under_budget, JsRasterImage } from '@adsnap/wasm';
//!
//! const data = ctx.getImageData(0, 0, canvas.width, canvas.height);
//! const full = new JsRasterImage(data.width, data.height, new Uint8Array(data.data.buffer));
//! const out = encode_jpeg_under_budget(downscale_half(full), 48 * 1024, '#00c853');
//! const blob = new Blob([out.bytes()], { type: 'image/jpeg' });
//! ```

use adsnap_core::encode::{self, BudgetedJpeg, ByteBudget};
use adsnap_core::raster::{self, Color};
use wasm_bindgen::prelude::*;

use crate::types::JsRasterImage;

/// Result of a budgeted encode.
#[wasm_bindgen]
pub struct JsExportedJpeg {
    inner: BudgetedJpeg,
}

#[wasm_bindgen]
impl JsExportedJpeg {
    /// Encoded JPEG bytes (copied into a `Uint8Array`).
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.bytes.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn byte_length(&self) -> usize {
        self.inner.bytes.len()
    }

    /// Quality the bytes were encoded at, in `[0.35, 0.95]`.
    #[wasm_bindgen(getter)]
    pub fn quality(&self) -> f32 {
        self.inner.quality
    }

    /// `false` when no quality fit and the floor-quality encode was returned.
    #[wasm_bindgen(getter)]
    pub fn within_budget(&self) -> bool {
        self.inner.within_budget
    }

    #[wasm_bindgen(getter)]
    pub fn attempts(&self) -> u32 {
        self.inner.attempts
    }

    #[wasm_bindgen(getter)]
    pub fn mime_type(&self) -> String {
        "image/jpeg".to_string()
    }
}

/// Flatten an RGBA canvas onto a matte and encode it under `budget_bytes`.
///
/// `background` is a CSS hex color (`#rgb`, `#rrggbb`, `#rrggbbaa`);
/// defaults to the export matte `#00c853`.
///
/// # Errors
///
/// Fails when the pixel buffer does not match the dimensions, the color
/// cannot be parsed, or the encoder produces nothing at all. An unreachable
/// budget is not an error; check `within_budget` instead.
#[wasm_bindgen]
pub fn encode_jpeg_under_budget(
    image: &JsRasterImage,
    budget_bytes: u32,
    background: Option<String>,
) -> Result<JsExportedJpeg, JsValue> {
    let matte = match background.as_deref() {
        Some(s) => s
            .parse::<Color>()
            .map_err(|e| JsValue::from_str(&e.to_string()))?,
        None => Color::MATTE,
    };
    let canvas = image
        .to_rgba()
        .ok_or_else(|| JsValue::from_str("pixel data length does not match dimensions"))?;

    let rgb = raster::flatten(&canvas, matte);
    let inner = encode::encode_under_budget(&rgb, ByteBudget::from_bytes(budget_bytes.into()))
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    #[cfg(target_arch = "wasm32")]
    if !inner.within_budget {
        web_sys::console::warn_1(&JsValue::from_str(&format!(
            "adsnap: {} bytes exceeds budget of {} bytes at minimum quality",
            inner.bytes.len(),
            budget_bytes
        )));
    }

    Ok(JsExportedJpeg { inner })
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_encode_under_default_budget() {
        let img = JsRasterImage::new(150, 125, vec![200u8; 150 * 125 * 4]);
        let out = encode_jpeg_under_budget(&img, 48 * 1024, None).unwrap();
        assert!(out.within_budget());
        assert!(out.byte_length() <= 48 * 1024);
    }

    #[wasm_bindgen_test]
    fn test_unreachable_budget_degrades() {
        let img = JsRasterImage::new(64, 64, vec![90u8; 64 * 64 * 4]);
        let out = encode_jpeg_under_budget(&img, 16, Some("#fff".into())).unwrap();
        assert!(!out.within_budget());
        assert_eq!(out.quality(), encode::MIN_QUALITY);
    }

    #[wasm_bindgen_test]
    fn test_bad_color_rejected() {
        let img = JsRasterImage::new(4, 4, vec![0u8; 64]);
        assert!(encode_jpeg_under_budget(&img, 1024, Some("green".into())).is_err());
    }

    #[wasm_bindgen_test]
    fn test_mismatched_pixels_rejected() {
        let img = JsRasterImage::new(10, 10, vec![0u8; 12]);
        assert!(encode_jpeg_under_budget(&img, 1024, None).is_err());
    }
}
