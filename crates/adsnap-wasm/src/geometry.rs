//! Canvas geometry bindings.

use adsnap_core::geometry;
use adsnap_core::raster;
use wasm_bindgen::prelude::*;

use crate::types::JsRasterImage;

/// Halve a canvas in both dimensions (rounded, min 1) with Lanczos3.
///
/// The banner is captured at twice its CSS size, so halving brings it back
/// to the ad slot's pixel size.
#[wasm_bindgen]
pub fn downscale_half(image: &JsRasterImage) -> Result<JsRasterImage, JsValue> {
    let canvas = image
        .to_rgba()
        .ok_or_else(|| JsValue::from_str("pixel data length does not match dimensions"))?;
    Ok(JsRasterImage::from_rgba(raster::downscale_half(&canvas)))
}

/// Largest rect with the content's aspect ratio that fits inside a
/// `box_width x box_height` box, centered.
///
/// Returns `{ x, y, width, height }`.
#[wasm_bindgen]
pub fn contain_rect(
    box_width: f32,
    box_height: f32,
    content_width: f32,
    content_height: f32,
) -> Result<JsValue, JsValue> {
    let rect = geometry::contain_rect(box_width, box_height, content_width, content_height);
    serde_wasm_bindgen::to_value(&rect).map_err(|e| JsValue::from_str(&e.to_string()))
}
