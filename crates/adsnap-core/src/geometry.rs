//! Layout geometry shared by the normalizer, the rasterizer and the encoder.
//!
//! All lengths are CSS pixels unless a function says otherwise.

use serde::{Deserialize, Serialize};

/// Nominal display size of a banner (semantic size, not rendered pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentSize {
    pub width: f32,
    pub height: f32,
}

impl ContentSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Multiply every component by `factor` (CSS px to device px).
    pub fn scaled(&self, factor: f32) -> Rect {
        Rect::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Move the origin by `(-dx, -dy)`.
    pub fn relative_to(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x - dx, self.y - dy, self.width, self.height)
    }
}

/// Compute the rectangle that fits content of size `iw x ih` into a
/// `cw x ch` box without cropping, preserving aspect ratio and centering
/// the result.
///
/// The scale factor is `min(cw / iw, ch / ih)`; the padding on the
/// constrained axis is split evenly.
///
/// # Example
///
/// ```ignore
/// let r = contain_rect(100.0, 100.0, 200.0, 100.0);
/// assert_eq!(r, Rect::new(0.0, 25.0, 100.0, 50.0));
/// ```
pub fn contain_rect(cw: f32, ch: f32, iw: f32, ih: f32) -> Rect {
    if iw <= 0.0 || ih <= 0.0 {
        return Rect::new(0.0, 0.0, cw, ch);
    }

    let scale = (cw / iw).min(ch / ih);
    let dw = iw * scale;
    let dh = ih * scale;

    Rect::new((cw - dw) / 2.0, (ch - dh) / 2.0, dw, dh)
}

/// Dimensions of the fixed half-size downscale: `round(w / 2) x round(h / 2)`,
/// never smaller than one pixel per side.
pub fn half_dimensions(width: u32, height: u32) -> (u32, u32) {
    let half = |v: u32| ((v as f64 / 2.0).round() as u32).max(1);
    (half(width), half(height))
}

/// Convert a CSS length to a device pixel count at the given pixel ratio.
pub fn device_pixels(css: f32, dpr: f32) -> u32 {
    ((css * dpr).round() as u32).max(1)
}
