//! WASM-compatible wrapper types for canvas data.

use adsnap_core::raster::RgbaImage;
use wasm_bindgen::prelude::*;

/// An RGBA canvas handed across the JS boundary.
///
/// Pixel data lives in WASM memory; `pixels()` copies it out as a
/// `Uint8Array`, matching what `CanvasRenderingContext2D.getImageData`
/// produces (4 bytes per pixel, row-major, unpremultiplied).
#[wasm_bindgen]
pub struct JsRasterImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

#[wasm_bindgen]
impl JsRasterImage {
    #[wasm_bindgen(constructor)]
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> JsRasterImage {
        JsRasterImage {
            width,
            height,
            pixels,
        }
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[wasm_bindgen(getter)]
    pub fn byte_length(&self) -> usize {
        self.pixels.len()
    }

    /// Returns RGBA pixel data as a copy.
    pub fn pixels(&self) -> Vec<u8> {
        self.pixels.clone()
    }

    /// Explicitly free WASM memory. Optional; the finalizer does the same.
    pub fn free(self) {}
}

impl JsRasterImage {
    pub(crate) fn from_rgba(image: RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        }
    }

    /// Copy the pixel data into a core canvas. `None` when the buffer length
    /// does not match `width * height * 4`.
    pub(crate) fn to_rgba(&self) -> Option<RgbaImage> {
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)?;
        if self.pixels.len() != expected {
            return None;
        }
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}
