//! adsnap WASM - WebAssembly bindings for adsnap
//!
//! Exposes the synchronous half of `adsnap-core` to the banner preview page.
//! The page captures the banner into a canvas itself; these bindings do the
//! rest of the export and the catalog bookkeeping.
//!
//! # Module Structure
//!
//! - `types` - WASM-compatible RGBA canvas wrapper
//! - `geometry` - half-size downscale and contain-fit math
//! - `encode` - JPEG encoding under a byte budget
//! - `catalog` - banner selection from the URL fragment, download filenames
//!
//! # Usage
//!
//! ```typescript
//! import init, { select_banner } from '@adsnap/wasm';
//!
//! await init();
//! const banners = await (await fetch('banners.json')).json();
//! const current = select_banner(banners, location.hash);
//! if (current) frame.src = current.src;
//! ```

use wasm_bindgen::prelude::*;

mod catalog;
mod encode;
mod geometry;
mod types;

pub use catalog::{export_filename, safe_filename, select_banner, JsSelection};
pub use encode::{encode_jpeg_under_budget, JsExportedJpeg};
pub use geometry::{contain_rect, downscale_half};
pub use types::JsRasterImage;

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    adsnap_core::VERSION.to_string()
}
