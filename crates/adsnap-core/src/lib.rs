//! adsnap core - banner capture and size-capped JPEG export
//!
//! This crate turns a rendered banner into a JPEG small enough for an ad
//! network's backup-image slot. The always-on modules are synchronous and
//! build for `wasm32-unknown-unknown`:
//!
//! - [`geometry`] and [`raster`]: contain-fit math, canvas fill, half-size
//!   downscale and matte flattening
//! - [`svg`]: SVG parsing and rasterization
//! - [`encode`]: JPEG encoding and the quality search under a byte budget
//! - [`document`]: the render tree being captured
//! - [`catalog`]: the banner catalog and fragment routing of the preview tool
//!
//! The `pipeline` feature (on by default) adds the async export pipeline:
//! resource loading, SVG normalization, rasterizer readiness and the
//! `Exporter` that ties them together.

pub mod catalog;
pub mod config;
pub mod document;
pub mod encode;
pub mod geometry;
pub mod raster;
pub mod svg;

#[cfg(feature = "pipeline")]
pub mod capture;
#[cfg(feature = "pipeline")]
pub mod frame;
#[cfg(feature = "pipeline")]
pub mod loader;
#[cfg(feature = "pipeline")]
pub mod normalize;
#[cfg(feature = "pipeline")]
pub mod pipeline;

pub use catalog::{
    export_filename, safe_filename, size_from_type, BannerGroup, BannerItem, BannerType, Catalog,
    Route, Selection,
};
pub use config::ExportConfig;
pub use document::{Document, DocumentError, DocumentId, ElementSpec, NodeId};
pub use encode::{encode_under_budget, BudgetedJpeg, ByteBudget, EncodeError};
pub use geometry::{contain_rect, ContentSize, Rect};
pub use raster::{downscale_half, flatten, Color};
pub use svg::{SvgError, SvgImage};

#[cfg(feature = "pipeline")]
pub use capture::{CaptureError, ReadinessCache, SoftwareProvider};
#[cfg(feature = "pipeline")]
pub use loader::{FileLoader, LoadError, MemoryLoader, ResourceLoader};
#[cfg(feature = "pipeline")]
pub use normalize::{ElementOutcome, NormalizeReport};
#[cfg(feature = "pipeline")]
pub use pipeline::{ExportError, ExportedJpeg, Exporter, Frame};

/// Crate version, as reported by the wasm bindings.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
