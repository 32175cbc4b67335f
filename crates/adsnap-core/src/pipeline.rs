//! The export pipeline: banner frame in, size-capped JPEG out.
//!
//! ```text
//! Frame ─► readiness ─► copy + normalize ─► select root ─► next frame
//!        ─► capture ─► downscale ½ ─► budgeted JPEG
//! ```
//!
//! The caller's document is never modified; normalization runs on a copy.
//! Element-level problems during normalization are recorded in the report
//! and never abort the export. Everything after normalization aborts on
//! failure with a single [`ExportError`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::capture::{
    CaptureError, CaptureOptions, ReadinessCache, RasterizerProvider, SoftwareProvider,
};
use crate::config::ExportConfig;
use crate::document::{Document, NodeId};
use crate::encode::{encode_under_budget, ByteBudget, EncodeError};
use crate::frame::{FrameClock, IntervalClock};
use crate::geometry::ContentSize;
use crate::loader::ResourceLoader;
use crate::normalize::{NormalizeReport, Normalizer};
use crate::raster::{downscale_half, flatten};

/// MIME type of every export.
pub const JPEG_MIME: &str = "image/jpeg";

/// Why an export failed.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The frame has no document, or the capture surface is unusable.
    #[error("Capture target not ready: {0}")]
    CaptureNotReady(String),

    /// The rasterizer could not be loaded.
    #[error("Rasterization dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// The encoder produced no output at any quality.
    #[error("JPEG encoding failed: {0}")]
    EncodeFailed(#[source] EncodeError),

    /// Anything else.
    #[error("Unexpected export failure: {0}")]
    Unexpected(String),
}

impl From<CaptureError> for ExportError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Unavailable(reason) => ExportError::DependencyUnavailable(reason),
            CaptureError::EmptySurface { .. } | CaptureError::MissingRoot(_) => {
                ExportError::CaptureNotReady(e.to_string())
            }
            CaptureError::Failed(reason) => ExportError::Unexpected(reason),
        }
    }
}

/// The embedded frame showing a banner.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    document: Option<Document>,
}

impl Frame {
    /// A frame whose document has not loaded (or is inaccessible).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn loaded(document: Document) -> Self {
        Self {
            document: Some(document),
        }
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }
}

/// A finished export.
#[derive(Debug, Clone)]
pub struct ExportedJpeg {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Encoder quality in `0.0..=1.0`.
    pub quality: f32,
    /// False when the budget could not be met even at minimum quality.
    pub within_budget: bool,
    pub report: NormalizeReport,
}

impl ExportedJpeg {
    pub fn mime_type(&self) -> &'static str {
        JPEG_MIME
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Runs exports. Cheap to share; keeps one rasterizer per document.
pub struct Exporter {
    config: ExportConfig,
    loader: Arc<dyn ResourceLoader>,
    provider: Arc<dyn RasterizerProvider>,
    clock: Arc<dyn FrameClock>,
    readiness: ReadinessCache,
}

impl Exporter {
    /// Exporter using the built-in software rasterizer and default settings.
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        let config = ExportConfig::default();
        Self {
            clock: Arc::new(IntervalClock::new(config.frame_interval())),
            provider: Arc::new(SoftwareProvider::new(loader.clone())),
            loader,
            config,
            readiness: ReadinessCache::new(),
        }
    }

    pub fn with_config(mut self, config: ExportConfig) -> Self {
        self.clock = Arc::new(IntervalClock::new(config.frame_interval()));
        self.config = config;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn RasterizerProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_frame_clock(mut self, clock: Arc<dyn FrameClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn readiness(&self) -> &ReadinessCache {
        &self.readiness
    }

    /// Export with the configured default budget.
    pub async fn export_default(
        &self,
        frame: &Frame,
        size_hint: ContentSize,
    ) -> Result<ExportedJpeg, ExportError> {
        self.export(frame, size_hint, self.config.default_budget).await
    }

    /// Capture the banner in `frame` and encode it as a JPEG no larger than
    /// `budget` whenever the budget is reachable.
    ///
    /// `size_hint` is the banner's nominal size; it stands in for the box of
    /// SVG images that have no rendered size.
    #[instrument(skip_all, fields(budget = budget.bytes()))]
    pub async fn export(
        &self,
        frame: &Frame,
        size_hint: ContentSize,
        budget: ByteBudget,
    ) -> Result<ExportedJpeg, ExportError> {
        let source = frame
            .document()
            .ok_or_else(|| ExportError::CaptureNotReady("frame has no document".into()))?;

        let rasterizer = self
            .readiness
            .ensure(source, self.provider.as_ref())
            .await
            .map_err(|e| ExportError::DependencyUnavailable(e.to_string()))?;

        let mut document = source.clone();
        let report = Normalizer::new(self.loader.as_ref(), size_hint)
            .with_element_timeout(self.config.element_timeout())
            .normalize(&mut document)
            .await;

        let root = self.capture_root(&document);
        self.clock.next_frame().await;

        let options = CaptureOptions {
            scale: document.effective_pixel_ratio(),
            background: self.config.background,
            allow_cross_origin: self.config.allow_cross_origin,
        };
        let canvas = rasterizer.capture(&document, root, &options).await?;
        debug!(
            width = canvas.width(),
            height = canvas.height(),
            "captured surface"
        );

        let half = downscale_half(&canvas);
        let (width, height) = half.dimensions();
        let rgb = flatten(&half, self.config.background);

        let encoded = tokio::task::spawn_blocking(move || encode_under_budget(&rgb, budget))
            .await
            .map_err(|e| ExportError::Unexpected(format!("encoder task failed: {e}")))?
            .map_err(ExportError::EncodeFailed)?;

        if encoded.within_budget {
            info!(
                size = encoded.bytes.len(),
                quality = encoded.quality,
                width,
                height,
                "export finished"
            );
        } else {
            warn!(
                size = encoded.bytes.len(),
                budget = budget.bytes(),
                "export exceeds budget at minimum quality"
            );
        }

        Ok(ExportedJpeg {
            bytes: encoded.bytes,
            width,
            height,
            quality: encoded.quality,
            within_budget: encoded.within_budget,
            report,
        })
    }

    /// First configured selector that matches, else `<body>`.
    fn capture_root(&self, document: &Document) -> NodeId {
        self.config
            .capture_selectors
            .iter()
            .find_map(|selector| document.query_selector(selector))
            .unwrap_or_else(|| document.body())
    }
}
