//! Surface capture: turning a normalized render tree into pixels.
//!
//! The capture step is provided by a pluggable [`Rasterizer`]. Rasterizers
//! are obtained from a [`RasterizerProvider`] at most once per document and
//! kept in a [`ReadinessCache`], so repeated exports of the same frame do
//! not reload the dependency.

mod software;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbaImage;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::document::{Document, DocumentId, NodeId};
use crate::raster::Color;

pub use software::{SoftwareProvider, SoftwareRasterizer};

/// Errors raised by a rasterizer or its provider.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The rasterizer could not be loaded for this document.
    #[error("Rasterizer unavailable: {0}")]
    Unavailable(String),

    /// The capture root has no area.
    #[error("Capture surface is empty ({width}x{height})")]
    EmptySurface { width: f32, height: f32 },

    /// The capture root does not exist in the document.
    #[error("Capture root {0} not found")]
    MissingRoot(usize),

    /// Anything else that went wrong while drawing.
    #[error("Capture failed: {0}")]
    Failed(String),
}

/// Options for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Device pixels per CSS pixel.
    pub scale: f32,
    /// Opaque fill drawn before any content.
    pub background: Color,
    /// Load images from origins other than the document's.
    pub allow_cross_origin: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            background: Color::MATTE,
            allow_cross_origin: true,
        }
    }
}

/// Draws a subtree of a document onto a new canvas.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn capture(
        &self,
        document: &Document,
        root: NodeId,
        options: &CaptureOptions,
    ) -> Result<RgbaImage, CaptureError>;
}

/// Loads a rasterizer for a document.
#[async_trait]
pub trait RasterizerProvider: Send + Sync {
    async fn load(&self, document: &Document) -> Result<Arc<dyn Rasterizer>, CaptureError>;
}

type Slot = Arc<OnceCell<Arc<dyn Rasterizer>>>;

/// Per-document rasterizer cache.
///
/// The first request for a document loads the rasterizer; later requests
/// reuse it. Concurrent first requests share one load. A failed load is not
/// remembered, so the next export tries again.
///
/// Entries for loaded documents live until [`forget`](Self::forget) is
/// called; owners must call it when a document is unloaded.
#[derive(Default)]
pub struct ReadinessCache {
    slots: Mutex<HashMap<DocumentId, Slot>>,
}

impl ReadinessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the rasterizer for `document`, loading it on first use.
    pub async fn ensure(
        &self,
        document: &Document,
        provider: &dyn RasterizerProvider,
    ) -> Result<Arc<dyn Rasterizer>, CaptureError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(document.id()).or_default().clone()
        };

        if let Some(ready) = slot.get() {
            debug!(document = document.id().get(), "rasterizer already loaded");
            return Ok(ready.clone());
        }

        let loaded = slot
            .get_or_try_init(|| async {
                info!(document = document.id().get(), url = %document.url(), "loading rasterizer");
                provider.load(document).await
            })
            .await;

        match loaded {
            Ok(rasterizer) => Ok(rasterizer.clone()),
            Err(e) => {
                self.discard_empty(document.id(), &slot);
                Err(e)
            }
        }
    }

    /// Remove `slot` for `id` if it is still the registered, uninitialized one.
    fn discard_empty(&self, id: DocumentId, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized())
        {
            slots.remove(&id);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether a rasterizer is loaded for `id`.
    pub fn is_ready(&self, id: DocumentId) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(&id).is_some_and(|slot| slot.initialized())
    }

    /// Drop the cached rasterizer for a document that has been unloaded.
    pub fn forget(&self, id: DocumentId) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(&id);
    }
}
