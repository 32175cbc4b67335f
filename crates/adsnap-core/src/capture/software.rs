//! Built-in rasterizer that paints the render tree in-process.
//!
//! Painting follows document order, with siblings stably reordered by
//! integer `z-index`. Each node paints its background color, then its image
//! content. Subtrees with `display: none` are skipped. Image sources that
//! are still SVG references, or that fail to load or decode, are skipped:
//! vector content must be normalized before capture.

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use tracing::{debug, warn};
use url::Url;

use super::{CaptureError, CaptureOptions, Rasterizer, RasterizerProvider};
use crate::document::{Content, Document, ImageSource, Node, NodeId, ObjectFit};
use crate::geometry::{contain_rect, Rect};
use crate::loader::{decode_data_url, is_data_url, ResourceLoader};
use crate::raster::{draw_image, fill_rect, filled_canvas};

/// Paints documents using the `image` crate.
pub struct SoftwareRasterizer {
    loader: Arc<dyn ResourceLoader>,
}

impl SoftwareRasterizer {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self { loader }
    }

    /// Nodes of the subtree rooted at `root`, in paint order.
    fn paint_order(document: &Document, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = document.node(id) else { continue };
            if node.style.is_hidden() {
                continue;
            }
            out.push(id);

            let mut children = node.children().to_vec();
            children.sort_by_key(|child| {
                document
                    .node(*child)
                    .map(|n| n.style.stacking_order())
                    .unwrap_or(0)
            });
            stack.extend(children.into_iter().rev());
        }
        out
    }

    async fn load_image(
        &self,
        document: &Document,
        source: &ImageSource,
        options: &CaptureOptions,
    ) -> Option<Arc<RgbaImage>> {
        let raw = match source {
            ImageSource::Inline(pixels) => return Some(pixels.clone()),
            ImageSource::Url(raw) => raw,
        };
        if source.is_svg_reference() {
            debug!(src = %raw, "skipping unrasterized svg");
            return None;
        }
        if is_data_url(raw) {
            return match decode_data_url(raw) {
                Ok(bytes) => decode_pixels(&bytes, "data: url"),
                Err(e) => {
                    warn!(error = %e, "undecodable data url");
                    None
                }
            };
        }

        let url = match document.resolve_url(raw) {
            Ok(url) => url,
            Err(e) => {
                warn!(src = %raw, error = %e, "unresolvable image url");
                return None;
            }
        };
        if !options.allow_cross_origin && !same_origin(document.url(), &url) {
            debug!(url = %url, "skipping cross-origin image");
            return None;
        }

        let bytes = match self.loader.fetch(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "image fetch failed");
                return None;
            }
        };
        decode_pixels(&bytes, url.as_str())
    }

    async fn paint_node(
        &self,
        canvas: &mut RgbaImage,
        document: &Document,
        node: &Node,
        origin: Rect,
        options: &CaptureOptions,
    ) {
        let target = node.layout.relative_to(origin.x, origin.y).scaled(options.scale);

        if let Some(color) = node.style.background_color {
            fill_rect(canvas, target, color);
        }

        let Content::Image(source) = &node.content else {
            return;
        };
        let Some(pixels) = self.load_image(document, source, options).await else {
            return;
        };

        let dest = match node.style.object_fit {
            ObjectFit::Fill => target,
            ObjectFit::Contain => {
                let fit = contain_rect(
                    target.width,
                    target.height,
                    pixels.width() as f32,
                    pixels.height() as f32,
                );
                Rect::new(target.x + fit.x, target.y + fit.y, fit.width, fit.height)
            }
        };
        draw_image(canvas, &pixels, dest);
    }
}

#[async_trait]
impl Rasterizer for SoftwareRasterizer {
    async fn capture(
        &self,
        document: &Document,
        root: NodeId,
        options: &CaptureOptions,
    ) -> Result<RgbaImage, CaptureError> {
        let root_node = document
            .node(root)
            .ok_or(CaptureError::MissingRoot(root.index()))?;
        let origin = root_node.layout;
        if origin.width <= 0.0 || origin.height <= 0.0 {
            return Err(CaptureError::EmptySurface {
                width: origin.width,
                height: origin.height,
            });
        }

        let width = ((origin.width * options.scale).round() as u32).max(1);
        let height = ((origin.height * options.scale).round() as u32).max(1);
        let mut canvas = filled_canvas(width, height, options.background);

        let order = Self::paint_order(document, root);
        debug!(width, height, nodes = order.len(), "painting capture surface");
        for id in order {
            if let Some(node) = document.node(id) {
                self.paint_node(&mut canvas, document, node, origin, options).await;
            }
        }
        Ok(canvas)
    }
}

/// Provides a [`SoftwareRasterizer`] for any document.
pub struct SoftwareProvider {
    loader: Arc<dyn ResourceLoader>,
}

impl SoftwareProvider {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl RasterizerProvider for SoftwareProvider {
    async fn load(&self, _document: &Document) -> Result<Arc<dyn Rasterizer>, CaptureError> {
        Ok(Arc::new(SoftwareRasterizer::new(self.loader.clone())))
    }
}

fn decode_pixels(bytes: &[u8], source: &str) -> Option<Arc<RgbaImage>> {
    match image::load_from_memory(bytes) {
        Ok(decoded) => Some(Arc::new(decoded.to_rgba8())),
        Err(e) => {
            warn!(source, error = %e, "image decode failed");
            None
        }
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin() || (a.scheme() == "file" && b.scheme() == "file")
}
