//! Vector normalization: rewriting a render tree so it holds only bitmaps.
//!
//! Three passes run in order over a private copy of the document:
//!
//! 1. [`absolutize_image_sources`] makes relative image URLs absolute.
//! 2. [`Normalizer::inline_svgs`] replaces each visible inline `<svg>` with an
//!    `<img>` holding its rasterization.
//! 3. [`Normalizer::rasterize_svg_images`] rasterizes `<img>` elements that
//!    point at `.svg` files and writes the pixels back as their source.
//!
//! Within a pass every element is an independent unit; units run
//! concurrently and the pass finishes when all have settled. A unit either
//! replaces its element or is skipped, and a skipped unit never fails the
//! pass.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::document::{Content, Document, ImageSource, NodeId, ViewBox};
use crate::geometry::{ContentSize, Rect};
use crate::loader::ResourceLoader;
use crate::svg::SvgImage;

/// What happened to one element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementOutcome {
    /// The element now shows pre-rendered pixels.
    Replaced,
    /// The element's box is 1px or less in some dimension; left untouched.
    SkippedInvisible,
    /// Loading, parsing or rendering failed (or timed out); left untouched.
    SkippedError(String),
}

/// Outcomes of a full normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    /// Image sources rewritten to absolute URLs.
    pub absolutized: usize,
    pub inline_svgs: Vec<(NodeId, ElementOutcome)>,
    pub svg_images: Vec<(NodeId, ElementOutcome)>,
}

impl NormalizeReport {
    fn outcomes(&self) -> impl Iterator<Item = &ElementOutcome> {
        self.inline_svgs
            .iter()
            .chain(self.svg_images.iter())
            .map(|(_, outcome)| outcome)
    }

    pub fn replaced(&self) -> usize {
        self.outcomes()
            .filter(|o| **o == ElementOutcome::Replaced)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes()
            .filter(|o| **o != ElementOutcome::Replaced)
            .count()
    }
}

/// Rewrite relative image `src` values to absolute URLs.
///
/// Sources that are already `data:`, `http(s):` or `blob:` URLs are left
/// alone, as are sources the document URL cannot resolve.
pub fn absolutize_image_sources(document: &mut Document) -> usize {
    let mut rewritten = 0;
    for id in document.image_elements() {
        let Some(ImageSource::Url(raw)) = image_source(document, id) else {
            continue;
        };
        if raw.is_empty() || is_absolute_source(&raw) {
            continue;
        }
        match document.resolve_url(&raw) {
            Ok(url) => {
                if let Some(node) = document.node_mut(id) {
                    node.content = Content::Image(ImageSource::Url(url.into()));
                    rewritten += 1;
                }
            }
            Err(e) => debug!(src = %raw, error = %e, "leaving unresolvable src"),
        }
    }
    rewritten
}

fn is_absolute_source(raw: &str) -> bool {
    let lower = raw.trim_start().to_ascii_lowercase();
    ["data:", "http:", "https:", "blob:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

fn image_source(document: &Document, id: NodeId) -> Option<ImageSource> {
    match &document.node(id)?.content {
        Content::Image(source) => Some(source.clone()),
        _ => None,
    }
}

/// Result of one unit before it is applied to the tree.
enum Unit {
    Raster(RgbaImage),
    Invisible,
    Failed(String),
}

/// Runs the SVG normalization passes.
pub struct Normalizer<'a> {
    loader: &'a dyn ResourceLoader,
    element_timeout: Option<Duration>,
    fallback_size: ContentSize,
}

impl<'a> Normalizer<'a> {
    /// `fallback_size` is used as the box of SVG images that have no
    /// rendered size.
    pub fn new(loader: &'a dyn ResourceLoader, fallback_size: ContentSize) -> Self {
        Self {
            loader,
            element_timeout: None,
            fallback_size,
        }
    }

    /// Bound every unit by `timeout`; a unit that takes longer is skipped.
    pub fn with_element_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.element_timeout = timeout;
        self
    }

    /// Run all passes in order.
    pub async fn normalize(&self, document: &mut Document) -> NormalizeReport {
        let absolutized = absolutize_image_sources(document);
        let inline_svgs = self.inline_svgs(document).await;
        let svg_images = self.rasterize_svg_images(document).await;

        let report = NormalizeReport {
            absolutized,
            inline_svgs,
            svg_images,
        };
        debug!(
            absolutized = report.absolutized,
            replaced = report.replaced(),
            skipped = report.skipped(),
            "normalization finished"
        );
        report
    }

    /// Replace visible inline `<svg>` elements with rasterized `<img>` elements.
    pub async fn inline_svgs(&self, document: &mut Document) -> Vec<(NodeId, ElementOutcome)> {
        let dpr = document.effective_pixel_ratio();
        let jobs: Vec<(NodeId, String, Option<ViewBox>, Rect)> = document
            .svg_elements()
            .into_iter()
            .filter_map(|id| {
                let node = document.node(id)?;
                match &node.content {
                    Content::Svg { markup, view_box } => {
                        Some((id, markup.clone(), *view_box, node.layout))
                    }
                    _ => None,
                }
            })
            .collect();

        let units = join_all(jobs.iter().map(|(_, markup, view_box, layout)| {
            let (markup, view_box, layout) = (markup.clone(), *view_box, *layout);
            self.bounded(render_blocking(move || {
                rasterize_inline(&markup, view_box, layout, dpr)
            }))
        }))
        .await;

        let ids = jobs.iter().map(|(id, ..)| *id);
        ids.zip(units)
            .map(|(id, unit)| {
                let outcome = match unit {
                    Unit::Raster(pixels) => {
                        match document.replace_with_image(id, Arc::new(pixels)) {
                            Ok(()) => ElementOutcome::Replaced,
                            Err(e) => ElementOutcome::SkippedError(e.to_string()),
                        }
                    }
                    Unit::Invisible => ElementOutcome::SkippedInvisible,
                    Unit::Failed(reason) => {
                        warn!(node = id.index(), %reason, "inline svg skipped");
                        ElementOutcome::SkippedError(reason)
                    }
                };
                (id, outcome)
            })
            .collect()
    }

    /// Rasterize `<img>` elements whose source is an SVG file.
    pub async fn rasterize_svg_images(
        &self,
        document: &mut Document,
    ) -> Vec<(NodeId, ElementOutcome)> {
        let dpr = document.effective_pixel_ratio();
        let doc: &Document = document;
        let jobs: Vec<(NodeId, String, Rect)> = doc
            .image_elements()
            .into_iter()
            .filter_map(|id| {
                let node = doc.node(id)?;
                match &node.content {
                    Content::Image(source @ ImageSource::Url(raw)) if source.is_svg_reference() => {
                        Some((id, raw.clone(), node.layout))
                    }
                    _ => None,
                }
            })
            .collect();

        let units = join_all(jobs.iter().map(|(_, raw, layout)| {
            self.bounded(self.rasterize_referenced(doc, raw, *layout, dpr))
        }))
        .await;

        let ids: Vec<NodeId> = jobs.iter().map(|(id, ..)| *id).collect();
        ids.into_iter()
            .zip(units)
            .map(|(id, unit)| {
                let outcome = match (unit, document.node_mut(id)) {
                    (Unit::Raster(pixels), Some(node)) => {
                        node.content = Content::Image(ImageSource::Inline(Arc::new(pixels)));
                        node.style.object_fit = crate::document::ObjectFit::Contain;
                        node.style.object_position = Some("center".to_string());
                        ElementOutcome::Replaced
                    }
                    (Unit::Raster(_), None) => {
                        ElementOutcome::SkippedError(format!("node {} vanished", id.index()))
                    }
                    (Unit::Invisible, _) => ElementOutcome::SkippedInvisible,
                    (Unit::Failed(reason), _) => {
                        warn!(node = id.index(), %reason, "svg image skipped");
                        ElementOutcome::SkippedError(reason)
                    }
                };
                (id, outcome)
            })
            .collect()
    }

    async fn rasterize_referenced(
        &self,
        document: &Document,
        raw: &str,
        layout: Rect,
        dpr: f32,
    ) -> Unit {
        let url = match document.resolve_url(raw) {
            Ok(url) => url,
            Err(e) => return Unit::Failed(format!("bad url {raw:?}: {e}")),
        };
        let bytes = match self.loader.fetch(&url).await {
            Ok(bytes) => bytes,
            Err(e) => return Unit::Failed(e.to_string()),
        };
        let box_width = if layout.width > 0.0 {
            layout.width
        } else {
            self.fallback_size.width
        };
        let box_height = if layout.height > 0.0 {
            layout.height
        } else {
            self.fallback_size.height
        };

        let (box_width, box_height) = (box_width.max(1.0), box_height.max(1.0));

        render_blocking(move || {
            match SvgImage::parse(&bytes).and_then(|svg| {
                svg.rasterize_contained(box_width, box_height, svg.natural_size(), dpr)
            }) {
                Ok(pixels) => Unit::Raster(pixels),
                Err(e) => Unit::Failed(e.to_string()),
            }
        })
        .await
    }

    async fn bounded<F>(&self, unit: F) -> Unit
    where
        F: Future<Output = Unit>,
    {
        match self.element_timeout {
            Some(limit) => tokio::time::timeout(limit, unit)
                .await
                .unwrap_or_else(|_| Unit::Failed(format!("timed out after {limit:?}"))),
            None => unit.await,
        }
    }
}

/// Parse and render on the blocking pool so the element timeout can fire
/// while resvg is busy. A timed-out render keeps running to completion in
/// the background; its result is dropped.
async fn render_blocking<F>(render: F) -> Unit
where
    F: FnOnce() -> Unit + Send + 'static,
{
    tokio::task::spawn_blocking(render)
        .await
        .unwrap_or_else(|e| Unit::Failed(format!("render task failed: {e}")))
}

fn rasterize_inline(markup: &str, view_box: Option<ViewBox>, layout: Rect, dpr: f32) -> Unit {
    if layout.width <= 1.0 || layout.height <= 1.0 {
        return Unit::Invisible;
    }

    let content = view_box
        .and_then(|vb| vb.content_size())
        .unwrap_or((layout.width, layout.height));

    match SvgImage::parse_markup(markup)
        .and_then(|svg| svg.rasterize_contained(layout.width, layout.height, content, dpr))
    {
        Ok(pixels) => Unit::Raster(pixels),
        Err(e) => Unit::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{LoadError, MemoryLoader};
    use async_trait::async_trait;
    use url::Url;

    const RED_WIDE: &str = r#"<svg width="200" height="100" viewBox="0 0 200 100"><rect width="200" height="100" fill="red"/></svg>"#;

    fn banner(children: &str) -> Document {
        Document::from_json(&format!(
            r#"{{
                "url": "file:///deploy/summer/300x250/index.html",
                "body": {{
                    "rect": {{"x": 0, "y": 0, "width": 300, "height": 250}},
                    "children": [{children}]
                }}
            }}"#
        ))
        .unwrap()
    }

    fn svg_child(markup: &str, width: f32, height: f32) -> String {
        format!(
            r#"{{"svg": {}, "rect": {{"x": 0, "y": 0, "width": {width}, "height": {height}}}}}"#,
            serde_json::to_string(markup).unwrap()
        )
    }

    fn inline_pixels(doc: &Document, id: NodeId) -> Arc<RgbaImage> {
        match &doc.node(id).unwrap().content {
            Content::Image(ImageSource::Inline(pixels)) => pixels.clone(),
            other => panic!("expected inline pixels, got {:?}", other),
        }
    }

    /// Never answers.
    struct Hanging;

    #[async_trait]
    impl ResourceLoader for Hanging {
        async fn fetch(&self, _url: &Url) -> Result<Vec<u8>, LoadError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_absolutize_image_sources() {
        let mut doc = banner(
            r#"{"src": "img/bg.png"},
               {"src": "https://cdn.example.com/a.png"},
               {"src": "DATA:image/png;base64,AAAA"},
               {"src": "blob:xyz"},
               {"src": ""}"#,
        );
        assert_eq!(absolutize_image_sources(&mut doc), 1);

        let srcs: Vec<String> = doc
            .image_elements()
            .into_iter()
            .filter_map(|id| image_source(&doc, id))
            .filter_map(|s| s.as_url().map(str::to_string))
            .collect();
        assert_eq!(
            srcs,
            vec![
                "file:///deploy/summer/300x250/img/bg.png",
                "https://cdn.example.com/a.png",
                "DATA:image/png;base64,AAAA",
                "blob:xyz",
                "",
            ]
        );
    }

    #[tokio::test]
    async fn test_inline_svg_replaced_with_contained_raster() {
        let mut doc = banner(&svg_child(RED_WIDE, 100.0, 100.0));
        let svg = doc.svg_elements()[0];
        let loader = MemoryLoader::new();

        let outcomes = Normalizer::new(&loader, ContentSize::new(300.0, 250.0))
            .inline_svgs(&mut doc)
            .await;

        assert_eq!(outcomes, vec![(svg, ElementOutcome::Replaced)]);
        let pixels = inline_pixels(&doc, svg);
        assert_eq!(pixels.dimensions(), (100, 100));
        // drawn 100x50, centered: 25px transparent bands top and bottom
        assert_eq!(pixels.get_pixel(50, 12)[3], 0);
        assert_eq!(pixels.get_pixel(50, 50)[3], 255);
        assert_eq!(pixels.get_pixel(50, 88)[3], 0);
    }

    #[tokio::test]
    async fn test_inline_svg_without_view_box_uses_box() {
        let markup = r#"<svg><rect width="40" height="40" fill="blue"/></svg>"#;
        let mut doc = banner(&svg_child(markup, 40.0, 40.0));
        let svg = doc.svg_elements()[0];
        let loader = MemoryLoader::new();

        let outcomes = Normalizer::new(&loader, ContentSize::new(300.0, 250.0))
            .inline_svgs(&mut doc)
            .await;
        assert_eq!(outcomes[0].1, ElementOutcome::Replaced);
        assert_eq!(inline_pixels(&doc, svg).dimensions(), (40, 40));
    }

    #[tokio::test]
    async fn test_tiny_inline_svg_left_untouched() {
        let children = format!(
            "{},{}",
            svg_child(RED_WIDE, 1.0, 100.0),
            svg_child(RED_WIDE, 100.0, 0.5)
        );
        let mut doc = banner(&children);
        let before = doc.clone();
        let loader = MemoryLoader::new();

        let outcomes = Normalizer::new(&loader, ContentSize::new(300.0, 250.0))
            .inline_svgs(&mut doc)
            .await;

        assert!(outcomes
            .iter()
            .all(|(_, o)| *o == ElementOutcome::SkippedInvisible));
        assert_eq!(doc.svg_elements(), before.svg_elements());
        for id in doc.svg_elements() {
            assert_eq!(doc.node(id), before.node(id));
        }
    }

    #[tokio::test]
    async fn test_broken_inline_svg_skipped_without_failing_siblings() {
        let children = format!(
            "{},{}",
            svg_child("<svg><rect", 50.0, 50.0),
            svg_child(RED_WIDE, 100.0, 100.0)
        );
        let mut doc = banner(&children);
        let loader = MemoryLoader::new();

        let outcomes = Normalizer::new(&loader, ContentSize::new(300.0, 250.0))
            .inline_svgs(&mut doc)
            .await;

        assert!(matches!(outcomes[0].1, ElementOutcome::SkippedError(_)));
        assert_eq!(outcomes[1].1, ElementOutcome::Replaced);
        assert_eq!(doc.svg_elements().len(), 1);
    }

    #[tokio::test]
    async fn test_svg_image_rasterized_in_place() {
        let mut doc = banner(
            r#"{"id": "logo", "src": "img/logo.svg?v=3",
                "rect": {"x": 0, "y": 0, "width": 100, "height": 100}},
               {"src": "img/photo.png", "rect": {"x": 0, "y": 0, "width": 10, "height": 10}}"#,
        );
        let loader = MemoryLoader::new().with(
            "file:///deploy/summer/300x250/img/logo.svg?v=3",
            RED_WIDE.replace("<svg", "<svg xmlns=\"http://www.w3.org/2000/svg\""),
        );

        let report = Normalizer::new(&loader, ContentSize::new(300.0, 250.0))
            .normalize(&mut doc)
            .await;

        assert_eq!(report.absolutized, 2);
        assert_eq!(report.svg_images.len(), 1);
        assert_eq!(report.svg_images[0].1, ElementOutcome::Replaced);

        let logo = doc.query_selector("#logo").unwrap();
        let node = doc.node(logo).unwrap();
        assert_eq!(node.style.object_fit, crate::document::ObjectFit::Contain);
        assert_eq!(node.style.object_position.as_deref(), Some("center"));
        let pixels = inline_pixels(&doc, logo);
        assert_eq!(pixels.dimensions(), (100, 100));
        assert_eq!(pixels.get_pixel(50, 10)[3], 0);
        assert_eq!(pixels.get_pixel(50, 50)[3], 255);
    }

    #[tokio::test]
    async fn test_svg_image_without_box_uses_size_hint() {
        let mut doc = banner(r#"{"src": "logo.svg"}"#);
        let loader = MemoryLoader::new().with(
            "file:///deploy/summer/300x250/logo.svg",
            RED_WIDE.replace("<svg", "<svg xmlns=\"http://www.w3.org/2000/svg\""),
        );

        let report = Normalizer::new(&loader, ContentSize::new(160.0, 600.0))
            .normalize(&mut doc)
            .await;
        assert_eq!(report.replaced(), 1);

        let img = doc.image_elements()[0];
        assert_eq!(inline_pixels(&doc, img).dimensions(), (160, 600));
    }

    #[tokio::test]
    async fn test_missing_svg_image_skipped() {
        let mut doc = banner(r#"{"src": "gone.svg", "rect": {"x":0,"y":0,"width":10,"height":10}}"#);
        let loader = MemoryLoader::new();

        let report = Normalizer::new(&loader, ContentSize::new(300.0, 250.0))
            .normalize(&mut doc)
            .await;

        assert_eq!(report.skipped(), 1);
        let img = doc.image_elements()[0];
        assert_eq!(
            image_source(&doc, img).unwrap().as_url(),
            Some("file:///deploy/summer/300x250/gone.svg")
        );
    }

    #[tokio::test]
    async fn test_slow_inline_render_times_out() {
        let circles: String = (0..40)
            .map(|i| {
                format!(
                    r##"<circle cx="{0}" cy="{0}" r="300" fill="blue" filter="url(#b)"/>"##,
                    100 + i * 25
                )
            })
            .collect();
        let markup = format!(
            r##"<svg viewBox="0 0 1200 1200"><defs><filter id="b"><feGaussianBlur stdDeviation="40"/></filter></defs>{circles}</svg>"##
        );
        let mut doc = banner(&svg_child(&markup, 600.0, 600.0));
        let svg = doc.svg_elements()[0];
        let loader = MemoryLoader::new();

        let outcomes = Normalizer::new(&loader, ContentSize::new(300.0, 250.0))
            .with_element_timeout(Some(Duration::from_millis(1)))
            .inline_svgs(&mut doc)
            .await;

        match &outcomes[0] {
            (id, ElementOutcome::SkippedError(reason)) => {
                assert_eq!(*id, svg);
                assert!(reason.contains("timed out"), "{reason}");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        // the svg is left in place
        assert_eq!(doc.svg_elements(), vec![svg]);
    }

    #[tokio::test]
    async fn test_hung_fetch_times_out() {
        let mut doc = banner(
            &format!(
                r#"{{"src": "slow.svg", "rect": {{"x":0,"y":0,"width":10,"height":10}}}},{}"#,
                svg_child(RED_WIDE, 100.0, 100.0)
            ),
        );

        let report = Normalizer::new(&Hanging, ContentSize::new(300.0, 250.0))
            .with_element_timeout(Some(Duration::from_millis(20)))
            .normalize(&mut doc)
            .await;

        assert_eq!(report.inline_svgs[0].1, ElementOutcome::Replaced);
        match &report.svg_images[0].1 {
            ElementOutcome::SkippedError(reason) => assert!(reason.contains("timed out")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
