//! SVG rasterization for vector normalization.
//!
//! Vector content is turned into pixels before capture so the rasterizer only
//! ever deals with bitmaps. Rendering goes through `resvg`; the result is
//! drawn into a box with containment scaling, exactly like drawing a decoded
//! SVG image onto a canvas with `drawImage(img, dx, dy, dw, dh)`.

use std::borrow::Cow;

use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg;
use thiserror::Error;

use crate::document::{attribute_value, root_svg_tag};
use crate::geometry::{contain_rect, device_pixels};

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Errors that can occur while rasterizing one SVG.
#[derive(Debug, Error)]
pub enum SvgError {
    /// The markup has no root `<svg>` element.
    #[error("Markup has no <svg> root element")]
    MissingRoot,

    /// `usvg` rejected the document.
    #[error("SVG parse failed: {0}")]
    Parse(String),

    /// The target pixmap could not be allocated.
    #[error("Cannot allocate a {width}x{height} pixmap")]
    Allocation { width: u32, height: u32 },
}

/// Make sure the root `<svg>` tag declares the SVG namespace.
///
/// Markup taken from an HTML document often omits `xmlns`, which standalone
/// SVG parsers require.
pub fn ensure_namespace(markup: &str) -> Result<Cow<'_, str>, SvgError> {
    let tag = root_svg_tag(markup).ok_or(SvgError::MissingRoot)?;
    if attribute_value(tag, "xmlns").is_some() {
        return Ok(Cow::Borrowed(markup));
    }

    let insert_at = markup.find("<svg").ok_or(SvgError::MissingRoot)? + "<svg".len();
    let mut out = String::with_capacity(markup.len() + SVG_NAMESPACE.len() + 10);
    out.push_str(&markup[..insert_at]);
    out.push_str(" xmlns=\"");
    out.push_str(SVG_NAMESPACE);
    out.push('"');
    out.push_str(&markup[insert_at..]);
    Ok(Cow::Owned(out))
}

/// A parsed SVG ready to be drawn.
pub struct SvgImage {
    tree: usvg::Tree,
}

impl SvgImage {
    /// Parse SVG bytes (standalone document).
    pub fn parse(data: &[u8]) -> Result<Self, SvgError> {
        let options = usvg::Options::default();
        let tree =
            usvg::Tree::from_data(data, &options).map_err(|e| SvgError::Parse(e.to_string()))?;
        Ok(Self { tree })
    }

    /// Parse inline markup, adding the namespace declaration when missing.
    pub fn parse_markup(markup: &str) -> Result<Self, SvgError> {
        let markup = ensure_namespace(markup)?;
        Self::parse(markup.as_bytes())
    }

    /// Natural size of the document (its `width`/`height`, falling back to
    /// the `viewBox`), never below one pixel per side.
    pub fn natural_size(&self) -> (f32, f32) {
        let size = self.tree.size();
        (size.width().max(1.0), size.height().max(1.0))
    }

    /// Rasterize into a `box_width x box_height` CSS-pixel box at `dpr`.
    ///
    /// Content of size `content` is fitted into the box with containment
    /// scaling; the rest of the canvas stays transparent.
    pub fn rasterize_contained(
        &self,
        box_width: f32,
        box_height: f32,
        content: (f32, f32),
        dpr: f32,
    ) -> Result<RgbaImage, SvgError> {
        let width = device_pixels(box_width, dpr);
        let height = device_pixels(box_height, dpr);
        let mut pixmap = Pixmap::new(width, height).ok_or(SvgError::Allocation { width, height })?;

        let (iw, ih) = content;
        let target = contain_rect(box_width, box_height, iw, ih).scaled(dpr);
        let (natural_w, natural_h) = self.natural_size();

        // Map the image's natural size onto the contained rectangle.
        let transform = Transform::from_row(
            target.width / natural_w,
            0.0,
            0.0,
            target.height / natural_h,
            target.x,
            target.y,
        );
        resvg::render(&self.tree, transform, &mut pixmap.as_mut());

        Ok(pixmap_to_rgba(&pixmap))
    }
}

/// Convert a premultiplied `tiny-skia` pixmap into a straight-alpha image.
fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut out = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}
