//! Node payload types for the render tree.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raster::Color;

/// Errors raised while building or querying a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document URL is not absolute or cannot be parsed.
    #[error("Invalid document URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A node id does not belong to this document.
    #[error("Unknown node id {0}")]
    UnknownNode(usize),

    /// A `viewBox` attribute could not be parsed.
    #[error("Invalid viewBox: {0:?}")]
    InvalidViewBox(String),

    /// The JSON description of a document is malformed.
    #[error("Malformed document description: {0}")]
    Malformed(String),
}

/// An SVG `viewBox`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewBox {
    pub min_x: f32,
    pub min_y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewBox {
    pub fn new(min_x: f32, min_y: f32, width: f32, height: f32) -> Self {
        Self {
            min_x,
            min_y,
            width,
            height,
        }
    }

    /// Content dimensions, if both are usable (non-zero).
    pub fn content_size(&self) -> Option<(f32, f32)> {
        (self.width > 0.0 && self.height > 0.0).then_some((self.width, self.height))
    }

    /// Read the `viewBox` attribute from the root `<svg>` tag of `markup`.
    ///
    /// Returns `None` when the attribute is absent or malformed.
    pub fn from_markup(markup: &str) -> Option<ViewBox> {
        let open = root_svg_tag(markup)?;
        let value = attribute_value(open, "viewBox")?;
        value.parse().ok()
    }
}

impl FromStr for ViewBox {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nums: Vec<f32> = s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| DocumentError::InvalidViewBox(s.to_string()))?;

        match nums.as_slice() {
            [x, y, w, h] => Ok(ViewBox::new(*x, *y, *w, *h)),
            _ => Err(DocumentError::InvalidViewBox(s.to_string())),
        }
    }
}

/// Return the text of the opening `<svg ...>` tag.
pub(crate) fn root_svg_tag(markup: &str) -> Option<&str> {
    let start = markup.find("<svg")?;
    let end = markup[start..].find('>')? + start;
    Some(&markup[start..end])
}

/// Extract a quoted attribute value from an opening tag.
pub(crate) fn attribute_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = tag;
    while let Some(pos) = rest.find(name) {
        let preceded_by_space = rest[..pos]
            .chars()
            .last()
            .is_some_and(|c| c.is_whitespace());
        let after = rest[pos + name.len()..].trim_start();
        if preceded_by_space {
            if let Some(after_eq) = after.strip_prefix('=') {
                let after_eq = after_eq.trim_start();
                let quote = after_eq.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let body = &after_eq[1..];
                    let close = body.find(quote)?;
                    return Some(&body[..close]);
                }
            }
        }
        rest = &rest[pos + name.len()..];
    }
    None
}

/// `pointer-events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointerEvents {
    #[default]
    Auto,
    None,
}

/// `object-fit` for replaced content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectFit {
    /// Stretch to the box.
    #[default]
    Fill,
    /// Aspect-preserving fit, centered, no cropping.
    Contain,
}

/// Computed style of a node.
///
/// Layout properties are kept as computed CSS strings so they can be copied
/// verbatim onto replacement nodes; the rasterizer itself works from the
/// node's layout box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Style {
    pub width: Option<String>,
    pub height: Option<String>,
    pub position: Option<String>,
    pub left: Option<String>,
    pub top: Option<String>,
    pub right: Option<String>,
    pub bottom: Option<String>,
    pub transform: Option<String>,
    pub transform_origin: Option<String>,
    pub display: Option<String>,
    pub z_index: Option<String>,
    pub background_color: Option<Color>,
    pub pointer_events: PointerEvents,
    pub object_fit: ObjectFit,
    pub object_position: Option<String>,
}

impl Style {
    /// Copy of the layout-affecting properties only.
    pub fn layout_only(&self) -> Style {
        Style {
            width: self.width.clone(),
            height: self.height.clone(),
            position: self.position.clone(),
            left: self.left.clone(),
            top: self.top.clone(),
            right: self.right.clone(),
            bottom: self.bottom.clone(),
            transform: self.transform.clone(),
            transform_origin: self.transform_origin.clone(),
            display: self.display.clone(),
            z_index: self.z_index.clone(),
            ..Style::default()
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.display.as_deref().map(str::trim) == Some("none")
    }

    /// Integer stacking order; `auto` and unparsable values count as 0.
    pub fn stacking_order(&self) -> i32 {
        self.z_index
            .as_deref()
            .and_then(|z| z.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Where an image node gets its pixels from.
#[derive(Clone, PartialEq)]
pub enum ImageSource {
    /// The `src` attribute as written (relative or absolute).
    Url(String),
    /// Pixels produced in-process, the equivalent of a `data:` URL.
    Inline(Arc<RgbaImage>),
}

impl ImageSource {
    pub fn as_url(&self) -> Option<&str> {
        match self {
            ImageSource::Url(url) => Some(url),
            ImageSource::Inline(_) => None,
        }
    }

    /// True when the source names an SVG file (`*.svg` or `*.svg?query`).
    pub fn is_svg_reference(&self) -> bool {
        self.as_url()
            .is_some_and(|url| url.ends_with(".svg") || url.contains(".svg?"))
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            ImageSource::Inline(img) => write!(f, "Inline({}x{})", img.width(), img.height()),
        }
    }
}

/// What a node renders besides its background.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Content {
    #[default]
    None,
    /// An inline `<svg>` element, kept as serialized markup.
    Svg {
        markup: String,
        view_box: Option<ViewBox>,
    },
    /// An `<img>` element.
    Image(ImageSource),
}
