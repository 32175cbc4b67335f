//! Render tree for the banner being captured.
//!
//! A [`Document`] is an arena of nodes mirroring what a browser would expose
//! for the banner frame: tag, id, classes, the rendered box in CSS pixels,
//! computed style, and content (inline SVG markup or an image source).
//!
//! The export pipeline never rewrites the caller's document. It clones it,
//! normalizes the clone, and rasterizes the result.
//!
//! # Building a document
//!
//! Documents are usually deserialized from a JSON description produced by
//! the page hosting the banner:
//!
//! ```ignore
//! let doc = Document::from_json(r#"{
//!     "url": "file:///deploy/summer/300x250/index.html",
//!     "body": { "tag": "body", "rect": {"x":0,"y":0,"width":300,"height":250},
//!               "children": [{ "tag": "img", "src": "img/bg.png",
//!                              "rect": {"x":0,"y":0,"width":300,"height":250} }] }
//! }"#)?;
//! ```

mod types;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use serde::Deserialize;
use url::Url;

use crate::geometry::Rect;

pub use types::{
    Content, DocumentError, ImageSource, ObjectFit, PointerEvents, Style, ViewBox,
};
pub(crate) use types::{attribute_value, root_svg_tag};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a loaded document. Clones share the id of their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Index of a node inside its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single element of the render tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Rendered box (bounding client rect) in CSS pixels, document coordinates.
    pub layout: Rect,
    pub style: Style,
    pub content: Content,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// JSON description of one element and its subtree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementSpec {
    pub tag: String,
    pub id: Option<String>,
    /// Space separated class list, as in the `class` attribute.
    pub class: Option<String>,
    pub rect: Rect,
    pub style: Style,
    /// Serialized markup for inline `<svg>` elements.
    pub svg: Option<String>,
    /// `src` attribute for `<img>` elements.
    pub src: Option<String>,
    pub children: Vec<ElementSpec>,
}

/// JSON description of a whole document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSpec {
    pub url: String,
    #[serde(default = "default_pixel_ratio")]
    pub device_pixel_ratio: f32,
    pub body: ElementSpec,
}

fn default_pixel_ratio() -> f32 {
    1.0
}

/// The render tree of a loaded banner frame.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    url: Url,
    device_pixel_ratio: f32,
    nodes: Vec<Node>,
}

impl Document {
    /// Create a document containing only a `<body>` with the given box.
    pub fn new(url: &str, device_pixel_ratio: f32, body: Rect) -> Result<Self, DocumentError> {
        let url = Url::parse(url).map_err(|e| DocumentError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let body = Node {
            tag: "body".to_string(),
            id: None,
            classes: Vec::new(),
            layout: body,
            style: Style::default(),
            content: Content::None,
            parent: None,
            children: Vec::new(),
        };

        Ok(Self {
            id: DocumentId::next(),
            url,
            device_pixel_ratio,
            nodes: vec![body],
        })
    }

    /// Build a document from its JSON-friendly description.
    pub fn from_spec(spec: &DocumentSpec) -> Result<Self, DocumentError> {
        let mut doc = Document::new(&spec.url, spec.device_pixel_ratio, spec.body.rect)?;
        let body = doc.body();
        {
            let node = &mut doc.nodes[body.0];
            node.id = spec.body.id.clone();
            node.classes = split_classes(spec.body.class.as_deref());
            node.style = spec.body.style.clone();
        }
        for child in &spec.body.children {
            doc.append(body, child)?;
        }
        Ok(doc)
    }

    /// Parse a JSON document description.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let spec: DocumentSpec =
            serde_json::from_str(json).map_err(|e| DocumentError::Malformed(e.to_string()))?;
        Document::from_spec(&spec)
    }

    /// Append `spec` (and its subtree) as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, spec: &ElementSpec) -> Result<NodeId, DocumentError> {
        self.check(parent)?;

        let content = match (&spec.svg, &spec.src) {
            (Some(markup), _) => Content::Svg {
                view_box: ViewBox::from_markup(markup),
                markup: markup.clone(),
            },
            (None, Some(src)) => Content::Image(ImageSource::Url(src.clone())),
            (None, None) => Content::None,
        };

        let tag = match (&content, spec.tag.is_empty()) {
            (Content::Svg { .. }, true) => "svg".to_string(),
            (Content::Image(_), true) => "img".to_string(),
            (_, true) => "div".to_string(),
            (_, false) => spec.tag.to_ascii_lowercase(),
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag,
            id: spec.id.clone(),
            classes: split_classes(spec.class.as_deref()),
            layout: spec.rect,
            style: spec.style.clone(),
            content,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);

        for child in &spec.children {
            self.append(id, child)?;
        }
        Ok(id)
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Raw `devicePixelRatio` of the frame.
    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    /// Pixel ratio used for rasterization: never below 1.
    pub fn effective_pixel_ratio(&self) -> f32 {
        if self.device_pixel_ratio.is_finite() {
            self.device_pixel_ratio.max(1.0)
        } else {
            1.0
        }
    }

    pub fn body(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// All node ids in document (pre-order) order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Inline `<svg>` elements in document order.
    pub fn svg_elements(&self) -> Vec<NodeId> {
        self.descendants(self.body())
            .into_iter()
            .filter(|id| matches!(self.nodes[id.0].content, Content::Svg { .. }))
            .collect()
    }

    /// `<img>` elements in document order.
    pub fn image_elements(&self) -> Vec<NodeId> {
        self.descendants(self.body())
            .into_iter()
            .filter(|id| matches!(self.nodes[id.0].content, Content::Image(_)))
            .collect()
    }

    /// First node matching a simple selector: `#id`, `.class` or `tag`.
    pub fn query_selector(&self, selector: &str) -> Option<NodeId> {
        let selector = selector.trim();
        let matches = |node: &Node| {
            if let Some(id) = selector.strip_prefix('#') {
                node.id.as_deref() == Some(id)
            } else if let Some(class) = selector.strip_prefix('.') {
                node.has_class(class)
            } else {
                node.tag.eq_ignore_ascii_case(selector)
            }
        };
        self.descendants(self.body())
            .into_iter()
            .find(|id| matches(&self.nodes[id.0]))
    }

    /// Resolve an image reference against the document URL.
    pub fn resolve_url(&self, raw: &str) -> Result<Url, url::ParseError> {
        self.url.join(raw)
    }

    /// Swap a node for an `<img>` showing `pixels`, keeping its box and
    /// layout style. The replacement ignores pointer events and renders with
    /// `object-fit: contain`, centered.
    pub fn replace_with_image(
        &mut self,
        id: NodeId,
        pixels: Arc<RgbaImage>,
    ) -> Result<(), DocumentError> {
        self.check(id)?;
        let node = &mut self.nodes[id.0];
        let mut style = node.style.layout_only();
        style.pointer_events = PointerEvents::None;
        style.object_fit = ObjectFit::Contain;
        style.object_position = Some("center".to_string());

        node.tag = "img".to_string();
        node.id = None;
        node.classes.clear();
        node.style = style;
        node.content = Content::Image(ImageSource::Inline(pixels));
        node.children.clear();
        Ok(())
    }

    fn check(&self, id: NodeId) -> Result<(), DocumentError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(DocumentError::UnknownNode(id.0))
        }
    }
}

fn split_classes(class: Option<&str>) -> Vec<String> {
    class
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
