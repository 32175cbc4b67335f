//! Banner catalog, size types and fragment routing.
//!
//! The preview tool lists banner groups, each with a list of sizes. The
//! current selection lives in the URL fragment as `#/<group>/<size>`;
//! out-of-range or garbage indices are clamped rather than rejected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::ContentSize;

/// Directory holding deployed banner builds.
pub const DEPLOY_DIR: &str = "deploy";
/// Directory holding zipped banner builds.
pub const ZIP_DIR: &str = "zip";

/// Size of a banner item: a standard IAB code or explicit dimensions.
///
/// Any other JSON value is kept as `Other` so one odd entry does not fail
/// the whole catalog; it sizes like an unknown code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BannerType {
    Custom { w: f32, h: f32 },
    Named(String),
    Other(serde_json::Value),
}

impl BannerType {
    /// Display size for this type. Unknown codes and non-finite custom
    /// dimensions fall back to the medium rectangle (300x250).
    pub fn size(&self) -> ContentSize {
        match self {
            BannerType::Custom { w, h } if w.is_finite() && h.is_finite() => {
                ContentSize::new(*w, *h)
            }
            BannerType::Custom { .. } | BannerType::Other(_) => MEDIUM_RECTANGLE,
            BannerType::Named(code) => match code.as_str() {
                "SS" => ContentSize::new(160.0, 600.0),
                "BB" => MEDIUM_RECTANGLE,
                "DBB" => ContentSize::new(300.0, 600.0),
                "LB" => ContentSize::new(728.0, 90.0),
                _ => MEDIUM_RECTANGLE,
            },
        }
    }
}

const MEDIUM_RECTANGLE: ContentSize = ContentSize {
    width: 300.0,
    height: 250.0,
};

/// Display size for an optional banner type.
pub fn size_from_type(kind: Option<&BannerType>) -> ContentSize {
    kind.map(BannerType::size).unwrap_or(MEDIUM_RECTANGLE)
}

/// One size of a banner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BannerItem {
    #[serde(default)]
    pub title: Option<String>,
    /// Path of the build under [`DEPLOY_DIR`]; missing when not yet delivered.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<BannerType>,
}

impl BannerItem {
    pub fn is_available(&self) -> bool {
        self.path.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn size(&self) -> ContentSize {
        size_from_type(self.kind.as_ref())
    }
}

/// A named group of banner sizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BannerGroup {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub list: Vec<BannerItem>,
}

/// Everything the preview tool shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub banners: Vec<BannerGroup>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Heading shown above the list.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("BANNERS")
    }

    /// Resolve a route, clamping both indices into range.
    ///
    /// Returns `None` when the catalog or the chosen group is empty.
    pub fn select(&self, route: Route) -> Option<Selection<'_>> {
        let group_index = clamp_index(route.group, self.banners.len().checked_sub(1)?);
        let group = &self.banners[group_index];
        let size_index = clamp_index(route.size, group.list.len().checked_sub(1)?);

        Some(Selection {
            group_index,
            size_index,
            group,
            item: &group.list[size_index],
        })
    }

    /// Resolve a URL fragment such as `#/1/2`.
    pub fn select_hash(&self, hash: &str) -> Option<Selection<'_>> {
        self.select(Route::parse(hash))
    }
}

/// Clamp a possibly missing or negative index into `0..=max`.
pub fn clamp_index(n: Option<i64>, max: usize) -> usize {
    match n {
        Some(n) if n > 0 => (n as u64).min(max as u64) as usize,
        _ => 0,
    }
}

/// Group and size indices as carried by the URL fragment.
///
/// `None` means the segment was missing or not a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Route {
    pub group: Option<i64>,
    pub size: Option<i64>,
}

impl Route {
    pub fn new(group: usize, size: usize) -> Self {
        Self {
            group: Some(group as i64),
            size: Some(size as i64),
        }
    }

    /// Parse `#/<group>/<size>`. Empty segments are ignored and missing
    /// segments count as index 0.
    pub fn parse(hash: &str) -> Self {
        let raw = hash.strip_prefix('#').unwrap_or(hash);
        let mut parts = raw.split('/').filter(|p| !p.is_empty());
        let group = parse_leading_int(parts.next().unwrap_or("0"));
        let size = parse_leading_int(parts.next().unwrap_or("0"));
        Self { group, size }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#/{}/{}",
            self.group.unwrap_or(0),
            self.size.unwrap_or(0)
        )
    }
}

/// Parse an optionally signed run of leading digits, ignoring what follows
/// (`"12abc"` is 12, `"abc"` is `None`). Values too large for `i64`
/// saturate, so an oversized index still clamps to the last entry.
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return None;
    }

    let n = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -n } else { n })
}

/// The item currently shown in the preview frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<'a> {
    pub group_index: usize,
    pub size_index: usize,
    pub group: &'a BannerGroup,
    pub item: &'a BannerItem,
}

impl Selection<'_> {
    pub fn route(&self) -> Route {
        Route::new(self.group_index, self.size_index)
    }

    pub fn group_title(&self) -> String {
        self.group
            .title
            .clone()
            .unwrap_or_else(|| format!("Banner {}", self.group_index + 1))
    }

    pub fn item_title(&self) -> String {
        self.item
            .title
            .clone()
            .unwrap_or_else(|| format!("Size {}", self.size_index + 1))
    }

    /// Size the preview frame is set to.
    pub fn content_size(&self) -> ContentSize {
        self.item.size()
    }

    pub fn frame_src(&self) -> Option<String> {
        banner_src(self.item.path.as_deref())
    }

    pub fn zip_href(&self) -> Option<String> {
        zip_src(self.item.path.as_deref())
    }

    /// Download name for a screenshot of this selection.
    pub fn export_filename(&self) -> String {
        export_filename(self.item.path.as_deref(), self.group.title.as_deref())
    }
}

fn strip_leading_slash(path: Option<&str>) -> Option<&str> {
    let path = path?;
    let safe = path.strip_prefix('/').unwrap_or(path);
    (!safe.is_empty()).then_some(safe)
}

/// Entry page of a deployed banner build.
pub fn banner_src(path: Option<&str>) -> Option<String> {
    strip_leading_slash(path).map(|p| format!("{DEPLOY_DIR}/{p}/index.html"))
}

/// Zip archive of a banner build.
pub fn zip_src(path: Option<&str>) -> Option<String> {
    strip_leading_slash(path).map(|p| format!("{ZIP_DIR}/{p}.zip"))
}

/// Make a string safe for use as a file name.
///
/// Runs of characters other than ASCII word characters and `-` become a
/// single `_`; leading and trailing `_` are removed.
pub fn safe_filename(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            if c == '_' && out.ends_with('_') {
                continue;
            }
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// `<name>.jpg`, named after the item path, else the group title, else
/// `banner`.
pub fn export_filename(path: Option<&str>, group_title: Option<&str>) -> String {
    let source = [path, group_title]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or("banner");
    format!("{}.jpg", safe_filename(source))
}
