//! Banner catalog bindings for the preview page.
//!
//! The page passes the parsed `banners.json` object and `location.hash`;
//! everything it needs to render the current banner comes back in one
//! plain object.

use adsnap_core::catalog::{self, Catalog, Route, Selection};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// What the preview page shows for the current route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsSelection {
    pub group_index: usize,
    pub size_index: usize,
    pub group_title: String,
    pub item_title: String,
    pub width: f32,
    pub height: f32,
    /// Canonical fragment, e.g. `#/0/2`; the page replaces `location.hash`
    /// with it when it differs.
    pub hash: String,
    pub src: Option<String>,
    pub zip: Option<String>,
    pub filename: String,
}

impl From<Selection<'_>> for JsSelection {
    fn from(sel: Selection<'_>) -> Self {
        let size = sel.content_size();
        Self {
            group_index: sel.group_index,
            size_index: sel.size_index,
            group_title: sel.group_title(),
            item_title: sel.item_title(),
            width: size.width,
            height: size.height,
            hash: sel.route().to_string(),
            src: sel.frame_src(),
            zip: sel.zip_href(),
            filename: sel.export_filename(),
        }
    }
}

fn resolve(catalog: &Catalog, hash: &str) -> Option<JsSelection> {
    catalog.select(Route::parse(hash)).map(JsSelection::from)
}

/// Resolve `hash` against a catalog object.
///
/// Returns `null` when the catalog, or the selected group, has no items.
#[wasm_bindgen]
pub fn select_banner(catalog: JsValue, hash: &str) -> Result<JsValue, JsValue> {
    let catalog: Catalog =
        serde_wasm_bindgen::from_value(catalog).map_err(|e| JsValue::from_str(&e.to_string()))?;

    match resolve(&catalog, hash) {
        Some(selection) => serde_wasm_bindgen::to_value(&selection)
            .map_err(|e| JsValue::from_str(&e.to_string())),
        None => Ok(JsValue::NULL),
    }
}

/// Download name for a screenshot: `<path or group title or "banner">.jpg`.
#[wasm_bindgen]
pub fn export_filename(path: Option<String>, group_title: Option<String>) -> String {
    catalog::export_filename(path.as_deref(), group_title.as_deref())
}

#[wasm_bindgen]
pub fn safe_filename(s: &str) -> String {
    catalog::safe_filename(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_json(
            r#"{"banners": [{"title": "Spring", "list": [
                {"path": "spring/300x250", "type": "BB"},
                {"title": "Wide", "path": "/spring/728x90", "type": "LB"}
            ]}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_selection() {
        let sel = resolve(&catalog(), "#/0/1").unwrap();
        assert_eq!(sel.item_title, "Wide");
        assert_eq!(sel.group_title, "Spring");
        assert_eq!((sel.width, sel.height), (728.0, 90.0));
        assert_eq!(sel.src.as_deref(), Some("deploy/spring/728x90/index.html"));
        assert_eq!(sel.zip.as_deref(), Some("zip/spring/728x90.zip"));
        assert_eq!(sel.filename, "spring_728x90.jpg");
    }

    #[test]
    fn test_resolve_normalizes_hash() {
        let sel = resolve(&catalog(), "#/7/-2").unwrap();
        assert_eq!(sel.hash, "#/0/0");
        assert_eq!(sel.item_title, "Size 1");
    }

    #[test]
    fn test_resolve_empty_catalog() {
        assert!(resolve(&Catalog::default(), "#/0/0").is_none());
    }

    #[test]
    fn test_filename_bindings() {
        assert_eq!(export_filename(None, Some("My Group".into())), "My_Group.jpg");
        assert_eq!(export_filename(None, None), "banner.jpg");
        assert_eq!(safe_filename(" a b "), "a_b");
    }
}
