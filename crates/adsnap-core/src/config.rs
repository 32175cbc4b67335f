//! Export settings.
//!
//! Every field has a default matching the preview tool's screenshot button,
//! so an empty JSON object is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::encode::ByteBudget;
use crate::raster::Color;

/// Settings for the `Exporter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportConfig {
    /// Opaque fill behind the captured surface.
    pub background: Color,
    /// Capture root candidates, tried in order before falling back to `<body>`.
    pub capture_selectors: Vec<String>,
    /// Upper bound on each SVG normalization unit, in milliseconds.
    /// `None` waits indefinitely.
    pub element_timeout_ms: Option<u64>,
    /// Delay standing in for one animation frame, in milliseconds.
    pub frame_interval_ms: u64,
    /// Load images whose origin differs from the document's.
    pub allow_cross_origin: bool,
    /// Budget used by `Exporter::export_default`.
    pub default_budget: ByteBudget,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            background: Color::MATTE,
            capture_selectors: vec!["#banner".into(), "#ad".into(), ".banner".into()],
            element_timeout_ms: Some(10_000),
            frame_interval_ms: 16,
            allow_cross_origin: true,
            default_budget: ByteBudget::DEFAULT,
        }
    }
}

impl ExportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn element_timeout(&self) -> Option<Duration> {
        self.element_timeout_ms.map(Duration::from_millis)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
