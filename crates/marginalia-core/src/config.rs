//! Engine configuration.
//!
//! Every section is `#[serde(default)]`, so a JSON file only needs the keys it
//! wants to override.

use crate::repository::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Io { path: String, message: String },
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Thresholds used by the gesture state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Minimum world distance between consecutive recorded stroke points.
    pub min_point_distance: f64,
    /// Eraser hit radius in screen pixels.
    pub eraser_radius_px: f64,
    /// Tap-to-select hit radius in screen pixels.
    pub tap_radius_px: f64,
    /// Touch hold before an attempt card can be dragged.
    pub hold_ms: u64,
    /// World distance that cancels a pending hold.
    pub hold_cancel_distance: f64,
    /// Padding around an attempt's ink that forms its card.
    pub card_padding: f64,
    /// Padding around a stroke selection's box.
    pub selection_padding: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            min_point_distance: 0.75,
            eraser_radius_px: 12.0,
            tap_radius_px: 10.0,
            hold_ms: 350,
            hold_cancel_distance: 6.0,
            card_padding: 16.0,
            selection_padding: 8.0,
        }
    }
}

/// Output encoding of a composite export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg {
        quality: u8,
    },
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg { .. } => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg { .. } => "jpg",
        }
    }
}

/// Page layout and output settings for composite export.
///
/// Pages are stacked top to bottom starting at `page_origin_y` in world
/// space, each as tall as its viewport at `reference_scale`, separated by
/// `page_gap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// World units per page unit at which the pager lays pages out.
    pub reference_scale: f64,
    /// Vertical gap between pages in world units.
    pub page_gap: f64,
    /// World x of every page's left edge.
    pub page_origin_x: f64,
    /// World y of the first page's top edge.
    pub page_origin_y: f64,
    /// Padding added around the attempt's ink in world units.
    pub padding: f64,
    /// Output pixels per world unit.
    pub output_scale: f64,
    pub format: ExportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            reference_scale: 1.0,
            page_gap: 16.0,
            page_origin_x: 0.0,
            page_origin_y: 24.0,
            padding: 24.0,
            output_scale: 2.0,
            format: ExportFormat::Png,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InkConfig {
    pub gesture: GestureConfig,
    pub export: ExportConfig,
    pub persistence: RetryPolicy,
}

impl InkConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }
}
