// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Domain types shared across the vision services
//!
//! Boxes are axis-aligned `[x1, y1, x2, y2]` rectangles. Unless stated
//! otherwise they are in absolute pixel coordinates; model output that
//! arrives in image-relative (0-1) coordinates is converted on the way in.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Axis-aligned box in absolute pixel coordinates: `[x1, y1, x2, y2]`
pub type PixelBox = [i64; 4];

/// One detection returned for a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    /// `[x1, y1, x2, y2]` in absolute pixels
    #[serde(rename = "box")]
    pub bounds: [f32; 4],
    /// Detection score in `[0, 1]`
    pub score: f32,
}

/// All detections for one prompt (one semantic class)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDetections {
    /// The prompt string this result answers
    pub class: String,
    /// Always equals `detections.len()`
    pub count: usize,
    pub detections: Vec<Detection>,
}

impl ClassDetections {
    pub fn new(class: String, detections: Vec<Detection>) -> Self {
        Self {
            class,
            count: detections.len(),
            detections,
        }
    }
}

/// A candidate text-bearing region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextRegion {
    /// `[x1, y1, x2, y2]` in absolute pixels, clamped to the image
    #[serde(rename = "box")]
    pub bounds: PixelBox,
    /// Localization confidence in `[0, 1]`
    pub confidence: f32,
}

/// Recognized text for one input region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedText {
    /// The input region's box, echoed back unmodified
    #[serde(rename = "box")]
    pub bounds: PixelBox,
    /// Recognized text; empty when recognition failed for this region
    pub text: String,
    /// Recognition confidence; 0.0 when recognition failed for this region
    pub confidence: f32,
}

/// Preprocess/inference timing split for one recognition call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PerfStats {
    /// Seconds spent cropping and converting regions
    pub preprocess: f64,
    /// Seconds spent in the recognition engine
    pub inference: f64,
}

/// Per-class surviving-detection counts for one image of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub filename: String,
    pub counts: BTreeMap<String, usize>,
}

/// Wall-clock timing of one pipeline run, keyed by stage name
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    stages: BTreeMap<String, f64>,
    total: f64,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &str, elapsed: Duration) {
        self.stages.insert(stage.to_string(), elapsed.as_secs_f64());
    }

    pub fn finish(&mut self, total: Duration) {
        self.total = total.as_secs_f64();
    }

    pub fn stage(&self, name: &str) -> Option<f64> {
        self.stages.get(name).copied()
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

impl Serialize for StageTimings {
    /// Wire form is flat: each stage keyed by name, plus `"total"`
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.stages.len() + 1))?;
        for (stage, seconds) in &self.stages {
            map.serialize_entry(stage, seconds)?;
        }
        map.serialize_entry("total", &self.total)?;
        map.end()
    }
}

/// Convert an image-relative box to absolute pixels by rounding
pub fn relative_to_absolute(rel: [f32; 4], width: u32, height: u32) -> PixelBox {
    [
        (rel[0] * width as f32).round() as i64,
        (rel[1] * height as f32).round() as i64,
        (rel[2] * width as f32).round() as i64,
        (rel[3] * height as f32).round() as i64,
    ]
}

/// Clamp a box to image bounds, dropping it if no area survives
///
/// Returns `None` for boxes that clamp to zero or negative area; those must
/// never propagate downstream, not even as empty placeholders.
pub fn clamp_box(bounds: PixelBox, width: u32, height: u32) -> Option<PixelBox> {
    let [x1, y1, x2, y2] = bounds;
    let x1 = x1.max(0);
    let y1 = y1.max(0);
    let x2 = x2.min(width as i64);
    let y2 = y2.min(height as i64);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some([x1, y1, x2, y2])
}
