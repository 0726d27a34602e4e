// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pipeline composition over the vision services
//!
//! Pure composition: the orchestrator and aggregator sequence service
//! calls, measure stage timings and aggregate counts. They contain no
//! model logic of their own. Stage-level failures are not isolated: if a
//! stage fails, the whole run fails with no partial result.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use tracing::info;

use crate::vision::detection::{DetectionService, DETECTION_RESOURCE};
use crate::vision::error::ServiceError;
use crate::vision::text_region::{TextRegionService, TEXT_REGION_RESOURCE};
use crate::vision::types::{BatchSummary, ClassDetections, StageTimings, TextRegion};

/// Score threshold applied to classes absent from the request's map
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// Combined result of one detect-and-localize run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub results: Vec<ClassDetections>,
    pub text_regions: Vec<TextRegion>,
    pub timings: StageTimings,
}

/// Sequences detection and localization over one image with stage timing
pub struct PipelineOrchestrator {
    detection: Arc<DetectionService>,
    text_region: Arc<TextRegionService>,
}

impl PipelineOrchestrator {
    pub fn new(detection: Arc<DetectionService>, text_region: Arc<TextRegionService>) -> Self {
        Self {
            detection,
            text_region,
        }
    }

    /// Run both stages against one image and report per-stage wall clock
    ///
    /// The stages have no data dependency on each other; detection runs
    /// first by convention.
    pub async fn run_detect_and_localize(
        &self,
        image: &DynamicImage,
        prompts: &[String],
    ) -> Result<PipelineOutput, ServiceError> {
        let total = Instant::now();
        let mut timings = StageTimings::new();

        let stage = Instant::now();
        let results = self.detection.detect(image, prompts).await?;
        timings.record(DETECTION_RESOURCE, stage.elapsed());

        let stage = Instant::now();
        let text_regions = self.text_region.detect_text(image).await?;
        timings.record(TEXT_REGION_RESOURCE, stage.elapsed());

        timings.finish(total.elapsed());
        Ok(PipelineOutput {
            results,
            text_regions,
            timings,
        })
    }
}

/// Runs detection across a batch of images and keeps per-class counts
pub struct BatchAggregator {
    detection: Arc<DetectionService>,
}

impl BatchAggregator {
    pub fn new(detection: Arc<DetectionService>) -> Self {
        Self { detection }
    }

    /// Detect on each image and count detections above threshold
    ///
    /// For each class, only detections with
    /// `score >= thresholds.get(class).unwrap_or(0.5)` are counted; the
    /// raw detections are discarded after counting. Images are processed
    /// independently but one image's failure fails the whole batch.
    pub async fn run_batch(
        &self,
        images: &[(String, DynamicImage)],
        prompts: &[String],
        thresholds: &HashMap<String, f32>,
    ) -> Result<Vec<BatchSummary>, ServiceError> {
        let started = Instant::now();
        let mut summaries = Vec::with_capacity(images.len());

        for (filename, image) in images {
            let results = self.detection.detect(image, prompts).await?;
            summaries.push(BatchSummary {
                filename: filename.clone(),
                counts: count_surviving(results, thresholds),
            });
        }

        info!(
            "[PERF] Batch Detection completed in {:.4}s | files: {}",
            started.elapsed().as_secs_f64(),
            images.len()
        );
        Ok(summaries)
    }
}

fn count_surviving(
    results: Vec<ClassDetections>,
    thresholds: &HashMap<String, f32>,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for result in results {
        let threshold = thresholds
            .get(&result.class)
            .copied()
            .unwrap_or(DEFAULT_SCORE_THRESHOLD);
        let surviving = result
            .detections
            .iter()
            .filter(|d| d.score >= threshold)
            .count();
        counts.insert(result.class, surviving);
    }
    counts
}
