// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text-region localization service
//!
//! The localization model reports candidate boxes as raw rows of floats in
//! image-relative coordinates. The row layout comes from an external model
//! format that is only partially documented, so rows with unexpected arity
//! are skipped rather than treated as errors.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use tracing::info;

use crate::registry::{LazyResource, ResourceStatus};
use crate::vision::error::ServiceError;
use crate::vision::types::{clamp_box, relative_to_absolute, TextRegion};

/// Resource name used in logs and health reporting
pub const TEXT_REGION_RESOURCE: &str = "dbnet";

/// The localization model, treated as a black box
pub trait RegionDetector: Send + Sync {
    /// One inference pass; each row is expected to be
    /// `(xmin, ymin, xmax, ymax, score)` in relative coordinates, but the
    /// caller tolerates anything else by skipping it
    fn infer(&self, image: &DynamicImage) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Builds the localization handle on first use
#[async_trait]
pub trait RegionDetectorLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<Arc<dyn RegionDetector>>;
}

/// Localization over a lazily-loaded, process-lifetime resource
pub struct TextRegionService {
    resource: LazyResource<dyn RegionDetector>,
    loader: Box<dyn RegionDetectorLoader>,
}

impl TextRegionService {
    pub fn new(loader: Box<dyn RegionDetectorLoader>) -> Self {
        Self {
            resource: LazyResource::new(TEXT_REGION_RESOURCE),
            loader,
        }
    }

    pub fn status(&self) -> ResourceStatus {
        self.resource.status()
    }

    /// Force the resource to load now instead of on first request
    pub async fn warm_up(&self) -> Result<(), ServiceError> {
        self.resource.get_or_load(|| self.loader.load()).await?;
        Ok(())
    }

    /// Detect text-bearing regions in an image
    ///
    /// Relative boxes are converted to absolute pixels by rounding and
    /// clamped to the image; boxes without surviving area are dropped.
    pub async fn detect_text(
        &self,
        image: &DynamicImage,
    ) -> Result<Vec<TextRegion>, ServiceError> {
        let detector = self.resource.get_or_load(|| self.loader.load()).await?;

        let started = Instant::now();
        let rows = detector.infer(image).map_err(ServiceError::Inference)?;
        let (width, height) = image.dimensions();

        let mut regions = Vec::new();
        for row in rows {
            // Wrong arity: externally defined format, skip defensively.
            let row: [f32; 5] = match row.as_slice().try_into() {
                Ok(row) => row,
                Err(_) => continue,
            };
            let [xmin, ymin, xmax, ymax, score] = row;
            let bounds = relative_to_absolute([xmin, ymin, xmax, ymax], width, height);
            let Some(bounds) = clamp_box(bounds, width, height) else {
                continue;
            };
            regions.push(TextRegion {
                bounds,
                confidence: score,
            });
        }

        info!(
            "[PERF] DBNet Inference completed in {:.4}s | regions: {}",
            started.elapsed().as_secs_f64(),
            regions.len()
        );
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRegionDetector {
        rows: Vec<Vec<f32>>,
    }

    impl RegionDetector for FixedRegionDetector {
        fn infer(&self, _image: &DynamicImage) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(self.rows.clone())
        }
    }

    struct FixedLoader {
        rows: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl RegionDetectorLoader for FixedLoader {
        async fn load(&self) -> anyhow::Result<Arc<dyn RegionDetector>> {
            Ok(Arc::new(FixedRegionDetector {
                rows: self.rows.clone(),
            }))
        }
    }

    fn service(rows: Vec<Vec<f32>>) -> TextRegionService {
        TextRegionService::new(Box::new(FixedLoader { rows }))
    }

    #[tokio::test]
    async fn test_relative_rows_become_absolute_regions() {
        let svc = service(vec![vec![0.1, 0.2, 0.5, 0.6, 0.93]]);
        let image = DynamicImage::new_rgb8(1000, 500);
        let regions = svc.detect_text(&image).await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounds, [100, 100, 500, 300]);
        assert!((regions[0].confidence - 0.93).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_malformed_rows_skipped_silently() {
        let svc = service(vec![
            vec![0.0, 0.0, 0.5, 0.5],                  // too short
            vec![0.1, 0.1, 0.2, 0.2, 0.8, 1.0],       // too long
            vec![0.1, 0.1, 0.4, 0.4, 0.9],            // valid
        ]);
        let image = DynamicImage::new_rgb8(100, 100);
        let regions = svc.detect_text(&image).await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounds, [10, 10, 40, 40]);
    }

    #[tokio::test]
    async fn test_degenerate_boxes_dropped() {
        // Inverted after conversion; must not propagate.
        let svc = service(vec![vec![0.5, 0.5, 0.1, 0.1, 0.9]]);
        let image = DynamicImage::new_rgb8(100, 100);
        let regions = svc.detect_text(&image).await.unwrap();
        assert!(regions.is_empty());
    }
}
