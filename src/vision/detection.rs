// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prompt-conditioned object detection service
//!
//! The detector itself is an opaque collaborator behind [`PromptDetector`]:
//! it is primed with the image once per call and then queried once per
//! prompt. This service owns the lazy resource handle and the conversion to
//! the wire result shape.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::info;

use crate::registry::{LazyResource, ResourceStatus};
use crate::vision::error::ServiceError;
use crate::vision::types::{ClassDetections, Detection};

/// Resource name used in logs and health reporting
pub const DETECTION_RESOURCE: &str = "sam3";

/// A detector primed with one image, queryable once per prompt
pub trait PrimedImage: Send {
    /// Detections for one prompt, boxes in absolute pixel coordinates
    fn query(&self, prompt: &str) -> anyhow::Result<Vec<Detection>>;
}

/// The prompt-conditioned detection model, treated as a black box
pub trait PromptDetector: Send + Sync {
    /// Prime the detector with an image; expensive, done once per call
    fn prime<'a>(&'a self, image: &DynamicImage) -> anyhow::Result<Box<dyn PrimedImage + 'a>>;
}

/// Builds the detector handle on first use
#[async_trait]
pub trait DetectorLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<Arc<dyn PromptDetector>>;
}

/// Detection over a lazily-loaded, process-lifetime detector resource
pub struct DetectionService {
    resource: LazyResource<dyn PromptDetector>,
    loader: Box<dyn DetectorLoader>,
}

impl DetectionService {
    pub fn new(loader: Box<dyn DetectorLoader>) -> Self {
        Self {
            resource: LazyResource::new(DETECTION_RESOURCE),
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

    /// Run detection for each prompt in order against one image
    ///
    /// Prompts are evaluated independently; duplicates get their own
    /// result entry. A detector failure aborts the whole call.
    pub async fn detect(
        &self,
        image: &DynamicImage,
        prompts: &[String],
    ) -> Result<Vec<ClassDetections>, ServiceError> {
        let detector = self.resource.get_or_load(|| self.loader.load()).await?;

        let started = Instant::now();
        let primed = detector.prime(image).map_err(ServiceError::Inference)?;

        let mut results = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let detections = primed.query(prompt).map_err(ServiceError::Inference)?;
            results.push(ClassDetections::new(prompt.clone(), detections));
        }

        info!(
            "[PERF] SAM3 Inference completed in {:.4}s | prompts: {}",
            started.elapsed().as_secs_f64(),
            prompts.len()
        );
        Ok(results)
    }
}
