// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision services: detection, localization, recognition and composition
//!
//! The services own lazily-loaded model resources and everything around
//! them: validation, coordinate conversion, failure isolation and timing.
//! The models themselves sit behind the `PromptDetector`, `RegionDetector`
//! and `RecognitionEngine` traits and are provided by `crate::models`.

pub mod detection;
pub mod error;
pub mod pipeline;
pub mod recognition;
pub mod text_region;
pub mod types;

pub use detection::{DetectionService, DetectorLoader, PrimedImage, PromptDetector};
pub use error::ServiceError;
pub use pipeline::{BatchAggregator, PipelineOrchestrator, PipelineOutput};
pub use recognition::{EngineKind, EngineLoader, RecognitionEngine, TextRecognitionService};
pub use text_region::{RegionDetector, RegionDetectorLoader, TextRegionService};
pub use types::{
    BatchSummary, ClassDetections, Detection, PerfStats, PixelBox, RecognizedText, StageTimings,
    TextRegion,
};
