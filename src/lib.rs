// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision node: prompt-conditioned detection, text localization and text
//! recognition behind one HTTP API, with all model resources loaded
//! lazily on first use.

pub mod api;
pub mod config;
pub mod models;
pub mod registry;
pub mod version;
pub mod vision;

pub use config::Settings;
pub use registry::{LazyResource, LoadError, RegistryError, ResourceRegistry, ResourceStatus};
pub use vision::{
    BatchAggregator, DetectionService, EngineKind, PipelineOrchestrator, ServiceError,
    TextRecognitionService, TextRegionService,
};
