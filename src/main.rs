// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::env;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use vision_node::api::{start_server, AppState};
use vision_node::config::Settings;
use vision_node::models::{OnnxDetectorLoader, OnnxEngineLoader, OnnxRegionDetectorLoader};
use vision_node::version::{BUILD_DATE, VERSION};
use vision_node::vision::{
    BatchAggregator, DetectionService, EngineKind, PipelineOrchestrator, TextRecognitionService,
    TextRegionService,
};

#[tokio::main]
async fn main() -> Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let settings = Arc::new(Settings::from_env());
    info!("Starting {} {} ({})", settings.api_title, VERSION, BUILD_DATE);

    if settings.device != "cpu" {
        // The device setting is accepted for compatibility; this build only
        // ships the CPU execution provider.
        warn!(
            "DEVICE={} requested but this build runs models on CPU",
            settings.device
        );
    }

    let detection = Arc::new(DetectionService::new(Box::new(OnnxDetectorLoader {
        checkpoint: settings.sam3_checkpoint.clone(),
        tokenizer: settings.sam3_tokenizer.clone(),
    })));
    let text_region = Arc::new(TextRegionService::new(Box::new(OnnxRegionDetectorLoader {
        model: settings.dbnet_model.clone(),
    })));
    let recognition = Arc::new(TextRecognitionService::new(Box::new(OnnxEngineLoader {
        model_dir: settings.ocr_model_dir.clone(),
    })));

    if !settings.lazy_load_models {
        info!("LAZY_LOAD_MODELS disabled, loading all models now");
        detection.warm_up().await?;
        text_region.warm_up().await?;
        recognition.warm_up(EngineKind::DEFAULT).await?;
    }

    let pipeline = Arc::new(PipelineOrchestrator::new(
        detection.clone(),
        text_region.clone(),
    ));
    let batch = Arc::new(BatchAggregator::new(detection.clone()));

    let state = AppState {
        settings,
        detection,
        text_region,
        recognition,
        pipeline,
        batch,
    };
    start_server(state).await
}
