// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX-backed implementations of the model trait boundaries
//!
//! Everything in here is an opaque collaborator from the services' point
//! of view: loaded from a configured path, called through a narrow trait,
//! CPU-only. Loads run on the blocking pool because session construction
//! can take seconds.

pub mod preprocess;
pub mod prompt_detector;
pub mod recognizer;
pub mod region_detector;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::vision::detection::{DetectorLoader, PromptDetector};
use crate::vision::recognition::{EngineKind, EngineLoader, RecognitionEngine};
use crate::vision::text_region::{RegionDetector, RegionDetectorLoader};

pub use prompt_detector::OnnxPromptDetector;
pub use recognizer::{DoctrEngine, EasyOcrEngine, PaddleEngine};
pub use region_detector::OnnxRegionDetector;

/// Loads the prompt-conditioned detector from disk on first use
pub struct OnnxDetectorLoader {
    pub checkpoint: PathBuf,
    pub tokenizer: PathBuf,
}

#[async_trait]
impl DetectorLoader for OnnxDetectorLoader {
    async fn load(&self) -> anyhow::Result<Arc<dyn PromptDetector>> {
        let checkpoint = self.checkpoint.clone();
        let tokenizer = self.tokenizer.clone();
        let detector =
            tokio::task::spawn_blocking(move || OnnxPromptDetector::load(&checkpoint, &tokenizer))
                .await??;
        Ok(Arc::new(detector))
    }
}

/// Loads the text-localization model from disk on first use
pub struct OnnxRegionDetectorLoader {
    pub model: PathBuf,
}

#[async_trait]
impl RegionDetectorLoader for OnnxRegionDetectorLoader {
    async fn load(&self) -> anyhow::Result<Arc<dyn RegionDetector>> {
        let model = self.model.clone();
        let detector =
            tokio::task::spawn_blocking(move || OnnxRegionDetector::load(&model)).await??;
        Ok(Arc::new(detector))
    }
}

/// Loads recognition engines from `<dir>/<engine>.onnx` +
/// `<dir>/<engine>_dict.txt` on first use of each engine
pub struct OnnxEngineLoader {
    pub model_dir: PathBuf,
}

impl OnnxEngineLoader {
    fn model_path(&self, kind: EngineKind) -> PathBuf {
        self.model_dir.join(format!("{}.onnx", kind.as_str()))
    }

    fn dict_path(&self, kind: EngineKind) -> PathBuf {
        self.model_dir.join(format!("{}_dict.txt", kind.as_str()))
    }
}

#[async_trait]
impl EngineLoader for OnnxEngineLoader {
    async fn load(&self, kind: EngineKind) -> anyhow::Result<Arc<dyn RecognitionEngine>> {
        let model = self.model_path(kind);
        let dict = self.dict_path(kind);
        let engine = tokio::task::spawn_blocking(
            move || -> anyhow::Result<Arc<dyn RecognitionEngine>> {
                Ok(match kind {
                    EngineKind::Doctr => Arc::new(DoctrEngine::load(&model, &dict)?),
                    EngineKind::EasyOcr => Arc::new(EasyOcrEngine::load(&model, &dict)?),
                    EngineKind::Paddle => Arc::new(PaddleEngine::load(&model, &dict)?),
                })
            },
        )
        .await??;
        Ok(engine)
    }
}
