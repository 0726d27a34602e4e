// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text recognition service with selectable engines
//!
//! Three interchangeable recognition engines sit behind one capability
//! trait; the engine is picked per request by name from a closed set. The
//! crop loop and its failure policy are engine-independent: a region that
//! fails recognition yields an empty placeholder for that box only and the
//! rest of the batch proceeds.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, RgbImage};
use tracing::{info, warn};

use crate::registry::{ResourceRegistry, ResourceStatus};
use crate::vision::error::ServiceError;
use crate::vision::types::{clamp_box, PerfStats, PixelBox, RecognizedText};

/// The closed set of recognition engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Doctr,
    EasyOcr,
    Paddle,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Doctr, EngineKind::EasyOcr, EngineKind::Paddle];

    /// Engine picked when the request does not name one
    pub const DEFAULT: EngineKind = EngineKind::Doctr;

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Doctr => "doctr",
            EngineKind::EasyOcr => "easyocr",
            EngineKind::Paddle => "paddle",
        }
    }
}

impl FromStr for EngineKind {
    type Err = ServiceError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "doctr" => Ok(EngineKind::Doctr),
            "easyocr" => Ok(EngineKind::EasyOcr),
            "paddle" => Ok(EngineKind::Paddle),
            other => Err(ServiceError::InvalidArgument(format!(
                "Unknown model name: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recognition engine, treated as a black box
pub trait RecognitionEngine: Send + Sync {
    /// Recognize the text in one crop
    fn recognize(&self, crop: &RgbImage) -> anyhow::Result<(String, f32)>;
}

impl std::fmt::Debug for dyn RecognitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecognitionEngine")
    }
}

/// Builds an engine handle on first use of that engine
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, kind: EngineKind) -> anyhow::Result<Arc<dyn RecognitionEngine>>;
}

/// Recognition over a registry of lazily-loaded engines
pub struct TextRecognitionService {
    registry: ResourceRegistry<dyn RecognitionEngine>,
    loader: Box<dyn EngineLoader>,
}

impl TextRecognitionService {
    pub fn new(loader: Box<dyn EngineLoader>) -> Self {
        Self {
            registry: ResourceRegistry::new(EngineKind::ALL.iter().map(|k| k.as_str())),
            loader,
        }
    }

    /// Aggregate status: ready as soon as any engine has loaded
    pub fn status(&self) -> ResourceStatus {
        if self.registry.any_ready() {
            ResourceStatus::Ready
        } else {
            ResourceStatus::Pending
        }
    }

    pub fn engine_statuses(&self) -> Vec<(String, ResourceStatus)> {
        self.registry.statuses()
    }

    /// Force one engine to load now instead of on first request
    pub async fn warm_up(&self, kind: EngineKind) -> Result<(), ServiceError> {
        self.registry
            .get_or_load(kind.as_str(), || self.loader.load(kind))
            .await?;
        Ok(())
    }

    /// Recognize text in the given regions of an image
    ///
    /// The engine name is validated before any cropping work. An empty
    /// region list is a no-op that never touches the engine registry.
    /// Regions that clamp to zero area are dropped entirely; remaining
    /// regions appear in the output in input order, with per-region
    /// failures downgraded to `{"", 0.0}` placeholders.
    pub async fn extract_text(
        &self,
        image: &DynamicImage,
        regions: &[PixelBox],
        engine_name: &str,
    ) -> Result<(Vec<RecognizedText>, PerfStats), ServiceError> {
        let kind = EngineKind::from_str(engine_name)?;

        if regions.is_empty() {
            return Ok((Vec::new(), PerfStats::default()));
        }

        let started = Instant::now();
        let rgb = image.to_rgb8();
        let (width, height) = image.dimensions();

        let mut crops: Vec<(PixelBox, RgbImage)> = Vec::with_capacity(regions.len());
        for &bounds in regions {
            let Some([x1, y1, x2, y2]) = clamp_box(bounds, width, height) else {
                continue;
            };
            let crop = image::imageops::crop_imm(
                &rgb,
                x1 as u32,
                y1 as u32,
                (x2 - x1) as u32,
                (y2 - y1) as u32,
            )
            .to_image();
            // Echo the caller's box, not the clamped one.
            crops.push((bounds, crop));
        }
        let preprocess = started.elapsed().as_secs_f64();

        if crops.is_empty() {
            return Ok((Vec::new(), PerfStats::default()));
        }

        let engine = self
            .registry
            .get_or_load(kind.as_str(), || self.loader.load(kind))
            .await?;

        let started = Instant::now();
        let mut extracted = Vec::with_capacity(crops.len());
        for (bounds, crop) in &crops {
            match engine.recognize(crop) {
                Ok((text, confidence)) => extracted.push(RecognizedText {
                    bounds: *bounds,
                    text,
                    confidence,
                }),
                Err(e) => {
                    warn!("{} error on crop {:?}: {:#}", kind, bounds, e);
                    extracted.push(RecognizedText {
                        bounds: *bounds,
                        text: String::new(),
                        confidence: 0.0,
                    });
                }
            }
        }
        let inference = started.elapsed().as_secs_f64();

        info!(
            "[PERF] OCR ({}) completed in {:.4}s | crops: {} | preprocess: {:.4}s",
            kind,
            inference,
            crops.len(),
            preprocess
        );
        Ok((
            extracted,
            PerfStats {
                preprocess,
                inference,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoEngine;

    impl RecognitionEngine for EchoEngine {
        fn recognize(&self, crop: &RgbImage) -> anyhow::Result<(String, f32)> {
            // 1x1 crops are the designated failures in these tests.
            if crop.width() == 1 && crop.height() == 1 {
                anyhow::bail!("unreadable crop");
            }
            Ok((format!("{}x{}", crop.width(), crop.height()), 0.88))
        }
    }

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EngineLoader for CountingLoader {
        async fn load(&self, _kind: EngineKind) -> anyhow::Result<Arc<dyn RecognitionEngine>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoEngine))
        }
    }

    fn service(loads: Arc<AtomicUsize>) -> TextRecognitionService {
        TextRecognitionService::new(Box::new(CountingLoader { loads }))
    }

    #[tokio::test]
    async fn test_empty_regions_touch_no_resource() {
        let loads = Arc::new(AtomicUsize::new(0));
        let svc = service(loads.clone());
        let image = DynamicImage::new_rgb8(64, 64);

        let (texts, stats) = svc.extract_text(&image, &[], "doctr").await.unwrap();
        assert!(texts.is_empty());
        assert_eq!(stats, PerfStats::default());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(svc.status(), ResourceStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_engine_fails_before_cropping() {
        let loads = Arc::new(AtomicUsize::new(0));
        let svc = service(loads.clone());
        let image = DynamicImage::new_rgb8(64, 64);

        let err = svc
            .extract_text(&image, &[[0, 0, 10, 10]], "foo")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_degenerate_regions_dropped_not_placeholder() {
        let loads = Arc::new(AtomicUsize::new(0));
        let svc = service(loads);
        let image = DynamicImage::new_rgb8(64, 64);

        let regions = [[10i64, 10, 30, 30], [50, 50, 40, 60], [200, 0, 210, 10]];
        let (texts, _) = svc.extract_text(&image, &regions, "doctr").await.unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].bounds, [10, 10, 30, 30]);
    }

    #[tokio::test]
    async fn test_per_crop_failure_isolated() {
        let loads = Arc::new(AtomicUsize::new(0));
        let svc = service(loads);
        let image = DynamicImage::new_rgb8(64, 64);

        // Middle region crops to 1x1, which EchoEngine rejects.
        let regions = [[0i64, 0, 20, 20], [5, 5, 6, 6], [30, 30, 60, 60]];
        let (texts, _) = svc.extract_text(&image, &regions, "doctr").await.unwrap();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[0].text, "20x20");
        assert_eq!(texts[1].text, "");
        assert_eq!(texts[1].confidence, 0.0);
        assert_eq!(texts[2].text, "30x30");
        assert!(texts[2].confidence > 0.8);
    }

    #[tokio::test]
    async fn test_engine_loaded_once_and_region_clamped_box_echoed() {
        let loads = Arc::new(AtomicUsize::new(0));
        let svc = service(loads.clone());
        let image = DynamicImage::new_rgb8(64, 64);

        // Overhanging box is clamped for cropping but echoed verbatim.
        let regions = [[-5i64, -5, 20, 20]];
        let (texts, _) = svc.extract_text(&image, &regions, "paddle").await.unwrap();
        assert_eq!(texts[0].bounds, [-5, -5, 20, 20]);
        assert_eq!(texts[0].text, "20x20");

        svc.extract_text(&image, &regions, "paddle").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(svc.status(), ResourceStatus::Ready);
    }

    #[test]
    fn test_engine_kind_round_trip() {
        for kind in EngineKind::ALL {
            assert_eq!(EngineKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(EngineKind::DEFAULT, EngineKind::Doctr);
        assert!(EngineKind::from_str("tesseract").is_err());
    }
}
