// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service-level integration over mock model implementations

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use vision_node::vision::detection::{
    DetectionService, DetectorLoader, PrimedImage, PromptDetector,
};
use vision_node::vision::recognition::{
    EngineKind, EngineLoader, RecognitionEngine, TextRecognitionService,
};
use vision_node::vision::text_region::{RegionDetector, RegionDetectorLoader, TextRegionService};
use vision_node::vision::{BatchAggregator, Detection, PipelineOrchestrator, ServiceError};

struct ScriptedPrimed {
    scores: HashMap<String, Vec<f32>>,
}

impl PrimedImage for ScriptedPrimed {
    fn query(&self, prompt: &str) -> anyhow::Result<Vec<Detection>> {
        Ok(self
            .scores
            .get(prompt)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|score| Detection {
                bounds: [0.0, 0.0, 10.0, 10.0],
                score,
            })
            .collect())
    }
}

struct ScriptedDetector {
    scores: HashMap<String, Vec<f32>>,
}

impl PromptDetector for ScriptedDetector {
    fn prime<'a>(&'a self, _image: &DynamicImage) -> anyhow::Result<Box<dyn PrimedImage + 'a>> {
        Ok(Box::new(ScriptedPrimed {
            scores: self.scores.clone(),
        }))
    }
}

struct ScriptedDetectorLoader {
    scores: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl DetectorLoader for ScriptedDetectorLoader {
    async fn load(&self) -> anyhow::Result<Arc<dyn PromptDetector>> {
        Ok(Arc::new(ScriptedDetector {
            scores: self.scores.clone(),
        }))
    }
}

struct FixedRegionLoader {
    rows: Vec<Vec<f32>>,
}

struct FixedRegionDetector {
    rows: Vec<Vec<f32>>,
}

impl RegionDetector for FixedRegionDetector {
    fn infer(&self, _image: &DynamicImage) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(self.rows.clone())
    }
}

#[async_trait]
impl RegionDetectorLoader for FixedRegionLoader {
    async fn load(&self) -> anyhow::Result<Arc<dyn RegionDetector>> {
        Ok(Arc::new(FixedRegionDetector {
            rows: self.rows.clone(),
        }))
    }
}

fn detection_service(scores: HashMap<String, Vec<f32>>) -> Arc<DetectionService> {
    Arc::new(DetectionService::new(Box::new(ScriptedDetectorLoader {
        scores,
    })))
}

#[tokio::test]
async fn test_pipeline_reports_all_stage_timings() {
    let detection = detection_service(HashMap::from([("cat".to_string(), vec![0.9])]));
    let text_region = Arc::new(TextRegionService::new(Box::new(FixedRegionLoader {
        rows: vec![vec![0.1, 0.1, 0.5, 0.5, 0.8]],
    })));
    let pipeline = PipelineOrchestrator::new(detection, text_region);

    let image = DynamicImage::new_rgb8(100, 100);
    let output = pipeline
        .run_detect_and_localize(&image, &["cat".to_string()])
        .await
        .unwrap();

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].class, "cat");
    assert_eq!(output.text_regions.len(), 1);
    assert!(output.timings.stage("sam3").is_some());
    assert!(output.timings.stage("dbnet").is_some());
    assert!(output.timings.total() >= output.timings.stage("sam3").unwrap());
}

#[tokio::test]
async fn test_batch_counts_with_per_class_thresholds() {
    let detection = detection_service(HashMap::from([
        ("cat".to_string(), vec![0.5, 0.7]),
        ("dog".to_string(), vec![0.9]),
    ]));
    let batch = BatchAggregator::new(detection);

    let images = vec![
        ("one.jpg".to_string(), DynamicImage::new_rgb8(10, 10)),
        ("two.jpg".to_string(), DynamicImage::new_rgb8(10, 10)),
    ];
    let prompts = vec!["cat".to_string(), "dog".to_string()];
    let thresholds = HashMap::from([("cat".to_string(), 0.6)]);

    let summaries = batch.run_batch(&images, &prompts, &thresholds).await.unwrap();
    assert_eq!(summaries.len(), 2);
    for summary in &summaries {
        assert_eq!(summary.counts.get("cat"), Some(&1));
        assert_eq!(summary.counts.get("dog"), Some(&1));
    }
    assert_eq!(summaries[0].filename, "one.jpg");
}

struct FlakyEngine;

impl RecognitionEngine for FlakyEngine {
    fn recognize(&self, crop: &RgbImage) -> anyhow::Result<(String, f32)> {
        // Narrow crops fail, everything else reads fine.
        if crop.width() < 10 {
            anyhow::bail!("crop too narrow");
        }
        Ok(("HELLO".to_string(), 0.95))
    }
}

struct CountingEngineLoader {
    loads: Arc<AtomicUsize>,
}

#[async_trait]
impl EngineLoader for CountingEngineLoader {
    async fn load(&self, _kind: EngineKind) -> anyhow::Result<Arc<dyn RecognitionEngine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FlakyEngine))
    }
}

fn recognition_service(loads: Arc<AtomicUsize>) -> TextRecognitionService {
    TextRecognitionService::new(Box::new(CountingEngineLoader { loads }))
}

#[tokio::test]
async fn test_per_crop_failure_is_isolated() {
    let svc = recognition_service(Arc::new(AtomicUsize::new(0)));
    let image = DynamicImage::new_rgb8(100, 100);
    // Second region is 5px wide and makes the engine fail.
    let regions = vec![[0, 0, 50, 20], [60, 0, 65, 20], [0, 30, 50, 50]];

    let (extracted, _) = svc.extract_text(&image, &regions, "doctr").await.unwrap();
    assert_eq!(extracted.len(), 3);
    assert_eq!(extracted[0].text, "HELLO");
    assert_eq!(extracted[1].text, "");
    assert_eq!(extracted[1].confidence, 0.0);
    assert_eq!(extracted[2].text, "HELLO");
    // Failed crops still echo their input box.
    assert_eq!(extracted[1].bounds, [60, 0, 65, 20]);
}

#[tokio::test]
async fn test_empty_regions_never_touch_the_registry() {
    let loads = Arc::new(AtomicUsize::new(0));
    let svc = recognition_service(loads.clone());
    let image = DynamicImage::new_rgb8(100, 100);

    let (extracted, perf) = svc.extract_text(&image, &[], "doctr").await.unwrap();
    assert!(extracted.is_empty());
    assert_eq!(perf.preprocess, 0.0);
    assert_eq!(perf.inference, 0.0);
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_engine_rejected_before_any_work() {
    let loads = Arc::new(AtomicUsize::new(0));
    let svc = recognition_service(loads.clone());
    let image = DynamicImage::new_rgb8(100, 100);

    let err = svc
        .extract_text(&image, &[[0, 0, 50, 20]], "foo")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));
    assert!(err.to_string().contains("foo"));
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_degenerate_regions_dropped_from_output() {
    let svc = recognition_service(Arc::new(AtomicUsize::new(0)));
    let image = DynamicImage::new_rgb8(100, 100);
    // Entirely outside the image; clamps to nothing.
    let regions = vec![[200, 200, 300, 300], [0, 0, 50, 20]];

    let (extracted, _) = svc.extract_text(&image, &regions, "doctr").await.unwrap();
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].bounds, [0, 0, 50, 20]);
}
