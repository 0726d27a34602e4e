// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX adapter for the prompt-conditioned detector
//!
//! Priming preprocesses the image into the model's input tensor once; each
//! prompt query encodes the prompt text and runs one inference pass against
//! that cached tensor.

use anyhow::{Context, Result};
use ndarray::{Array2, Array4, IxDyn};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::models::preprocess::{image_to_nchw, letterbox, ChannelOrder, DETECTOR_INPUT_SIZE};
use crate::models::session::{build_session, OnnxSession};
use crate::vision::detection::{PrimedImage, PromptDetector};
use crate::vision::types::Detection;

/// Prompt-conditioned detector backed by an ONNX session
///
/// The session is not assumed safe for concurrent runs; calls serialize on
/// an internal mutex (shared-but-exclusive-call policy).
#[derive(Debug)]
pub struct OnnxPromptDetector {
    session: Mutex<OnnxSession>,
    tokenizer: Tokenizer,
}

impl OnnxPromptDetector {
    /// Load the detector checkpoint and its prompt tokenizer
    pub fn load(checkpoint: &Path, tokenizer_path: &Path) -> Result<Self> {
        if !checkpoint.exists() {
            anyhow::bail!(
                "Model checkpoint not found at {}. Please download it from Hugging Face: \
                 https://huggingface.co/facebook/sam3",
                checkpoint.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Prompt tokenizer not found at {}",
                tokenizer_path.display()
            );
        }

        let session = build_session(checkpoint)?;
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load prompt tokenizer: {}", e))?;

        info!("Prompt detector loaded from {}", checkpoint.display());
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }
}

impl PromptDetector for OnnxPromptDetector {
    fn prime<'a>(
        &'a self,
        image: &image::DynamicImage,
    ) -> Result<Box<dyn PrimedImage + 'a>> {
        let boxed = letterbox(image, DETECTOR_INPUT_SIZE);
        let tensor = image_to_nchw(&boxed.image, ChannelOrder::Rgb);
        debug!("Primed detector input: {:?}", tensor.shape());
        Ok(Box::new(PrimedTensor {
            detector: self,
            tensor,
            scale: boxed.scale,
        }))
    }
}

struct PrimedTensor<'a> {
    detector: &'a OnnxPromptDetector,
    tensor: Array4<f32>,
    scale: f32,
}

impl PrimedImage for PrimedTensor<'_> {
    fn query(&self, prompt: &str) -> Result<Vec<Detection>> {
        let encoding = self
            .detector
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow::anyhow!("Failed to encode prompt: {}", e))?;
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let ids = Array2::from_shape_vec((1, ids.len()), ids)
            .context("Failed to build prompt id tensor")?;

        let mut session = self.detector.session.lock().unwrap();
        let image_name = session.input_name(0).to_string();
        let prompt_name = session.input_name(1).to_string();
        let outputs = session
            .run(ort::inputs![
                image_name.as_str() => Value::from_array(self.tensor.clone())?,
                prompt_name.as_str() => Value::from_array(ids)?,
            ])
            .context("Detection inference failed")?;

        let boxes = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract detection boxes")?;
        let scores = outputs[1]
            .try_extract_array::<f32>()
            .context("Failed to extract detection scores")?;

        // Boxes come back as [N, 4] or [1, N, 4] in model-input space.
        let box_shape = boxes.shape().to_vec();
        let (count, batched) = match box_shape.as_slice() {
            [n, 4] => (*n, false),
            [1, n, 4] => (*n, true),
            other => anyhow::bail!("Unexpected detection box shape: {:?}", other),
        };

        let score_at = |i: usize| -> f32 {
            let shape = scores.shape();
            match shape.len() {
                1 if i < shape[0] => scores[IxDyn(&[i])],
                2 if i < shape[1] => scores[IxDyn(&[0, i])],
                _ => 0.0,
            }
        };

        let mut detections = Vec::with_capacity(count);
        for i in 0..count {
            let coord = |c: usize| -> f32 {
                if batched {
                    boxes[IxDyn(&[0, i, c])]
                } else {
                    boxes[IxDyn(&[i, c])]
                }
            };
            detections.push(Detection {
                bounds: [
                    coord(0) / self.scale,
                    coord(1) / self.scale,
                    coord(2) / self.scale,
                    coord(3) / self.scale,
                ],
                score: score_at(i),
            });
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_checkpoint_names_path() {
        let missing = PathBuf::from("/nonexistent/sam3.onnx");
        let tokenizer = PathBuf::from("/nonexistent/tokenizer.json");
        let err = OnnxPromptDetector::load(&missing, &tokenizer).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sam3.onnx"));
        assert!(err.to_string().contains("checkpoint not found"));
    }
}
