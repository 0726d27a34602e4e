// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX adapter for the text-localization model
//!
//! Output is handed to the service as raw rows: the model family's output
//! head has shipped with more than one layout, and the service layer is
//! the one that decides what to do with rows it does not understand.

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::models::preprocess::{image_to_nchw, ChannelOrder, LOCALIZER_INPUT_SIZE};
use crate::models::session::{build_session, OnnxSession};
use crate::vision::text_region::RegionDetector;

/// Text localizer backed by an ONNX session (exclusive-call)
#[derive(Debug)]
pub struct OnnxRegionDetector {
    session: Mutex<OnnxSession>,
}

impl OnnxRegionDetector {
    pub fn load(model_path: &Path) -> Result<Self> {
        if !model_path.exists() {
            anyhow::bail!(
                "Text localization model not found at {}",
                model_path.display()
            );
        }
        let session = build_session(model_path)?;
        info!("Text localizer loaded from {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl RegionDetector for OnnxRegionDetector {
    fn infer(&self, image: &DynamicImage) -> Result<Vec<Vec<f32>>> {
        // The model reports relative coordinates, so a plain exact resize
        // is safe: no aspect-ratio bookkeeping needed on the way back.
        let resized = image
            .resize_exact(
                LOCALIZER_INPUT_SIZE,
                LOCALIZER_INPUT_SIZE,
                image::imageops::FilterType::Triangle,
            )
            .to_rgb8();
        let tensor = image_to_nchw(&resized, ChannelOrder::Rgb);

        let mut session = self.session.lock().unwrap();
        let input_name = session.input_name(0).to_string();
        let outputs = session
            .run(ort::inputs![input_name.as_str() => Value::from_array(tensor)?])
            .context("Localization inference failed")?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract localization output")?;
        let shape = output.shape().to_vec();
        debug!("Localization output shape: {:?}", shape);

        // Accept [N, K] or [1, N, K]; flatten to rows of K floats.
        let (rows, row_len) = match shape.as_slice() {
            [n, k] => (*n, *k),
            [1, n, k] => (*n, *k),
            _ => return Ok(Vec::new()),
        };

        let flat: Vec<f32> = output.iter().copied().collect();
        Ok(flat
            .chunks(row_len)
            .take(rows)
            .map(|chunk| chunk.to_vec())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_model_names_path() {
        let err = OnnxRegionDetector::load(&PathBuf::from("/nonexistent/dbnet.onnx")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dbnet.onnx"));
    }
}
