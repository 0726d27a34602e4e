// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX adapters for the three text-recognition engines
//!
//! The engines share crop preprocessing and CTC greedy decoding; they
//! differ only in the tensor each one feeds its session: fixed-width RGB
//! for doctr, dynamic-width grayscale for easyocr, dynamic-width BGR for
//! paddle. Everything else about the three is deliberately symmetric.

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{Array4, ArrayViewD, IxDyn};
use ort::value::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::models::preprocess::{
    image_to_gray_nchw, image_to_nchw, resize_for_recognition, ChannelOrder, REC_MAX_WIDTH,
};
use crate::models::session::{build_session, OnnxSession};
use crate::vision::recognition::{EngineKind, RecognitionEngine};

/// Load a character dictionary: one character per line, index 0 reserved
/// for the CTC blank token
pub fn load_dictionary(path: &Path) -> Result<Vec<char>> {
    let file = File::open(path).context(format!(
        "Failed to open recognition dictionary: {}",
        path.display()
    ))?;
    let reader = BufReader::new(file);

    let mut dictionary = vec!['\u{0}']; // blank
    for line in reader.lines() {
        let line = line.context("Failed to read dictionary line")?;
        if let Some(ch) = line.chars().next() {
            dictionary.push(ch);
        }
    }
    if !dictionary.contains(&' ') {
        dictionary.push(' ');
    }
    Ok(dictionary)
}

/// CTC greedy decoding with repeat collapse and blank removal
///
/// Accepts `[batch, seq, classes]` or `[seq, classes]` logits. Confidence
/// is the mean probability of the emitted characters, 0.0 for an empty
/// emission.
pub fn ctc_greedy_decode(output: &ArrayViewD<f32>, dictionary: &[char]) -> Result<(String, f32)> {
    let shape = output.shape();
    let (seq_len, num_classes) = match shape.len() {
        3 => (shape[1], shape[2]),
        2 => (shape[0], shape[1]),
        _ => anyhow::bail!("Unexpected recognition output shape: {:?}", shape),
    };

    let mut text = String::new();
    let mut total = 0.0f32;
    let mut emitted = 0usize;
    let mut prev_index: Option<usize> = None;

    for t in 0..seq_len {
        let mut max_prob = f32::NEG_INFINITY;
        let mut max_index = 0usize;
        for c in 0..num_classes {
            let prob = if shape.len() == 3 {
                output[IxDyn(&[0, t, c])]
            } else {
                output[IxDyn(&[t, c])]
            };
            if prob > max_prob {
                max_prob = prob;
                max_index = c;
            }
        }

        // Blank is index 0; collapse repeats.
        if max_index != 0 && Some(max_index) != prev_index {
            if let Some(&ch) = dictionary.get(max_index) {
                text.push(ch);
                total += max_prob;
                emitted += 1;
            }
        }
        prev_index = if max_index == 0 { None } else { Some(max_index) };
    }

    let confidence = if emitted > 0 {
        (total / emitted as f32).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok((text, confidence))
}

fn run_and_decode(
    session: &Mutex<OnnxSession>,
    dictionary: &[char],
    tensor: Array4<f32>,
) -> Result<(String, f32)> {
    let mut session = session.lock().unwrap();
    let input_name = session.input_name(0).to_string();
    let outputs = session
        .run(ort::inputs![input_name.as_str() => Value::from_array(tensor)?])
        .context("Recognition inference failed")?;
    let output = outputs[0]
        .try_extract_array::<f32>()
        .context("Failed to extract recognition output")?;
    ctc_greedy_decode(&output.view(), dictionary)
}

fn load_engine_parts(model_path: &Path, dict_path: &Path, kind: EngineKind) -> Result<(Mutex<OnnxSession>, Vec<char>)> {
    if !model_path.exists() {
        anyhow::bail!(
            "Recognition model for '{}' not found at {}",
            kind,
            model_path.display()
        );
    }
    if !dict_path.exists() {
        anyhow::bail!(
            "Recognition dictionary for '{}' not found at {}",
            kind,
            dict_path.display()
        );
    }
    let session = build_session(model_path)?;
    let dictionary = load_dictionary(dict_path)?;
    info!(
        "Recognition engine '{}' loaded from {} ({} characters)",
        kind,
        model_path.display(),
        dictionary.len()
    );
    Ok((Mutex::new(session), dictionary))
}

/// doctr-style recognizer: fixed-width RGB input
#[derive(Debug)]
pub struct DoctrEngine {
    session: Mutex<OnnxSession>,
    dictionary: Vec<char>,
}

impl DoctrEngine {
    pub fn load(model_path: &Path, dict_path: &Path) -> Result<Self> {
        let (session, dictionary) = load_engine_parts(model_path, dict_path, EngineKind::Doctr)?;
        Ok(Self {
            session,
            dictionary,
        })
    }
}

impl RecognitionEngine for DoctrEngine {
    fn recognize(&self, crop: &RgbImage) -> Result<(String, f32)> {
        let resized = resize_for_recognition(crop, Some(REC_MAX_WIDTH));
        let tensor = image_to_nchw(&resized, ChannelOrder::Rgb);
        run_and_decode(&self.session, &self.dictionary, tensor)
    }
}

/// easyocr-style recognizer: dynamic-width grayscale input
pub struct EasyOcrEngine {
    session: Mutex<OnnxSession>,
    dictionary: Vec<char>,
}

impl EasyOcrEngine {
    pub fn load(model_path: &Path, dict_path: &Path) -> Result<Self> {
        let (session, dictionary) = load_engine_parts(model_path, dict_path, EngineKind::EasyOcr)?;
        Ok(Self {
            session,
            dictionary,
        })
    }
}

impl RecognitionEngine for EasyOcrEngine {
    fn recognize(&self, crop: &RgbImage) -> Result<(String, f32)> {
        let resized = resize_for_recognition(crop, None);
        let tensor = image_to_gray_nchw(&resized);
        run_and_decode(&self.session, &self.dictionary, tensor)
    }
}

/// paddle-style recognizer: dynamic-width input in BGR channel order
pub struct PaddleEngine {
    session: Mutex<OnnxSession>,
    dictionary: Vec<char>,
}

impl PaddleEngine {
    pub fn load(model_path: &Path, dict_path: &Path) -> Result<Self> {
        let (session, dictionary) = load_engine_parts(model_path, dict_path, EngineKind::Paddle)?;
        Ok(Self {
            session,
            dictionary,
        })
    }
}

impl RecognitionEngine for PaddleEngine {
    fn recognize(&self, crop: &RgbImage) -> Result<(String, f32)> {
        let resized = resize_for_recognition(crop, Some(REC_MAX_WIDTH));
        // This model family is trained on OpenCV input, so swap to BGR.
        let tensor = image_to_nchw(&resized, ChannelOrder::Bgr);
        run_and_decode(&self.session, &self.dictionary, tensor)
    }
}
