// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX Runtime session construction shared by all model adapters

use std::ops::{Deref, DerefMut};
use std::path::Path;

use anyhow::{Context, Result};
use ort::ep::CPU as CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::debug;

/// An ONNX session plus its discovered input names
///
/// Vision models run on the CPU execution provider only, so they never
/// compete for GPU memory with anything else on the host.
#[derive(Debug)]
pub struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
}

impl OnnxSession {
    /// Input name at `index`, falling back to `"input"` for models that do
    /// not declare names
    pub fn input_name(&self, index: usize) -> &str {
        self.input_names
            .get(index)
            .map(String::as_str)
            .unwrap_or("input")
    }
}

impl Deref for OnnxSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for OnnxSession {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// Build a CPU-only session from an ONNX file
pub fn build_session(model_path: &Path) -> Result<OnnxSession> {
    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(ort::Error::<()>::from)
        .context("Failed to set CPU execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(ort::Error::<()>::from)
        .context("Failed to set optimization level")?
        .with_intra_threads(4)
        .map_err(ort::Error::<()>::from)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .context(format!(
            "Failed to load ONNX model from {}",
            model_path.display()
        ))?;

    let input_names: Vec<String> = session
        .inputs()
        .iter()
        .map(|input| input.name().to_string())
        .collect();
    debug!(
        "Session loaded from {} with inputs {:?}",
        model_path.display(),
        input_names
    );

    Ok(OnnxSession {
        session,
        input_names,
    })
}
