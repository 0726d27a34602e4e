// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! axum HTTP surface for the vision node
//!
//! Routes mirror the platform's public API: health probes, single-image
//! detect, batch detect and text extraction, plus the static demo UI.
//! Handlers only parse multipart input and shape JSON output; all vision
//! work happens in the service layer.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use image::DynamicImage;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::errors::ApiError;
use crate::config::Settings;
use crate::registry::ResourceStatus;
use crate::vision::{
    BatchAggregator, DetectionService, PipelineOrchestrator, PixelBox, TextRecognitionService,
    TextRegionService,
};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared handle bundle available to every handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub detection: Arc<DetectionService>,
    pub text_region: Arc<TextRegionService>,
    pub recognition: Arc<TextRecognitionService>,
    pub pipeline: Arc<PipelineOrchestrator>,
    pub batch: Arc<BatchAggregator>,
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.settings.static_dir.clone();

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(api_health_handler))
        .route("/api/detect", post(detect_handler))
        .route("/api/batch-detect", post(batch_detect_handler))
        .route("/api/extract-text", post(extract_text_handler))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = state.settings.socket_addr()?;
    let title = state.settings.api_title.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("{} listening on {}", title, addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn status_label(status: ResourceStatus) -> &'static str {
    // A Failed resource reports "pending" here; the failure itself
    // surfaces on the request that touches it.
    match status {
        ResourceStatus::Ready => "initialized",
        ResourceStatus::Pending | ResourceStatus::Failed => "pending",
    }
}

async fn api_health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "services": {
            "sam3": status_label(state.detection.status()),
            "dbnet": status_label(state.text_region.status()),
            "ocr": status_label(state.recognition.status()),
        },
        "config": {
            "device": state.settings.device,
            "lazy_load": state.settings.lazy_load_models,
        },
    }))
}

async fn detect_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut form = FormData::read(multipart).await?;
    let image = form.require_image("file")?;
    let prompts = parse_prompts(form.text("prompts").unwrap_or_default())?;
    let (width, height) = (image.width(), image.height());

    let output = state.pipeline.run_detect_and_localize(&image, &prompts).await?;

    Ok(Json(json!({
        "status": "success",
        "image_dims": { "width": width, "height": height },
        "results": output.results,
        "text_regions": output.text_regions,
        "timings": output.timings,
    })))
}

async fn batch_detect_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut form = FormData::read(multipart).await?;
    let images = form.require_images("files")?;
    let prompts = parse_prompts(form.text("prompts").unwrap_or_default())?;
    let thresholds = parse_thresholds(form.text("thresholds"))?;

    let summaries = state.batch.run_batch(&images, &prompts, &thresholds).await?;

    Ok(Json(json!({
        "status": "success",
        "batch_summary": summaries,
    })))
}

async fn extract_text_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut form = FormData::read(multipart).await?;
    let image = form.require_image("file")?;
    let regions = parse_regions(form.text("regions"))?;
    let model = form
        .text("model")
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "doctr".to_string());

    let (extracted, perf) = state
        .recognition
        .extract_text(&image, &regions, model.trim())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "extracted_text": extracted,
        "perf_stats": perf,
    })))
}

/// Collected multipart fields: repeated file fields in arrival order,
/// text fields by name
struct FormData {
    files: Vec<(String, String, Vec<u8>)>,
    texts: HashMap<String, String>,
}

impl FormData {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut files = Vec::new();
        let mut texts = HashMap::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if field.file_name().is_some() {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
                files.push((name, filename, bytes.to_vec()));
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read field: {}", e)))?;
                texts.insert(name, value);
            }
        }
        Ok(Self { files, texts })
    }

    fn text(&mut self, name: &str) -> Option<String> {
        self.texts.remove(name)
    }

    fn require_image(&mut self, name: &str) -> Result<DynamicImage, ApiError> {
        let index = self
            .files
            .iter()
            .position(|(field, _, _)| field == name)
            .ok_or_else(|| ApiError::bad_request(format!("Missing '{}' upload", name)))?;
        let (_, _, bytes) = self.files.remove(index);
        decode_image(&bytes)
    }

    fn require_images(&mut self, name: &str) -> Result<Vec<(String, DynamicImage)>, ApiError> {
        let mut images = Vec::new();
        for (field, filename, bytes) in self.files.drain(..) {
            if field == name {
                images.push((filename, decode_image(&bytes)?));
            }
        }
        if images.is_empty() {
            return Err(ApiError::bad_request(format!("Missing '{}' uploads", name)));
        }
        Ok(images)
    }
}

fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ApiError> {
    image::load_from_memory(bytes)
        .map_err(|e| ApiError::internal(format!("Failed to decode image: {}", e)))
}

/// Split a comma-separated prompt string; blank after trimming is a 400
fn parse_prompts(raw: String) -> Result<Vec<String>, ApiError> {
    let prompts: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if prompts.is_empty() {
        return Err(ApiError::bad_request("No prompt provided"));
    }
    Ok(prompts)
}

fn parse_thresholds(raw: Option<String>) -> Result<HashMap<String, f32>, ApiError> {
    match raw {
        None => Ok(HashMap::new()),
        Some(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| ApiError::bad_request(format!("Invalid thresholds JSON: {}", e))),
    }
}

#[derive(serde::Deserialize)]
struct RegionEntry {
    #[serde(rename = "box")]
    bounds: PixelBox,
}

fn parse_regions(raw: Option<String>) -> Result<Vec<PixelBox>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<RegionEntry> = serde_json::from_str(&raw)
        .map_err(|e| ApiError::bad_request(format!("Invalid regions JSON: {}", e)))?;
    Ok(entries.into_iter().map(|entry| entry.bounds).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompts_trims_and_drops_blanks() {
        let prompts = parse_prompts("cat, dog , ,bird".to_string()).unwrap();
        assert_eq!(prompts, vec!["cat", "dog", "bird"]);
    }

    #[test]
    fn test_parse_prompts_blank_is_rejected() {
        let err = parse_prompts(" , , ".to_string()).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.detail, "No prompt provided");
    }

    #[test]
    fn test_parse_thresholds() {
        let map = parse_thresholds(Some(r#"{"cat":0.6}"#.to_string())).unwrap();
        assert_eq!(map.get("cat"), Some(&0.6));
        assert!(parse_thresholds(None).unwrap().is_empty());
        assert!(parse_thresholds(Some("not json".to_string())).is_err());
    }

    #[test]
    fn test_parse_regions() {
        let regions = parse_regions(Some(r#"[{"box":[1,2,3,4]}]"#.to_string())).unwrap();
        assert_eq!(regions, vec![[1, 2, 3, 4]]);
        assert!(parse_regions(None).unwrap().is_empty());
        assert!(parse_regions(Some("[[1,2]]".to_string())).is_err());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(status_label(ResourceStatus::Ready), "initialized");
        assert_eq!(status_label(ResourceStatus::Pending), "pending");
        assert_eq!(status_label(ResourceStatus::Failed), "pending");
    }
}
