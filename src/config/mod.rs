// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Environment-driven service configuration
//!
//! All settings are read once at startup from environment variables with
//! sensible defaults, so the node runs out of the box against a local
//! `./models` directory.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime settings for the vision node
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind host for the HTTP server
    pub api_host: String,
    /// Bind port for the HTTP server
    pub api_port: u16,
    /// Human-readable service title used in startup logs
    pub api_title: String,
    /// Directory served under `/static` (and `/` for index.html)
    pub static_dir: PathBuf,
    /// Prompt-conditioned detector checkpoint (ONNX)
    pub sam3_checkpoint: PathBuf,
    /// Tokenizer file for encoding detection prompts
    pub sam3_tokenizer: PathBuf,
    /// Text-localization model (ONNX)
    pub dbnet_model: PathBuf,
    /// Directory holding the recognition engines (`<engine>.onnx` +
    /// `<engine>_dict.txt`)
    pub ocr_model_dir: PathBuf,
    /// Requested device ("cpu" or "cuda")
    pub device: String,
    /// When false, all model resources are loaded at startup instead of on
    /// first use
    pub lazy_load_models: bool,
}

impl Settings {
    /// Read settings from the environment, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8095),
            api_title: env::var("API_TITLE")
                .unwrap_or_else(|_| "SAM3 Rapid Platform".to_string()),
            static_dir: PathBuf::from(
                env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string()),
            ),
            sam3_checkpoint: PathBuf::from(
                env::var("SAM3_CHECKPOINT")
                    .unwrap_or_else(|_| "./models/sam3/sam3.onnx".to_string()),
            ),
            sam3_tokenizer: PathBuf::from(
                env::var("SAM3_TOKENIZER")
                    .unwrap_or_else(|_| "./models/sam3/tokenizer.json".to_string()),
            ),
            dbnet_model: PathBuf::from(
                env::var("DBNET_MODEL")
                    .unwrap_or_else(|_| "./models/dbnet/dbnet.onnx".to_string()),
            ),
            ocr_model_dir: PathBuf::from(
                env::var("OCR_MODEL_DIR").unwrap_or_else(|_| "./models/ocr".to_string()),
            ),
            device: env::var("DEVICE").unwrap_or_else(|_| "cpu".to_string()),
            lazy_load_models: env::var("LAZY_LOAD_MODELS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    /// Socket address the HTTP server binds to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid API_HOST/API_PORT: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Settings tests construct values directly instead of mutating process
    // environment, which would race with other tests.

    fn defaults() -> Settings {
        Settings {
            api_host: "0.0.0.0".to_string(),
            api_port: 8095,
            api_title: "SAM3 Rapid Platform".to_string(),
            static_dir: PathBuf::from("./static"),
            sam3_checkpoint: PathBuf::from("./models/sam3/sam3.onnx"),
            sam3_tokenizer: PathBuf::from("./models/sam3/tokenizer.json"),
            dbnet_model: PathBuf::from("./models/dbnet/dbnet.onnx"),
            ocr_model_dir: PathBuf::from("./models/ocr"),
            device: "cpu".to_string(),
            lazy_load_models: true,
        }
    }

    #[test]
    fn test_socket_addr() {
        let settings = defaults();
        let addr = settings.socket_addr().unwrap();
        assert_eq!(addr.port(), 8095);
    }

    #[test]
    fn test_socket_addr_invalid_host() {
        let settings = Settings {
            api_host: "not-an-ip".to_string(),
            ..defaults()
        };
        assert!(settings.socket_addr().is_err());
    }
}
