// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service-level error taxonomy
//!
//! Per-region recognition failures are not represented here: they are
//! converted to empty placeholder results inside the recognition loop and
//! never escape their item.

use thiserror::Error;

use crate::registry::{LoadError, RegistryError};

/// Errors surfaced by the vision services
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad caller input, rejected before any inference work
    #[error("{0}")]
    InvalidArgument(String),

    /// A lazy resource load failed; the same error is replayed until the
    /// process restarts
    #[error(transparent)]
    ResourceLoad(#[from] LoadError),

    /// The underlying model call failed; aborts the whole request
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unknown(name) => {
                ServiceError::InvalidArgument(format!("Unknown model name: {}", name))
            }
            RegistryError::Load(e) => ServiceError::ResourceLoad(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_registry_entry_is_invalid_argument() {
        let err: ServiceError = RegistryError::Unknown("foo".to_string()).into();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_load_error_message_preserved() {
        let load = LoadError {
            resource: "sam3".to_string(),
            message: "checkpoint not found".to_string(),
        };
        let err: ServiceError = load.into();
        assert!(err.to_string().contains("checkpoint not found"));
    }
}
