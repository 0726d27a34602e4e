// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Vision Node

/// Full version string with feature description
pub const VERSION: &str = "v1.0.0-lazy-resources-2026-08-23";

/// Semantic version number
pub const VERSION_NUMBER: &str = "1.0.0";

/// Build date
pub const BUILD_DATE: &str = "2026-08-23";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "prompt-detection",
    "text-localization",
    "text-recognition",
    "batch-detection",
    "lazy-model-loading",
    "per-stage-timings",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Vision Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert_eq!(VERSION_NUMBER, "1.0.0");
        assert!(FEATURES.contains(&"lazy-model-loading"));
        assert!(FEATURES.contains(&"text-recognition"));
    }

    #[test]
    fn test_version_string() {
        let version = get_version_string();
        assert!(version.contains("1.0.0"));
        assert!(version.contains(BUILD_DATE));
    }
}
