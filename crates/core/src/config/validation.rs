//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, SUPPORTED_AUDIO_FORMATS};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - any of the store paths or the audio directory is empty
    /// - `downloader_bin` is empty
    /// - `audio_format` is not one the downloader can extract
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, path) in [
            ("db_path", &self.db_path),
            ("legacy_cache_path", &self.legacy_cache_path),
            ("audio_dir", &self.audio_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
        }

        if self.downloader_bin.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "downloader_bin".into(), reason: "must not be empty".into() });
        }

        if !SUPPORTED_AUDIO_FORMATS.contains(&self.audio_format.as_str()) {
            return Err(ConfigError::Invalid {
                field: "audio_format".into(),
                reason: format!("must be one of {}", SUPPORTED_AUDIO_FORMATS.join(", ")),
            });
        }

        if self.legacy_cache_path == self.db_path {
            return Err(ConfigError::Invalid {
                field: "legacy_cache_path".into(),
                reason: "must differ from db_path".into(),
            });
        }

        if self.export_path.as_ref().is_some_and(|p| p == &self.legacy_cache_path) {
            tracing::warn!(
                path = %self.legacy_cache_path.display(),
                "export_path equals legacy_cache_path; exports will overwrite the legacy document"
            );
        }

        Ok(())
    }
}
