//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TUNECACHE_*)
//! 2. TOML config file (if TUNECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Audio formats the downloader may be asked to extract.
pub const SUPPORTED_AUDIO_FORMATS: &[&str] = &["mp3", "m4a", "opus", "vorbis", "flac", "wav"];

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TUNECACHE_*)
/// 2. TOML config file (if TUNECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite resource cache.
    ///
    /// Set via TUNECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Path to the legacy flat JSON cache document.
    ///
    /// Set via TUNECACHE_LEGACY_CACHE_PATH environment variable.
    #[serde(default = "default_legacy_cache_path")]
    pub legacy_cache_path: PathBuf,

    /// Directory downloaded audio files are written to and served from.
    ///
    /// Set via TUNECACHE_AUDIO_DIR environment variable.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    /// Where to write the phrase -> filename projection after each change.
    ///
    /// Set via TUNECACHE_EXPORT_PATH environment variable. Disabled when unset.
    #[serde(default)]
    pub export_path: Option<PathBuf>,

    /// Downloader executable (yt-dlp compatible).
    ///
    /// Set via TUNECACHE_DOWNLOADER_BIN environment variable.
    #[serde(default = "default_downloader_bin")]
    pub downloader_bin: String,

    /// Directory or binary path handed to the downloader as `--ffmpeg-location`.
    ///
    /// Set via TUNECACHE_FFMPEG_LOCATION environment variable.
    #[serde(default)]
    pub ffmpeg_location: Option<String>,

    /// Audio format to extract.
    ///
    /// Set via TUNECACHE_AUDIO_FORMAT environment variable.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Whether to fold the legacy flat cache into the database on startup.
    ///
    /// Set via TUNECACHE_MIGRATE_ON_START environment variable.
    #[serde(default = "default_true")]
    pub migrate_on_start: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cache.db")
}

fn default_legacy_cache_path() -> PathBuf {
    PathBuf::from("./cache.json")
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("./audio")
}

fn default_downloader_bin() -> String {
    "yt-dlp".into()
}

fn default_audio_format() -> String {
    "mp3".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            legacy_cache_path: default_legacy_cache_path(),
            audio_dir: default_audio_dir(),
            export_path: None,
            downloader_bin: default_downloader_bin(),
            ffmpeg_location: None,
            audio_format: default_audio_format(),
            migrate_on_start: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TUNECACHE_`
    /// 2. TOML file from `TUNECACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TUNECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TUNECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
