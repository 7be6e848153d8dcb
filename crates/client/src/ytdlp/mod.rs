//! yt-dlp backed audio source.
//!
//! Runs the `yt-dlp` executable as a child process:
//!
//! - **Search**: `ytsearch1:<phrase>` with `--dump-json`, first result only.
//! - **Download**: `--extract-audio` into the audio directory using a
//!   `%(title)s.%(ext)s` template. The stored filename is taken from the
//!   `[ExtractAudio] Destination:` line of the output.
//! - **Deadlines**: every invocation is bounded; the child is killed when the
//!   deadline passes.
//! - **Concurrency**: downloads share a fixed number of permits.

pub mod command;
pub mod error;
pub mod response;

pub use error::YtDlpError;

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tunecache_core::registry::{DOWNLOADER_NAME, DOWNLOADER_VERSION};
use tunecache_core::{AppConfig, AudioSource, EntryMetadata, Error, Registry};

const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 2;

/// Stderr kept in error messages.
const STDERR_TAIL: usize = 512;

/// yt-dlp invocation settings.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Executable name or path (default: yt-dlp).
    pub bin: String,
    /// Directory extracted audio is written to.
    pub audio_dir: PathBuf,
    /// Target audio format (default: mp3).
    pub audio_format: String,
    /// Passed as `--ffmpeg-location` when set.
    pub ffmpeg_location: Option<String>,
    /// Deadline for searches and version probes (default: 60s).
    pub search_timeout: Duration,
    /// Deadline for one download (default: 10min).
    pub download_timeout: Duration,
    /// Downloads allowed to run at once (default: 2).
    pub max_concurrent_downloads: usize,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            bin: "yt-dlp".to_string(),
            audio_dir: PathBuf::from("./audio"),
            audio_format: "mp3".to_string(),
            ffmpeg_location: None,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
        }
    }
}

impl From<&AppConfig> for YtDlpConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            bin: config.downloader_bin.clone(),
            audio_dir: config.audio_dir.clone(),
            audio_format: config.audio_format.clone(),
            ffmpeg_location: config.ffmpeg_location.clone(),
            ..Default::default()
        }
    }
}

/// Audio source shelling out to yt-dlp.
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    config: YtDlpConfig,
    permits: Arc<Semaphore>,
}

impl YtDlpSource {
    pub fn new(config: YtDlpConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));
        Self { config, permits }
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// Ask the executable for its version and record name and version in the
    /// registry.
    pub async fn probe(&self, registry: &Registry) -> Result<String, YtDlpError> {
        let stdout = self.run(&["--version".to_string()], self.config.search_timeout).await?;
        let version =
            response::parse_version(&stdout).ok_or_else(|| YtDlpError::Parse("empty version output".to_string()))?;

        registry.register(DOWNLOADER_NAME, self.config.bin.clone());
        registry.register(DOWNLOADER_VERSION, version.clone());
        tracing::info!(bin = %self.config.bin, %version, "downloader available");
        Ok(version)
    }

    /// Search for `phrase` and return the first result's metadata.
    pub async fn search(&self, phrase: &str) -> Result<EntryMetadata, YtDlpError> {
        let phrase = command::validate_phrase(phrase)?;
        let start = Instant::now();
        tracing::debug!(%phrase, "searching via yt-dlp");

        let stdout = self.run(&command::search_args(phrase), self.config.search_timeout).await?;
        let metadata = response::parse_search_output(phrase, &stdout)?;

        tracing::debug!(%phrase, id = %metadata.id, elapsed = ?start.elapsed(), "search completed");
        Ok(metadata)
    }

    /// Download audio for `id`, returning the filename inside the audio dir.
    pub async fn fetch_audio(&self, id: &str) -> Result<String, YtDlpError> {
        let id = command::validate_id(id)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| YtDlpError::Parse("download permits closed".to_string()))?;

        tokio::fs::create_dir_all(&self.config.audio_dir)
            .await
            .map_err(|source| YtDlpError::Spawn { bin: self.config.bin.clone(), source })?;

        let start = Instant::now();
        tracing::info!(%id, "downloading audio");
        let stdout = self
            .run(&command::download_args(&self.config, id), self.config.download_timeout)
            .await?;

        let filename = response::parse_destination(&stdout)
            .ok_or_else(|| YtDlpError::Parse(format!("no destination reported for {id}")))?;
        tracing::info!(%id, %filename, elapsed = ?start.elapsed(), "download completed");
        Ok(filename)
    }

    async fn run(&self, args: &[String], deadline: Duration) -> Result<String, YtDlpError> {
        let spawn_err = |source| YtDlpError::Spawn { bin: self.config.bin.clone(), source };

        let child = Command::new(&self.config.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let output = tokio::time::timeout(deadline, child.wait_with_output())
            .await
            .map_err(|_| YtDlpError::Timeout(deadline))?
            .map_err(spawn_err)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail = stderr
                .char_indices()
                .rev()
                .nth(STDERR_TAIL)
                .map_or(stderr, |(idx, _)| &stderr[idx..]);
            return Err(YtDlpError::Failed { status: output.status.to_string(), stderr: tail.to_string() });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl AudioSource for YtDlpSource {
    async fn resolve_phrase(&self, phrase: &str) -> Result<EntryMetadata, Error> {
        self.search(phrase).await.map_err(YtDlpError::into_extraction)
    }

    async fn download(&self, id: &str) -> Result<String, Error> {
        self.fetch_audio(id).await.map_err(YtDlpError::into_download)
    }
}
