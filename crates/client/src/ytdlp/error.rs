//! Downloader process error types.

use std::time::Duration;

/// Errors from running the yt-dlp executable.
#[derive(Debug, thiserror::Error)]
pub enum YtDlpError {
    /// The executable could not be started.
    #[error("failed to start {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran past its deadline and was killed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The process exited unsuccessfully.
    #[error("exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// Invalid search phrase or resource id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The search produced no result.
    #[error("no results for {0:?}")]
    NoResults(String),

    /// Output could not be understood.
    #[error("parse error: {0}")]
    Parse(String),
}

impl YtDlpError {
    /// Map into the core error for a failed phrase -> id resolution.
    pub fn into_extraction(self) -> tunecache_core::Error {
        match self {
            YtDlpError::InvalidArgument(msg) => tunecache_core::Error::InvalidInput(msg),
            other => tunecache_core::Error::ExtractionFailed(other.to_string()),
        }
    }

    /// Map into the core error for a failed download.
    pub fn into_download(self) -> tunecache_core::Error {
        match self {
            YtDlpError::InvalidArgument(msg) => tunecache_core::Error::InvalidInput(msg),
            other => tunecache_core::Error::DownloadFailed(other.to_string()),
        }
    }
}
