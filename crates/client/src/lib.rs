//! Client code for tunecache.
//!
//! This crate provides the yt-dlp backed [`AudioSource`](tunecache_core::AudioSource)
//! used by the server to resolve phrases and download audio.

pub mod ytdlp;

pub use ytdlp::{YtDlpConfig, YtDlpError, YtDlpSource};
