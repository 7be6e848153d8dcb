//! Argument lists for yt-dlp invocations and input validation.

use super::YtDlpConfig;
use super::error::YtDlpError;
use regex::Regex;
use std::sync::LazyLock;

/// Base URL a resource id is appended to for downloading.
pub const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("id pattern is valid")
});

/// Validate a search phrase before it reaches the command line.
pub fn validate_phrase(phrase: &str) -> Result<&str, YtDlpError> {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return Err(YtDlpError::InvalidArgument("search phrase cannot be empty".to_string()));
    }
    if phrase.len() > 400 {
        return Err(YtDlpError::InvalidArgument(format!(
            "search phrase too long: {} chars (max 400)",
            phrase.len()
        )));
    }
    Ok(phrase)
}

/// Validate a resource id.
pub fn validate_id(id: &str) -> Result<&str, YtDlpError> {
    if ID_PATTERN.is_match(id) { Ok(id) } else { Err(YtDlpError::InvalidArgument(format!("invalid resource id: {id:?}"))) }
}

/// Arguments for a single-result metadata search.
pub fn search_args(phrase: &str) -> Vec<String> {
    vec![
        "--dump-json".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        format!("ytsearch1:{phrase}"),
    ]
}

/// Arguments for downloading and extracting audio for `id` into the audio dir.
pub fn download_args(config: &YtDlpConfig, id: &str) -> Vec<String> {
    let template = config.audio_dir.join("%(title)s.%(ext)s");
    let mut args = vec![
        "--extract-audio".to_string(),
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "--newline".to_string(),
        "--audio-format".to_string(),
        config.audio_format.clone(),
        "--audio-quality".to_string(),
        "0".to_string(),
    ];
    if let Some(location) = &config.ffmpeg_location {
        args.push("--ffmpeg-location".to_string());
        args.push(location.clone());
    }
    args.push("--output".to_string());
    args.push(template.to_string_lossy().into_owned());
    args.push(format!("{WATCH_URL}{id}"));
    args
}
