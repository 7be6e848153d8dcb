//! yt-dlp output parsing.

use super::error::YtDlpError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;
use tunecache_core::EntryMetadata;

/// Line yt-dlp prints once the extracted audio file is in place.
static DESTINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(?:ExtractAudio|ffmpeg)\] (?:Destination: (?P<dest>.+)|Not converting audio (?P<kept>.+); file is already in target format)",
    )
    .expect("destination pattern is valid")
});

/// One search result as dumped by `--dump-json`.
#[derive(Debug, Deserialize)]
pub struct SearchEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
}

impl From<SearchEntry> for EntryMetadata {
    fn from(entry: SearchEntry) -> Self {
        EntryMetadata {
            id: entry.id,
            title: entry.title,
            artist: entry.artist,
            channel: entry.channel.or(entry.uploader),
            filename: None,
        }
    }
}

/// Parse the first result of a `--dump-json` search.
pub fn parse_search_output(phrase: &str, stdout: &str) -> Result<EntryMetadata, YtDlpError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .ok_or_else(|| YtDlpError::NoResults(phrase.to_string()))?;
    let entry: SearchEntry = serde_json::from_str(line).map_err(|e| YtDlpError::Parse(e.to_string()))?;
    if entry.id.is_empty() {
        return Err(YtDlpError::Parse("search result has an empty id".to_string()));
    }
    Ok(entry.into())
}

/// Extract the audio filename from download output, relative to the audio dir.
///
/// The last matching line wins, since post-processors may report more than once.
pub fn parse_destination(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let caps = DESTINATION.captures(line.trim_end())?;
            caps.name("dest").or_else(|| caps.name("kept")).map(|m| m.as_str().to_string())
        })
        .last()
        .and_then(|path| Path::new(&path).file_name().map(|name| name.to_string_lossy().into_owned()))
}

/// `yt-dlp --version` output.
pub fn parse_version(stdout: &str) -> Option<String> {
    stdout.lines().map(str::trim).find(|line| !line.is_empty()).map(str::to_string)
}
