//! cache_remove tool implementation.
//!
//! Removes the entry a phrase points at, all of its phrases, and its audio
//! file.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tunecache_core::{CacheDb, Error};

/// Parameters for the cache_remove tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheRemoveParams {
    /// Any phrase attached to the entry to remove.
    pub phrase: String,
}

/// Output from the cache_remove tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheRemoveOutput {
    /// Id of the removed entry.
    pub id: Option<String>,
    /// Filename the entry pointed at, if its download had finished.
    pub filename: Option<String>,
    /// Whether the audio file was deleted from disk.
    pub file_deleted: bool,
}

/// Implementation of the cache_remove tool.
pub async fn remove_impl(cache: &CacheDb, params: CacheRemoveParams) -> Result<CallToolResult, McpError> {
    let removed = cache
        .remove_by_phrase(&params.phrase)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no cached entry for {:?}", params.phrase)))?;

    let file_deleted = match removed.filename.as_deref() {
        Some(filename) => delete_audio_file(cache, filename).await,
        None => false,
    };

    let output = CacheRemoveOutput { id: removed.id, filename: removed.filename, file_deleted };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize removal: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

async fn delete_audio_file(cache: &CacheDb, filename: &str) -> bool {
    let path = cache.context().audio_path(filename);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            tracing::info!(path = %path.display(), "deleted audio file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete audio file");
            false
        }
    }
}
