//! cache_search tool implementation.
//!
//! Substring search over cached phrases and filenames.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tunecache_core::cache::unique_by_filename;
use tunecache_core::{CacheDb, Error, Item};

/// Parameters for the cache_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSearchParams {
    /// Case-insensitive substring matched against filenames, or an exact phrase.
    pub query: String,

    /// Collapse results to one item per audio file.
    #[serde(default)]
    pub per_file: bool,
}

/// Output from the cache_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSearchOutput {
    pub query: String,
    pub count: usize,
    pub items: Vec<Item>,
}

/// Implementation of the cache_search tool.
pub async fn search_impl(cache: &CacheDb, params: CacheSearchParams) -> Result<CallToolResult, McpError> {
    let mut items = cache.fulltext_search(&params.query).await?;
    if params.per_file {
        items = unique_by_filename(items);
    }

    let output = CacheSearchOutput { query: params.query, count: items.len(), items };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize search results: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
