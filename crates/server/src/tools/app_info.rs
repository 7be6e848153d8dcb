//! app_info tool implementation.
//!
//! Reports the operational facts registry: start time, pid, cache backend
//! and size, downloader name and version.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use tunecache_core::{Error, Resolver};

/// Implementation of the app_info tool.
pub async fn info_impl(resolver: &Resolver) -> Result<CallToolResult, McpError> {
    let mut info = resolver.db().context().registry.snapshot();
    if let Some(map) = info.as_object_mut() {
        map.insert("pending_downloads".into(), resolver.pending_downloads().into());
    }

    let json = serde_json::to_string_pretty(&info)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize app info: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
