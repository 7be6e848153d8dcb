//! audio_resolve tool implementation.
//!
//! Resolves a search phrase to a cached audio file, starting a background
//! download when the resource is new.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tunecache_core::{Error, Resolution, Resolver};

/// Input parameters for the audio_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AudioResolveParams {
    /// Free-text search phrase, e.g. "binary love".
    pub phrase: String,

    /// Wait for a started download to finish before answering.
    #[serde(default)]
    pub wait: bool,
}

/// Implementation of the audio_resolve tool.
pub async fn resolve_impl(resolver: &Resolver, params: AudioResolveParams) -> Result<CallToolResult, McpError> {
    let mut resolution: Resolution = resolver.resolve(&params.phrase).await?;

    if params.wait && resolution.filename.is_none() {
        resolution.filename = resolver.await_download(&resolution.id).await?;
    }

    let json = serde_json::to_string_pretty(&resolution)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize resolution: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
