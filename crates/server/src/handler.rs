//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::cache::{CacheRemoveParams, CacheSearchParams, remove_impl, search_impl};
use crate::tools::{AudioResolveParams, info_impl, resolve_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tunecache_core::Resolver;

/// The main MCP server handler for tunecache.
#[derive(Clone)]
pub struct TunecacheServer {
    resolver: Resolver,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl TunecacheServer {
    /// Create a new server handler around a resolver.
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver, tool_router: Self::tool_router() }
    }

    /// Resolve a search phrase to an audio file.
    ///
    /// Cached phrases answer immediately. Unknown resources get a placeholder entry and
    /// a background download; `filename` is null until it finishes.
    #[tool(
        description = "Resolve a search phrase to a cached audio file. Returns id, filename (null while downloading), title, artist and how it was resolved (cache, cached id, download)."
    )]
    async fn audio_resolve(&self, params: Parameters<AudioResolveParams>) -> Result<CallToolResult, McpError> {
        resolve_impl(&self.resolver, params.0).await
    }

    /// Remove a cached entry, all phrases pointing at it, and its audio file.
    #[tool(description = "Remove the cached entry a phrase points at, together with all of its phrases and its audio file.")]
    async fn cache_remove(&self, params: Parameters<CacheRemoveParams>) -> Result<CallToolResult, McpError> {
        remove_impl(self.resolver.db(), params.0).await
    }

    /// Search cached phrases and filenames.
    #[tool(
        description = "Search cached phrases (exact) and filenames (substring), case-insensitive. Set per_file to get one result per audio file."
    )]
    async fn cache_search(&self, params: Parameters<CacheSearchParams>) -> Result<CallToolResult, McpError> {
        search_impl(self.resolver.db(), params.0).await
    }

    /// Report operational facts.
    #[tool(description = "Report server facts: start time, pid, cache backend and size, downloader version, pending downloads.")]
    async fn app_info(&self) -> Result<CallToolResult, McpError> {
        info_impl(&self.resolver).await
    }
}

impl ServerHandler for TunecacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tunecache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{StubSource, fixture};

    #[tokio::test]
    async fn test_router_lists_all_tools() {
        let fx = fixture(StubSource::default()).await;
        let server = TunecacheServer::new(fx.resolver.clone());

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["app_info", "audio_resolve", "cache_remove", "cache_search"]);
    }
}
