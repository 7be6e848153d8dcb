//! tunecache server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;
use tunecache_client::{YtDlpConfig, YtDlpSource};
use tunecache_core::export::{Exporter, JsonFileExporter, NoopExporter};
use tunecache_core::{AppConfig, AppContext, CacheDb, LegacyCache, Migrator, Registry, Resolver};

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(db = %config.db_path.display(), audio_dir = %config.audio_dir.display(), "Starting tunecache server on stdio transport");

    tokio::fs::create_dir_all(&config.audio_dir)
        .await
        .with_context(|| format!("failed to create audio directory {}", config.audio_dir.display()))?;

    let exporter: Arc<dyn Exporter> = match &config.export_path {
        Some(path) => Arc::new(JsonFileExporter::new(path)),
        None => Arc::new(NoopExporter),
    };
    let ctx = AppContext::new(Arc::new(Registry::new()), exporter, &config.audio_dir);

    let source = YtDlpSource::new(YtDlpConfig::from(&config));
    if let Err(e) = source.probe(&ctx.registry).await {
        tracing::warn!(error = %e, "downloader probe failed, resolutions of new phrases will fail");
    }

    let legacy = if config.migrate_on_start && tokio::fs::try_exists(&config.legacy_cache_path).await.unwrap_or(false)
    {
        Some(LegacyCache::load(&config.legacy_cache_path, ctx.clone()).await)
    } else {
        None
    };

    let db = CacheDb::open(&config.db_path, ctx)
        .await
        .with_context(|| format!("failed to open cache database {}", config.db_path.display()))?;

    if let Some(legacy) = &legacy {
        tracing::info!(path = %legacy.path().display(), "migrating legacy cache");
        Migrator::new(legacy, &db, &source).migrate().await;
    }

    let resolver = Resolver::new(db, Arc::new(source));
    let handler = handler::TunecacheServer::new(resolver);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
