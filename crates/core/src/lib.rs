//! Core types and shared functionality for tunecache.
//!
//! This crate provides:
//! - Phrase -> audio resource caches (legacy JSON, SQLite)
//! - Legacy to relational cache migration
//! - Concurrent resolution of phrases through an audio source
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod migrate;
pub mod registry;
pub mod resolve;
pub mod source;

pub use cache::{CacheDb, CachedResource, EntryMetadata, Item, LegacyCache, ResourceCache};
pub use config::AppConfig;
pub use context::AppContext;
pub use error::Error;
pub use migrate::{MigrationReport, Migrator};
pub use registry::Registry;
pub use resolve::{Resolution, ResolvedBy, Resolver};
pub use source::AudioSource;
