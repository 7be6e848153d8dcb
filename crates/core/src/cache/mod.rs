//! Resource caches mapping search phrases to audio files.
//!
//! Two store generations live behind the [`ResourceCache`] trait:
//!
//! - [`LegacyCache`]: flat phrase -> filename JSON document
//! - [`CacheDb`]: SQLite entries addressable by many search phrases,
//!   accessed asynchronously via tokio-rusqlite
//!
//! Phrases are case-folded and trimmed before they touch either store.

pub mod connection;
pub mod entries;
pub mod legacy;
pub mod migrations;
pub mod search;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{Claim, RemovedResource};
pub use legacy::{LegacyCache, LegacyRecord};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Normalize a search phrase for storage and lookup.
///
/// Folding is Unicode lowercasing. Full case folding is not applied, so
/// "STRASSE" and "straße" stay distinct.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase.trim().to_lowercase()
}

/// Descriptive data for one audio resource as reported by the audio source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntryMetadata {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub channel: Option<String>,
    pub filename: Option<String>,
}

impl EntryMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Public view of a cached entry.
///
/// `filename` is `None` while the download for a known entry is in flight.
/// The legacy store has no ids, so `id` is `None` for its hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CachedResource {
    pub id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub filename: Option<String>,
}

/// Read-only fulltext search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Item {
    pub phrase: String,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Collapse items to the first occurrence of each distinct filename.
pub fn unique_by_filename(items: Vec<Item>) -> Vec<Item> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.filename.clone()))
        .collect()
}

/// Common capability of both cache generations.
#[async_trait]
pub trait ResourceCache: Send + Sync {
    /// Short backend name, reported through the registry.
    fn backend(&self) -> &'static str;

    /// Look up a phrase. Entries whose file vanished from disk are misses.
    async fn lookup_by_phrase(&self, phrase: &str) -> Result<Option<CachedResource>, Error>;

    /// Look up a resource by its external id. Stores without ids always miss.
    async fn lookup_by_id(&self, id: &str) -> Result<Option<CachedResource>, Error>;

    /// Attach a phrase to the resource described by `metadata`.
    async fn insert(&self, phrase: &str, metadata: &EntryMetadata) -> Result<(), Error>;

    /// Remove the resource owning `phrase` together with all its phrases.
    ///
    /// Returns what was removed; deleting the file is up to the caller.
    async fn remove_by_phrase(&self, phrase: &str) -> Result<Option<RemovedResource>, Error>;

    /// Substring search over phrases and filenames.
    async fn fulltext_search(&self, query: &str) -> Result<Vec<Item>, Error>;

    /// Size reported to the registry: entries for the relational store,
    /// phrases for the legacy store.
    async fn entry_count(&self) -> Result<usize, Error>;
}
