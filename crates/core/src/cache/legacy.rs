//! Legacy flat cache: one JSON document mapping phrases to filenames.
//!
//! The whole document is rewritten on every mutation. An absent or
//! unparsable document is replaced by an empty one at load time, so a
//! damaged file never stops the process.

use super::{CachedResource, EntryMetadata, Item, ResourceCache, normalize_phrase, unique_by_filename};
use crate::cache::entries::RemovedResource;
use crate::export::{self, Projection};
use crate::registry::CACHE_SIZE;
use crate::{AppContext, Error};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Phrase written by early versions into a fresh document.
pub const BOOTSTRAP_PHRASE: &str = "dummy";

type Records = BTreeMap<String, String>;

/// One phrase -> filename pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecord {
    pub phrase: String,
    pub filename: String,
}

impl LegacyRecord {
    /// Whether this is the placeholder record of a freshly bootstrapped document.
    pub fn is_bootstrap(&self) -> bool {
        self.phrase == BOOTSTRAP_PHRASE
    }
}

/// Flat phrase -> filename cache backed by a JSON document.
#[derive(Debug)]
pub struct LegacyCache {
    path: PathBuf,
    records: Mutex<Records>,
    ctx: AppContext,
}

async fn read_document(path: &Path) -> Result<Records, Error> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&text).map_err(|e| Error::StoreCorrupt(format!("{}: {e}", path.display())))
}

async fn write_document(path: &Path, records: &Records) -> Result<(), Error> {
    let json = serde_json::to_string(records)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

impl LegacyCache {
    /// Load the document at `path`, self-healing to an empty store.
    pub async fn load(path: impl Into<PathBuf>, ctx: AppContext) -> Self {
        let path = path.into();
        let records = match read_document(&path).await {
            Ok(records) => records,
            Err(e) => {
                match &e {
                    Error::NotFound(_) => tracing::debug!(path = %path.display(), "no legacy cache, creating one"),
                    _ => tracing::warn!(path = %path.display(), error = %e, "legacy cache unreadable, starting empty"),
                }
                let empty = Records::new();
                if let Err(e) = write_document(&path, &empty).await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to persist empty legacy cache");
                }
                empty
            }
        };

        tracing::info!(entries = records.len(), "loaded legacy cache");
        ctx.registry.register(CACHE_SIZE, records.len());
        Self { path, records: Mutex::new(records), ctx }
    }

    /// Filename cached for `phrase`, unless its file vanished.
    pub async fn lookup(&self, phrase: &str) -> Option<String> {
        let key = normalize_phrase(phrase);
        let filename = self.records.lock().await.get(&key).cloned()?;
        if self.ctx.audio_file_exists(&filename).await {
            tracing::debug!(phrase = %key, "cache hit");
            Some(filename)
        } else {
            tracing::debug!(phrase = %key, %filename, "cached file is gone, treating as miss");
            None
        }
    }

    /// Map `phrase` to `filename` and persist the whole document.
    pub async fn insert_record(&self, phrase: &str, filename: &str) -> Result<(), Error> {
        let key = normalize_phrase(phrase);
        let mut records = self.records.lock().await;
        let previous = records.insert(key.clone(), filename.to_string());

        if let Err(e) = write_document(&self.path, &records).await {
            match previous {
                Some(previous) => records.insert(key, previous),
                None => records.remove(&key),
            };
            return Err(e);
        }

        tracing::debug!(phrase = %key, "putting into cache");
        let snapshot = records.clone();
        drop(records);
        self.cache_updated(&snapshot);
        Ok(())
    }

    /// Remove every phrase that shares the filename `phrase` maps to.
    ///
    /// Returns the filename, or `None` if the phrase is unknown.
    pub async fn remove_by_lookup(&self, phrase: &str) -> Result<Option<String>, Error> {
        let key = normalize_phrase(phrase);
        let mut records = self.records.lock().await;
        let Some(filename) = records.get(&key).cloned() else {
            return Ok(None);
        };

        let before = records.clone();
        records.retain(|_, value| *value != filename);
        if let Err(e) = write_document(&self.path, &records).await {
            *records = before;
            return Err(e);
        }

        let snapshot = records.clone();
        drop(records);
        self.cache_updated(&snapshot);
        Ok(Some(filename))
    }

    /// Every stored pair, in phrase order.
    pub async fn all_items(&self) -> Vec<LegacyRecord> {
        self.records
            .lock()
            .await
            .iter()
            .map(|(phrase, filename)| LegacyRecord { phrase: phrase.clone(), filename: filename.clone() })
            .collect()
    }

    /// Substring search over phrases and filenames, one item per file.
    pub async fn search(&self, query: &str) -> Vec<Item> {
        let query = normalize_phrase(query);
        if query.is_empty() {
            return Vec::new();
        }
        let hits = self
            .records
            .lock()
            .await
            .iter()
            .filter(|(phrase, filename)| phrase.contains(&query) || filename.to_lowercase().contains(&query))
            .map(|(phrase, filename)| Item {
                phrase: phrase.clone(),
                filename: Some(filename.clone()),
                title: None,
                artist: None,
            })
            .collect();
        unique_by_filename(hits)
    }

    /// Number of stored phrases.
    pub async fn record_count(&self) -> usize {
        self.records.lock().await.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cache_updated(&self, records: &Records) {
        self.ctx.registry.register(CACHE_SIZE, records.len());
        let projection: Projection = records
            .iter()
            .map(|(phrase, filename)| (phrase.clone(), Some(filename.clone())))
            .collect();
        export::notify(self.ctx.exporter.as_ref(), &projection);
    }
}

#[async_trait]
impl ResourceCache for LegacyCache {
    fn backend(&self) -> &'static str {
        "json"
    }

    async fn lookup_by_phrase(&self, phrase: &str) -> Result<Option<CachedResource>, Error> {
        Ok(self
            .lookup(phrase)
            .await
            .map(|filename| CachedResource { id: None, title: None, artist: None, filename: Some(filename) }))
    }

    async fn lookup_by_id(&self, _id: &str) -> Result<Option<CachedResource>, Error> {
        Ok(None)
    }

    async fn insert(&self, phrase: &str, metadata: &EntryMetadata) -> Result<(), Error> {
        let filename = metadata
            .filename
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("legacy cache records need a filename".into()))?;
        self.insert_record(phrase, filename).await
    }

    async fn remove_by_phrase(&self, phrase: &str) -> Result<Option<RemovedResource>, Error> {
        Ok(self
            .remove_by_lookup(phrase)
            .await?
            .map(|filename| RemovedResource { id: None, filename: Some(filename) }))
    }

    async fn fulltext_search(&self, query: &str) -> Result<Vec<Item>, Error> {
        Ok(self.search(query).await)
    }

    async fn entry_count(&self) -> Result<usize, Error> {
        Ok(self.record_count().await)
    }
}
