//! Phrase resolution against the relational cache and the audio source.
//!
//! A phrase is served from the cache when possible. Otherwise the audio
//! source names the resource: a known id just gains the phrase, an unknown
//! id gets a placeholder entry and a background download that back-fills
//! the filename. Callers never wait for the download.

use crate::cache::{CacheDb, CachedResource, Claim, EntryMetadata, normalize_phrase};
use crate::{AudioSource, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// How a resolution was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ResolvedBy {
    #[serde(rename = "cache")]
    Cache,
    #[serde(rename = "cached id")]
    CachedId,
    #[serde(rename = "download")]
    Download,
}

/// Result of [`Resolver::resolve`].
///
/// `filename` is `None` while the download for the entry is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub id: String,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub by: ResolvedBy,
}

impl Resolution {
    fn from_entry(entry: CachedResource, fallback_id: &str, by: ResolvedBy) -> Self {
        Self {
            id: entry.id.unwrap_or_else(|| fallback_id.to_string()),
            filename: entry.filename,
            title: entry.title,
            artist: entry.artist,
            by,
        }
    }
}

/// Progress of one background download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Finished(String),
    Failed(String),
}

/// Observer for a background download started by [`Resolver::resolve`].
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    rx: watch::Receiver<DownloadState>,
}

impl DownloadHandle {
    pub fn state(&self) -> DownloadState {
        self.rx.borrow().clone()
    }

    /// Wait for the download to settle and return the stored filename.
    pub async fn finished(mut self) -> Result<String, Error> {
        let state = match self.rx.wait_for(|state| *state != DownloadState::Pending).await {
            Ok(state) => state.clone(),
            Err(_) => DownloadState::Failed("download task ended without reporting".into()),
        };
        match state {
            DownloadState::Finished(filename) => Ok(filename),
            DownloadState::Failed(reason) => Err(Error::DownloadFailed(reason)),
            DownloadState::Pending => Err(Error::DownloadFailed("download still pending".into())),
        }
    }
}

type Gates = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Per-phrase lock, dropped from the map once nobody else holds it.
struct GateLease<'a> {
    gates: &'a Gates,
    key: String,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let mut gates = lock(self.gates);
        // the map and this lease
        if Arc::strong_count(&self.gate) <= 2 {
            gates.remove(&self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolution orchestrator.
#[derive(Clone)]
pub struct Resolver {
    db: CacheDb,
    source: Arc<dyn AudioSource>,
    gates: Arc<Gates>,
    downloads: Arc<Mutex<HashMap<String, DownloadHandle>>>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("db", &self.db)
            .field("pending_downloads", &self.pending_downloads())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(db: CacheDb, source: Arc<dyn AudioSource>) -> Self {
        Self { db, source, gates: Arc::default(), downloads: Arc::default() }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Resolve a search phrase to an audio resource.
    ///
    /// Concurrent calls for the same case-folded phrase run one after the
    /// other, so only the first can create a placeholder and start a
    /// download. Later callers see that placeholder as a cache hit.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for a blank phrase
    /// - [`Error::ExtractionFailed`] if the source cannot name a resource; no
    ///   entry is created in that case
    pub async fn resolve(&self, phrase: &str) -> Result<Resolution, Error> {
        let key = normalize_phrase(phrase);
        if key.is_empty() {
            return Err(Error::InvalidInput("search phrase must not be empty".into()));
        }

        let lease = self.lease(&key);
        let _guard = lease.gate.lock().await;

        if let Some(hit) = self.db.lookup_by_phrase(&key).await? {
            return Ok(Resolution::from_entry(hit, "", ResolvedBy::Cache));
        }

        let metadata = self.source.resolve_phrase(phrase.trim()).await?;
        let id = metadata.id.clone();
        tracing::debug!(phrase = %key, %id, "source resolved phrase");

        let placeholder = EntryMetadata { filename: None, ..metadata };
        match self.db.claim_id(&key, &placeholder).await? {
            Claim::Existing(entry) => {
                tracing::debug!(phrase = %key, %id, "id already cached, phrase merged");
                Ok(Resolution::from_entry(entry, &id, ResolvedBy::CachedId))
            }
            Claim::Created(entry) => {
                tracing::info!(phrase = %key, %id, "placeholder created, starting download");
                self.spawn_download(id.clone());
                Ok(Resolution::from_entry(entry, &id, ResolvedBy::Download))
            }
        }
    }

    /// Wait for the download of `id` if one is running, otherwise report the
    /// stored filename.
    pub async fn await_download(&self, id: &str) -> Result<Option<String>, Error> {
        let handle = lock(&self.downloads).get(id).cloned();
        if let Some(handle) = handle {
            return handle.finished().await.map(Some);
        }
        Ok(self.db.lookup_by_id(id).await?.and_then(|entry| entry.filename))
    }

    /// Handle of the running download for `id`.
    pub fn download_handle(&self, id: &str) -> Option<DownloadHandle> {
        lock(&self.downloads).get(id).cloned()
    }

    pub fn pending_downloads(&self) -> usize {
        lock(&self.downloads).len()
    }

    fn lease(&self, key: &str) -> GateLease<'_> {
        let gate = lock(&self.gates).entry(key.to_string()).or_default().clone();
        GateLease { gates: self.gates.as_ref(), key: key.to_string(), gate }
    }

    fn spawn_download(&self, id: String) {
        let (tx, rx) = watch::channel(DownloadState::Pending);
        lock(&self.downloads).insert(id.clone(), DownloadHandle { rx });

        let db = self.db.clone();
        let source = Arc::clone(&self.source);
        let downloads = Arc::clone(&self.downloads);

        tokio::spawn(async move {
            let state = match source.download(&id).await {
                Ok(filename) => match db.set_filename(&id, &filename).await {
                    Ok(()) => {
                        tracing::info!(%id, %filename, "download finished");
                        DownloadState::Finished(filename)
                    }
                    Err(e) => {
                        tracing::warn!(%id, %filename, error = %e, "could not record downloaded file");
                        if matches!(e, Error::NotFound(_)) {
                            discard_orphan(&db, &filename).await;
                        }
                        DownloadState::Failed(e.to_string())
                    }
                },
                Err(e) => {
                    tracing::error!(%id, error = %e, "download failed, entry keeps no filename");
                    DownloadState::Failed(e.to_string())
                }
            };
            lock(&downloads).remove(&id);
            tx.send_replace(state);
        });
    }
}

/// Delete a downloaded file whose entry was removed while it was fetched.
async fn discard_orphan(db: &CacheDb, filename: &str) {
    let path = db.context().audio_path(filename);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::info!(path = %path.display(), "removed file of deleted entry"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove file of deleted entry"),
    }
}
