//! Entry and search phrase operations.
//!
//! An entry is one audio resource keyed by its external id; any number of
//! normalized search phrases point at it. Every mutation runs in its own
//! transaction and is followed by a size report and an export of the
//! phrase -> filename projection.

use super::connection::CacheDb;
use super::{CachedResource, EntryMetadata, normalize_phrase};
use crate::Error;
use crate::export::{self, Projection};
use crate::registry::CACHE_SIZE;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// Entries a phrase points at, most recently attached first.
const SELECT_ENTRIES_BY_PHRASE: &str = "SELECT e.id, e.title, e.artist, e.filename
     FROM entry e JOIN phrase p ON p.entry_id = e.id
     WHERE p.phrase = ?1
     ORDER BY p.id DESC";

/// Outcome of [`CacheDb::claim_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The id already had an entry; the phrase was merged into it.
    Existing(CachedResource),
    /// A placeholder entry was created for the id.
    Created(CachedResource),
}

/// What [`CacheDb::remove_by_phrase`] deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RemovedResource {
    pub id: Option<String>,
    pub filename: Option<String>,
}

pub(crate) fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedResource> {
    Ok(CachedResource { id: Some(row.get(0)?), title: row.get(1)?, artist: row.get(2)?, filename: row.get(3)? })
}

fn insert_phrase(conn: &rusqlite::Connection, phrase: &str, entry_id: &str) -> rusqlite::Result<bool> {
    let added = conn.execute(
        "INSERT OR IGNORE INTO phrase (phrase, entry_id) VALUES (?1, ?2)",
        params![phrase, entry_id],
    )?;
    Ok(added > 0)
}

impl CacheDb {
    /// Look up the entry a phrase points at.
    ///
    /// A phrase may point at several entries once a stale file has been
    /// resolved again to a different id. Candidates are tried newest first;
    /// the first whose file exists, or whose download is still in flight
    /// (no filename yet), is the hit. Entries with vanished files are skipped.
    pub async fn lookup_by_phrase(&self, phrase: &str) -> Result<Option<CachedResource>, Error> {
        let phrase = normalize_phrase(phrase);
        let key = phrase.clone();
        let candidates = self
            .conn
            .call(move |conn| -> Result<Vec<CachedResource>, Error> {
                let mut stmt = conn.prepare(SELECT_ENTRIES_BY_PHRASE)?;
                let entries = stmt
                    .query_map(params![key], entry_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await
            .map_err(Error::from)?;

        if candidates.is_empty() {
            tracing::debug!(%phrase, "cache miss");
            return Ok(None);
        }

        for entry in candidates {
            match entry.filename.as_deref() {
                Some(filename) if !self.ctx.audio_file_exists(filename).await => {
                    tracing::debug!(%phrase, id = ?entry.id, filename, "cached file is gone, skipping entry");
                }
                _ => {
                    tracing::debug!(%phrase, id = ?entry.id, "cache hit");
                    return Ok(Some(entry));
                }
            }
        }

        tracing::debug!(%phrase, "no entry with a live file, treating as miss");
        Ok(None)
    }

    /// Look up an entry by its external id.
    ///
    /// A missing file is logged but the entry is still returned; its
    /// metadata stays valid.
    pub async fn lookup_by_id(&self, id: &str) -> Result<Option<CachedResource>, Error> {
        let key = id.to_string();
        let entry = self
            .conn
            .call(move |conn| -> Result<Option<CachedResource>, Error> {
                let mut stmt = conn.prepare("SELECT id, title, artist, filename FROM entry WHERE id = ?1")?;
                match stmt.query_row(params![key], entry_from_row) {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        if let Some(filename) = entry.as_ref().and_then(|e| e.filename.as_deref()) {
            if self.ctx.audio_file_exists(filename).await {
                tracing::debug!(id, filename, "entry file exists");
            } else {
                tracing::error!(id, filename, "entry file does not exist");
            }
        }

        Ok(entry)
    }

    /// Attach a phrase to the resource described by `metadata`.
    ///
    /// An entry already holding the same filename (legacy import) or the
    /// same id is reused; otherwise a new entry is created. Entry and phrase
    /// are committed together.
    pub async fn insert_entry(&self, phrase: &str, metadata: &EntryMetadata) -> Result<(), Error> {
        let phrase = normalize_phrase(phrase);
        let metadata = metadata.clone();
        tracing::debug!(%phrase, id = %metadata.id, "putting into cache");

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;

                let by_filename: Option<String> = match &metadata.filename {
                    Some(filename) => tx
                        .query_row(
                            "SELECT id FROM entry WHERE filename = ?1 ORDER BY rowid LIMIT 1",
                            params![filename],
                            |row| row.get(0),
                        )
                        .optional()?,
                    None => None,
                };

                let entry_id = match by_filename {
                    Some(id) => id,
                    None => {
                        tx.execute(
                            "INSERT INTO entry (id, title, artist, filename) VALUES (?1, ?2, ?3, ?4)
                             ON CONFLICT(id) DO UPDATE SET
                                 filename = COALESCE(entry.filename, excluded.filename)",
                            params![&metadata.id, &metadata.title, &metadata.artist, &metadata.filename],
                        )?;
                        metadata.id.clone()
                    }
                };

                insert_phrase(&tx, &phrase, &entry_id)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        self.cache_updated().await;
        Ok(())
    }

    /// Attach a phrase to an existing entry.
    ///
    /// Returns whether the phrase was new for that entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] without touching the store if no entry
    /// has the id.
    pub async fn add_phrase_to_id(&self, id: &str, phrase: &str) -> Result<bool, Error> {
        let phrase = normalize_phrase(phrase);
        let id = id.to_string();

        let added = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                let exists: bool =
                    tx.query_row("SELECT EXISTS(SELECT 1 FROM entry WHERE id = ?1)", params![&id], |row| row.get(0))?;
                if !exists {
                    return Err(Error::Conflict(format!("entry with id {id} could not be found to add a phrase")));
                }
                let added = insert_phrase(&tx, &phrase, &id)?;
                tx.commit()?;
                Ok(added)
            })
            .await
            .map_err(Error::from)?;

        if added {
            self.cache_updated().await;
        }
        Ok(added)
    }

    /// Attach `phrase` to the entry for `metadata.id`, creating the entry if
    /// the id is unknown.
    ///
    /// The existence check and the insert share one transaction, so callers
    /// racing on the same id observe exactly one `Claim::Created`.
    pub async fn claim_id(&self, phrase: &str, metadata: &EntryMetadata) -> Result<Claim, Error> {
        let phrase = normalize_phrase(phrase);
        let metadata = metadata.clone();

        let claim = self
            .conn
            .call(move |conn| -> Result<Claim, Error> {
                let tx = conn.transaction()?;
                let existing = tx
                    .query_row(
                        "SELECT id, title, artist, filename FROM entry WHERE id = ?1",
                        params![&metadata.id],
                        entry_from_row,
                    )
                    .optional()?;

                let claim = match existing {
                    Some(entry) => Claim::Existing(entry),
                    None => {
                        tx.execute(
                            "INSERT INTO entry (id, title, artist, filename) VALUES (?1, ?2, ?3, ?4)",
                            params![&metadata.id, &metadata.title, &metadata.artist, &metadata.filename],
                        )?;
                        Claim::Created(CachedResource {
                            id: Some(metadata.id.clone()),
                            title: metadata.title.clone(),
                            artist: metadata.artist.clone(),
                            filename: metadata.filename.clone(),
                        })
                    }
                };

                insert_phrase(&tx, &phrase, &metadata.id)?;
                tx.commit()?;
                Ok(claim)
            })
            .await
            .map_err(Error::from)?;

        self.cache_updated().await;
        Ok(claim)
    }

    /// Fill in the filename of a placeholder entry once its download is done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry was removed meanwhile.
    pub async fn set_filename(&self, id: &str, filename: &str) -> Result<(), Error> {
        let id = id.to_string();
        let filename = filename.to_string();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let updated = conn.execute(
                    "UPDATE entry SET filename = ?2 WHERE id = ?1 AND filename IS NULL",
                    params![&id, &filename],
                )?;
                if updated > 0 {
                    return Ok(());
                }
                let current: Option<Option<String>> = conn
                    .query_row("SELECT filename FROM entry WHERE id = ?1", params![&id], |row| row.get(0))
                    .optional()?;
                match current {
                    None => Err(Error::NotFound(format!("entry {id} was removed before its download finished"))),
                    Some(existing) => {
                        tracing::warn!(%id, ?existing, %filename, "entry already has a filename, keeping it");
                        Ok(())
                    }
                }
            })
            .await
            .map_err(Error::from)?;

        self.cache_updated().await;
        Ok(())
    }

    /// Delete the entry `phrase` was most recently attached to and, by
    /// cascade, all of its phrases.
    pub async fn remove_by_phrase(&self, phrase: &str) -> Result<Option<RemovedResource>, Error> {
        let phrase = normalize_phrase(phrase);

        let removed = self
            .conn
            .call(move |conn| -> Result<Option<RemovedResource>, Error> {
                let tx = conn.transaction()?;
                let newest = format!("{SELECT_ENTRIES_BY_PHRASE} LIMIT 1");
                let Some(entry) = tx.query_row(&newest, params![&phrase], entry_from_row).optional()?
                else {
                    return Ok(None);
                };
                tx.execute("DELETE FROM entry WHERE id = ?1", params![&entry.id])?;
                tx.commit()?;
                Ok(Some(RemovedResource { id: entry.id, filename: entry.filename }))
            })
            .await
            .map_err(Error::from)?;

        if removed.is_some() {
            self.cache_updated().await;
        }
        Ok(removed)
    }

    /// Phrases attached to an entry, oldest first.
    pub async fn phrases_for(&self, id: &str) -> Result<Vec<String>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT phrase FROM phrase WHERE entry_id = ?1 ORDER BY id")?;
                let phrases = stmt
                    .query_map(params![id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(phrases)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries.
    pub async fn entry_count(&self) -> Result<usize, Error> {
        self.conn
            .call(|conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entry", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Phrase -> filename projection over every phrase.
    pub async fn projection(&self) -> Result<Projection, Error> {
        self.conn
            .call(|conn| -> Result<Projection, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.phrase, e.filename FROM phrase p JOIN entry e ON e.id = p.entry_id ORDER BY p.id",
                )?;
                let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?;
                let mut projection = Projection::new();
                for row in rows {
                    let (phrase, filename) = row?;
                    projection.insert(phrase, filename);
                }
                Ok(projection)
            })
            .await
            .map_err(Error::from)
    }

    pub(crate) async fn update_cache_size(&self) -> Result<usize, Error> {
        let count = self.entry_count().await?;
        self.ctx.registry.register(CACHE_SIZE, count);
        Ok(count)
    }

    /// Report size and export after a committed mutation. Failures here are
    /// logged only; the mutation stands.
    async fn cache_updated(&self) {
        if let Err(e) = self.update_cache_size().await {
            tracing::warn!(error = %e, "failed to update cache size");
        }
        match self.projection().await {
            Ok(projection) => export::notify(self.ctx.exporter.as_ref(), &projection),
            Err(e) => tracing::warn!(error = %e, "failed to build cache projection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppContext;
    use crate::export::Exporter;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingExporter {
        exports: Mutex<Vec<Projection>>,
    }

    impl Exporter for RecordingExporter {
        fn export(&self, projection: &Projection) -> Result<(), Error> {
            self.exports.lock().unwrap().push(projection.clone());
            Ok(())
        }
    }

    struct FailingExporter;

    impl Exporter for FailingExporter {
        fn export(&self, _projection: &Projection) -> Result<(), Error> {
            Err(Error::InvalidInput("export target unavailable".into()))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        ctx: AppContext,
        db: CacheDb,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_exporter(Arc::new(crate::export::NoopExporter)).await
        }

        async fn with_exporter(exporter: Arc<dyn Exporter>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let ctx = AppContext::new(Arc::new(crate::Registry::new()), exporter, dir.path());
            let db = CacheDb::open_in_memory(ctx.clone()).await.unwrap();
            Self { _dir: dir, ctx, db }
        }

        fn touch(&self, filename: &str) {
            std::fs::write(self.ctx.audio_path(filename), b"ID3").unwrap();
        }
    }

    fn meta(id: &str, filename: &str) -> EntryMetadata {
        EntryMetadata {
            id: id.into(),
            title: Some(format!("title of {id}")),
            artist: Some("artist".into()),
            channel: None,
            filename: Some(filename.into()),
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup_by_phrase() {
        let fx = Fixture::new().await;
        fx.touch("test.mp3");

        fx.db.insert_entry("Test Phrase", &meta("1", "test.mp3")).await.unwrap();

        let hit = fx.db.lookup_by_phrase("test phrase").await.unwrap().unwrap();
        assert_eq!(hit.id.as_deref(), Some("1"));
        assert_eq!(hit.title.as_deref(), Some("title of 1"));
        assert_eq!(hit.filename.as_deref(), Some("test.mp3"));
        assert_eq!(fx.db.phrases_for("1").await.unwrap(), vec!["test phrase"]);
    }

    #[tokio::test]
    async fn test_lookup_by_phrase_missing_file_is_miss() {
        let fx = Fixture::new().await;
        fx.db.insert_entry("gone", &meta("1", "gone.mp3")).await.unwrap();

        assert!(fx.db.lookup_by_phrase("gone").await.unwrap().is_none());
        // the record itself survives
        assert!(fx.db.lookup_by_id("1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_placeholder_is_still_a_hit() {
        let fx = Fixture::new().await;
        fx.db.claim_id("pending", &EntryMetadata::new("abc")).await.unwrap();

        let hit = fx.db.lookup_by_phrase("pending").await.unwrap().unwrap();
        assert_eq!(hit.id.as_deref(), Some("abc"));
        assert!(hit.filename.is_none());
    }

    #[tokio::test]
    async fn test_merge_on_existing_file() {
        let fx = Fixture::new().await;
        fx.touch("x.mp3");

        fx.db.insert_entry("phrase a", &meta("id1", "x.mp3")).await.unwrap();
        fx.db.insert_entry("phrase b", &meta("id1", "x.mp3")).await.unwrap();

        assert_eq!(fx.db.entry_count().await.unwrap(), 1);
        assert_eq!(fx.db.phrases_for("id1").await.unwrap(), vec!["phrase a", "phrase b"]);
        let a = fx.db.lookup_by_phrase("phrase a").await.unwrap().unwrap();
        let b = fx.db.lookup_by_phrase("phrase b").await.unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_insert_reuses_entry_with_same_filename() {
        let fx = Fixture::new().await;
        fx.touch("x.mp3");

        fx.db.insert_entry("one", &meta("id1", "x.mp3")).await.unwrap();
        fx.db.insert_entry("two", &meta("id2", "x.mp3")).await.unwrap();

        assert_eq!(fx.db.entry_count().await.unwrap(), 1);
        assert!(fx.db.lookup_by_id("id2").await.unwrap().is_none());
        assert_eq!(fx.db.phrases_for("id1").await.unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_same_phrase_once_per_entry() {
        let fx = Fixture::new().await;
        fx.db.insert_entry("dup", &meta("id1", "x.mp3")).await.unwrap();
        fx.db.insert_entry("DUP", &meta("id1", "x.mp3")).await.unwrap();
        assert!(!fx.db.add_phrase_to_id("id1", "dup").await.unwrap());

        assert_eq!(fx.db.phrases_for("id1").await.unwrap(), vec!["dup"]);
    }

    #[tokio::test]
    async fn test_add_phrase_to_unknown_id_conflicts() {
        let exporter = Arc::new(RecordingExporter::default());
        let fx = Fixture::with_exporter(exporter.clone()).await;

        let result = fx.db.add_phrase_to_id("nonexistent-id", "phrase").await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(fx.db.entry_count().await.unwrap(), 0);
        assert!(fx.db.projection().await.unwrap().is_empty());
        assert!(exporter.exports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_phrase_to_id() {
        let fx = Fixture::new().await;
        fx.touch("x.mp3");
        fx.db.insert_entry("first", &meta("id1", "x.mp3")).await.unwrap();

        assert!(fx.db.add_phrase_to_id("id1", "Second").await.unwrap());

        let hit = fx.db.lookup_by_phrase("second").await.unwrap().unwrap();
        assert_eq!(hit.id.as_deref(), Some("id1"));
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let fx = Fixture::new().await;
        fx.touch("x.mp3");
        fx.db.insert_entry("first", &meta("id1", "x.mp3")).await.unwrap();
        fx.db.add_phrase_to_id("id1", "second").await.unwrap();

        let removed = fx.db.remove_by_phrase("SECOND").await.unwrap().unwrap();
        assert_eq!(removed.filename.as_deref(), Some("x.mp3"));
        assert_eq!(removed.id.as_deref(), Some("id1"));

        assert!(fx.db.lookup_by_phrase("first").await.unwrap().is_none());
        assert!(fx.db.lookup_by_phrase("second").await.unwrap().is_none());
        assert!(fx.db.phrases_for("id1").await.unwrap().is_empty());
        assert_eq!(fx.db.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_phrase_reusable_after_removal() {
        let fx = Fixture::new().await;
        fx.touch("a.mp3");
        fx.touch("b.mp3");
        fx.db.insert_entry("song", &meta("a", "a.mp3")).await.unwrap();
        fx.db.remove_by_phrase("song").await.unwrap();
        fx.db.insert_entry("song", &meta("b", "b.mp3")).await.unwrap();

        let hit = fx.db.lookup_by_phrase("song").await.unwrap().unwrap();
        assert_eq!(hit.id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_stale_entry_yields_to_newer_entry() {
        let fx = Fixture::new().await;
        fx.db.insert_entry("song", &meta("old", "old.mp3")).await.unwrap();
        // old.mp3 never existed on disk; the phrase is resolved again elsewhere
        fx.db.claim_id("song", &EntryMetadata::new("new")).await.unwrap();

        let pending = fx.db.lookup_by_phrase("song").await.unwrap().unwrap();
        assert_eq!(pending.id.as_deref(), Some("new"));
        assert!(pending.filename.is_none());

        fx.touch("new.mp3");
        fx.db.set_filename("new", "new.mp3").await.unwrap();
        let hit = fx.db.lookup_by_phrase("song").await.unwrap().unwrap();
        assert_eq!(hit.filename.as_deref(), Some("new.mp3"));
    }

    #[tokio::test]
    async fn test_older_live_entry_still_served() {
        let fx = Fixture::new().await;
        fx.touch("old.mp3");
        fx.db.insert_entry("song", &meta("old", "old.mp3")).await.unwrap();
        fx.db.insert_entry("song", &meta("new", "new.mp3")).await.unwrap();

        let hit = fx.db.lookup_by_phrase("song").await.unwrap().unwrap();
        assert_eq!(hit.id.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_remove_missing_phrase() {
        let fx = Fixture::new().await;
        assert!(fx.db.remove_by_phrase("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_id_created_then_existing() {
        let fx = Fixture::new().await;

        let first = fx.db.claim_id("a", &EntryMetadata::new("vid")).await.unwrap();
        let second = fx.db.claim_id("b", &EntryMetadata::new("vid")).await.unwrap();

        assert!(matches!(first, Claim::Created(_)));
        assert!(matches!(second, Claim::Existing(ref e) if e.id.as_deref() == Some("vid")));
        assert_eq!(fx.db.entry_count().await.unwrap(), 1);
        assert_eq!(fx.db.phrases_for("vid").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_set_filename_backfills_once() {
        let fx = Fixture::new().await;
        fx.db.claim_id("a", &EntryMetadata::new("vid")).await.unwrap();

        fx.db.set_filename("vid", "first.mp3").await.unwrap();
        fx.db.set_filename("vid", "second.mp3").await.unwrap();

        let entry = fx.db.lookup_by_id("vid").await.unwrap().unwrap();
        assert_eq!(entry.filename.as_deref(), Some("first.mp3"));
    }

    #[tokio::test]
    async fn test_set_filename_on_removed_entry() {
        let fx = Fixture::new().await;
        let result = fx.db.set_filename("vid", "x.mp3").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mutations_report_size_and_export() {
        let exporter = Arc::new(RecordingExporter::default());
        let fx = Fixture::with_exporter(exporter.clone()).await;

        fx.db.insert_entry("one", &meta("id1", "x.mp3")).await.unwrap();
        fx.db.add_phrase_to_id("id1", "uno").await.unwrap();
        assert_eq!(fx.ctx.registry.get(CACHE_SIZE), Some(Value::from(1)));

        fx.db.remove_by_phrase("one").await.unwrap();
        assert_eq!(fx.ctx.registry.get(CACHE_SIZE), Some(Value::from(0)));

        let exports = exporter.exports.lock().unwrap();
        assert_eq!(exports.len(), 3);
        assert_eq!(exports[1].get("uno"), Some(&Some("x.mp3".to_string())));
        assert!(exports[2].is_empty());
    }

    #[tokio::test]
    async fn test_export_failure_keeps_mutation() {
        let fx = Fixture::with_exporter(Arc::new(FailingExporter)).await;
        fx.touch("x.mp3");

        fx.db.insert_entry("kept", &meta("id1", "x.mp3")).await.unwrap();

        assert!(fx.db.lookup_by_phrase("kept").await.unwrap().is_some());
    }
}
