//! Legacy flat cache to relational cache migration.
//!
//! Legacy phrases are stored URL-quoted. Each is decoded and resolved through
//! the audio source to its external id; the decoded phrase is what gets
//! attached to the target [`ResourceCache`]. Known ids only gain the phrase,
//! unknown ids get a new entry that keeps the legacy filename, so nothing is
//! downloaded again. Legacy records
//! are never deleted, which makes a second run a no-op apart from lookups.

use crate::cache::{EntryMetadata, LegacyCache, LegacyRecord, ResourceCache};
use crate::{AudioSource, Error};
use percent_encoding::percent_decode_str;
use serde::Serialize;

/// Per-run migration counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Entries migrated from legacy records.
    pub migrated: usize,
    /// Phrases merged into entries that already existed.
    pub merged: usize,
    /// Bootstrap placeholder records skipped.
    pub skipped: usize,
    /// Records that could not be migrated.
    pub failed: usize,
}

enum Outcome {
    Migrated,
    Merged,
    Skipped,
}

/// One-shot migration from a [`LegacyCache`] into an id-keyed cache.
pub struct Migrator<'a> {
    legacy: &'a LegacyCache,
    target: &'a dyn ResourceCache,
    source: &'a dyn AudioSource,
}

impl<'a> Migrator<'a> {
    pub fn new(legacy: &'a LegacyCache, target: &'a dyn ResourceCache, source: &'a dyn AudioSource) -> Self {
        Self { legacy, target, source }
    }

    /// Migrate every legacy record, logging per-record failures.
    pub async fn migrate(&self) -> MigrationReport {
        let items = self.legacy.all_items().await;
        let mut report = MigrationReport::default();

        if items.is_empty() || (items.len() == 1 && items[0].is_bootstrap()) {
            tracing::info!("no items to migrate from the legacy cache");
            return report;
        }

        for item in &items {
            tracing::debug!(phrase = %item.phrase, filename = %item.filename, "migrating legacy record");
            match self.migrate_one(item).await {
                Ok(Outcome::Migrated) => report.migrated += 1,
                Ok(Outcome::Merged) => report.merged += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(phrase = %item.phrase, error = %e, "failed to migrate legacy record");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            migrated = report.migrated,
            merged = report.merged,
            skipped = report.skipped,
            failed = report.failed,
            "migration completed"
        );
        report
    }

    async fn migrate_one(&self, item: &LegacyRecord) -> Result<Outcome, Error> {
        if item.is_bootstrap() {
            return Ok(Outcome::Skipped);
        }

        let decoded = percent_decode_str(&item.phrase).decode_utf8_lossy();
        let resolved = self.source.resolve_phrase(&decoded).await?;

        let known = self.target.lookup_by_id(&resolved.id).await?.is_some();
        let metadata = EntryMetadata { filename: Some(item.filename.clone()), ..resolved };
        self.target.insert(&decoded, &metadata).await?;

        if known {
            tracing::debug!(id = %metadata.id, phrase = %decoded, "id already migrated, phrase merged");
            Ok(Outcome::Merged)
        } else {
            tracing::debug!(id = %metadata.id, phrase = %decoded, filename = %item.filename, "legacy record added");
            Ok(Outcome::Migrated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppContext;
    use crate::cache::CacheDb;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Source resolving decoded phrases through a fixed table.
    struct TableSource {
        ids: HashMap<&'static str, &'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl TableSource {
        fn new(ids: &[(&'static str, &'static str)]) -> Self {
            Self { ids: ids.iter().copied().collect(), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl AudioSource for TableSource {
        async fn resolve_phrase(&self, phrase: &str) -> Result<EntryMetadata, Error> {
            self.seen.lock().unwrap().push(phrase.to_string());
            let id = self
                .ids
                .get(phrase)
                .ok_or_else(|| Error::ExtractionFailed(format!("no results for {phrase}")))?;
            Ok(EntryMetadata {
                id: (*id).to_string(),
                title: Some(format!("title {id}")),
                artist: None,
                channel: Some("chan".into()),
                filename: None,
            })
        }

        async fn download(&self, id: &str) -> Result<String, Error> {
            Err(Error::DownloadFailed(format!("migration must not download {id}")))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        legacy: LegacyCache,
        db: CacheDb,
    }

    async fn fixture(records: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::detached(dir.path());
        let legacy = LegacyCache::load(dir.path().join("cache.json"), ctx.clone()).await;
        for (phrase, filename) in records {
            legacy.insert_record(phrase, filename).await.unwrap();
        }
        let db = CacheDb::open_in_memory(ctx).await.unwrap();
        Fixture { _dir: dir, legacy, db }
    }

    #[tokio::test]
    async fn test_single_record_migrates_to_one_entry() {
        let fx = fixture(&[("binary%20love", "Binary Love.mp3")]).await;
        let source = TableSource::new(&[("binary love", "bl")]);

        let report = Migrator::new(&fx.legacy, &fx.db, &source).migrate().await;

        assert_eq!(report, MigrationReport { migrated: 1, ..Default::default() });
        assert_eq!(fx.db.entry_count().await.unwrap(), 1);
        assert_eq!(fx.db.phrases_for("bl").await.unwrap(), vec!["binary love"]);
        let entry = fx.db.lookup_by_id("bl").await.unwrap().unwrap();
        assert_eq!(entry.filename.as_deref(), Some("Binary Love.mp3"));
        assert_eq!(entry.title.as_deref(), Some("title bl"));
        assert_eq!(*source.seen.lock().unwrap(), vec!["binary love"]);
    }

    #[tokio::test]
    async fn test_second_run_adds_no_phrases() {
        let fx = fixture(&[("binary%20love", "Binary Love.mp3")]).await;
        let source = TableSource::new(&[("binary love", "bl")]);
        let migrator = Migrator::new(&fx.legacy, &fx.db, &source);

        migrator.migrate().await;
        let second = migrator.migrate().await;

        assert_eq!(second, MigrationReport { merged: 1, ..Default::default() });
        assert_eq!(fx.db.entry_count().await.unwrap(), 1);
        assert_eq!(fx.db.phrases_for("bl").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_phrases_for_same_id_are_merged() {
        let fx = fixture(&[
            ("binary%20love", "Binary Love.mp3"),
            ("echo%20love", "Binary Love (1).mp3"),
        ])
        .await;
        let source = TableSource::new(&[("binary love", "bl"), ("echo love", "bl")]);

        let report = Migrator::new(&fx.legacy, &fx.db, &source).migrate().await;

        assert_eq!(report.migrated, 1);
        assert_eq!(report.merged, 1);
        assert_eq!(fx.db.entry_count().await.unwrap(), 1);
        assert_eq!(fx.db.phrases_for("bl").await.unwrap(), vec!["binary love", "echo love"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let fx = fixture(&[("aaa", "a.mp3"), ("broken", "b.mp3"), ("ccc", "c.mp3")]).await;
        let source = TableSource::new(&[("aaa", "a"), ("ccc", "c")]);

        let report = Migrator::new(&fx.legacy, &fx.db, &source).migrate().await;

        assert_eq!(report, MigrationReport { migrated: 2, failed: 1, ..Default::default() });
        assert!(fx.db.lookup_by_id("a").await.unwrap().is_some());
        assert!(fx.db.lookup_by_id("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_legacy_records_are_kept() {
        let fx = fixture(&[("aaa", "a.mp3")]).await;
        let source = TableSource::new(&[("aaa", "a")]);

        Migrator::new(&fx.legacy, &fx.db, &source).migrate().await;

        assert_eq!(fx.legacy.all_items().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_and_bootstrap_only_are_noops() {
        let source = TableSource::new(&[]);

        let empty = fixture(&[]).await;
        assert_eq!(Migrator::new(&empty.legacy, &empty.db, &source).migrate().await, MigrationReport::default());

        let bootstrap = fixture(&[("dummy", "dummy")]).await;
        assert_eq!(
            Migrator::new(&bootstrap.legacy, &bootstrap.db, &source).migrate().await,
            MigrationReport::default()
        );
        assert!(source.seen.lock().unwrap().is_empty());
    }
}
