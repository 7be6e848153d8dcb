//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for performance and concurrency (WAL mode, enforced foreign keys), and
//! running migrations.

use super::entries::RemovedResource;
use super::{CachedResource, EntryMetadata, Item, ResourceCache, migrations};
use crate::registry::CACHE_BACKEND;
use crate::{AppContext, Error};
use async_trait::async_trait;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Relational resource cache handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread, so each call completes before the next begins.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
    pub(crate) ctx: AppContext,
}

impl CacheDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// runs any pending migrations and reports the cache size.
    pub async fn open(path: impl AsRef<Path>, ctx: AppContext) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn, ctx).await
    }

    /// Open an in-memory database for testing.
    ///
    /// Creates a temporary in-memory SQLite database with the same
    /// pragma configuration as file-based databases.
    pub async fn open_in_memory(ctx: AppContext) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn, ctx).await
    }

    async fn init(conn: Connection, ctx: AppContext) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        let db = Self { conn, ctx };
        db.ctx.registry.register(CACHE_BACKEND, db.backend());
        db.update_cache_size().await?;
        Ok(db)
    }

    /// Context this cache reports to.
    pub fn context(&self) -> &AppContext {
        &self.ctx
    }
}

#[async_trait]
impl ResourceCache for CacheDb {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn lookup_by_phrase(&self, phrase: &str) -> Result<Option<CachedResource>, Error> {
        CacheDb::lookup_by_phrase(self, phrase).await
    }

    async fn lookup_by_id(&self, id: &str) -> Result<Option<CachedResource>, Error> {
        CacheDb::lookup_by_id(self, id).await
    }

    async fn insert(&self, phrase: &str, metadata: &EntryMetadata) -> Result<(), Error> {
        self.insert_entry(phrase, metadata).await
    }

    async fn remove_by_phrase(&self, phrase: &str) -> Result<Option<RemovedResource>, Error> {
        CacheDb::remove_by_phrase(self, phrase).await
    }

    async fn fulltext_search(&self, query: &str) -> Result<Vec<Item>, Error> {
        CacheDb::fulltext_search(self, query).await
    }

    async fn entry_count(&self) -> Result<usize, Error> {
        CacheDb::entry_count(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CACHE_SIZE;
    use serde_json::Value;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = CacheDb::open_in_memory(AppContext::detached("audio")).await.unwrap();
        let foreign_keys: i64 = db
            .conn
            .call(|conn| conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[tokio::test]
    async fn test_open_registers_backend_and_size() {
        let ctx = AppContext::detached("audio");
        let _db = CacheDb::open_in_memory(ctx.clone()).await.unwrap();
        assert_eq!(ctx.registry.get(CACHE_BACKEND), Some(Value::from("sqlite")));
        assert_eq!(ctx.registry.get(CACHE_SIZE), Some(Value::from(0)));
    }

    #[tokio::test]
    async fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let ctx = AppContext::detached(dir.path());

        {
            let db = CacheDb::open(&path, ctx.clone()).await.unwrap();
            db.insert_entry("toxic", &crate::cache::EntryMetadata::new("id-1").with_filename("t.mp3"))
                .await
                .unwrap();
        }

        let db = CacheDb::open(&path, ctx.clone()).await.unwrap();
        assert!(db.lookup_by_id("id-1").await.unwrap().is_some());
        assert_eq!(ctx.registry.get(CACHE_SIZE), Some(Value::from(1)));
    }
}
