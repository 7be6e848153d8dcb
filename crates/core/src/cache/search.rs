//! Fulltext search over the relational cache.
//!
//! A phrase row matches when it equals the case-folded query, or when its
//! entry's filename contains the query after case folding. Every matching
//! phrase row becomes its own [`Item`]; collapse with
//! [`unique_by_filename`](super::unique_by_filename) for one hit per file.

use super::connection::CacheDb;
use super::{Item, normalize_phrase};
use crate::Error;
use tokio_rusqlite::rusqlite;

fn matches(query: &str, item: &Item) -> bool {
    item.phrase == query
        || item
            .filename
            .as_deref()
            .is_some_and(|filename| filename.to_lowercase().contains(query))
}

impl CacheDb {
    /// Search phrases and filenames, one item per matching phrase.
    ///
    /// Filenames are folded in Rust rather than with SQLite's `lower()`,
    /// which only folds ASCII.
    pub async fn fulltext_search(&self, query: &str) -> Result<Vec<Item>, Error> {
        let query = normalize_phrase(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .conn
            .call(|conn| -> Result<Vec<Item>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.phrase, e.filename, e.title, e.artist
                     FROM phrase p JOIN entry e ON e.id = p.entry_id
                     ORDER BY p.id",
                )?;
                let items = stmt
                    .query_map([], |row| {
                        Ok(Item { phrase: row.get(0)?, filename: row.get(1)?, title: row.get(2)?, artist: row.get(3)? })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
            .map_err(Error::from)?;

        let hits: Vec<Item> = rows.into_iter().filter(|item| matches(&query, item)).collect();
        tracing::debug!(%query, hits = hits.len(), "fulltext search");
        Ok(hits)
    }
}
