//! MCP tool implementations.
//!
//! This module contains all tools exposed by the tunecache server.

pub mod app_info;
pub mod audio_resolve;
pub mod cache;

pub use app_info::info_impl;
pub use audio_resolve::{AudioResolveParams, resolve_impl};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tunecache_core::{AppContext, AudioSource, CacheDb, EntryMetadata, Error, Resolver};

    /// Source naming every phrase `stub-<phrase>` and "downloading" by
    /// writing an empty file.
    #[derive(Debug, Default)]
    pub struct StubSource {
        pub fail_extraction: bool,
        pub audio_dir: PathBuf,
    }

    #[async_trait]
    impl AudioSource for StubSource {
        async fn resolve_phrase(&self, phrase: &str) -> Result<EntryMetadata, Error> {
            if self.fail_extraction {
                return Err(Error::ExtractionFailed(format!("no results for {phrase}")));
            }
            Ok(EntryMetadata::new(format!("stub-{}", phrase.to_lowercase())))
        }

        async fn download(&self, id: &str) -> Result<String, Error> {
            let filename = format!("{id}.mp3");
            tokio::fs::write(self.audio_dir.join(&filename), b"ID3").await?;
            Ok(filename)
        }
    }

    pub struct Fixture {
        pub _dir: tempfile::TempDir,
        pub resolver: Resolver,
    }

    pub async fn fixture(mut source: StubSource) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        source.audio_dir = dir.path().to_path_buf();
        let db = CacheDb::open_in_memory(AppContext::detached(dir.path())).await.unwrap();
        Fixture { resolver: Resolver::new(db, Arc::new(source)), _dir: dir }
    }
}
