//! Audio source abstraction.
//!
//! The extraction/download backend is a black box to the cache. The
//! [`AudioSource`] trait is the seam the migrator and the resolver depend on,
//! so the concrete downloader can be swapped (or faked in tests).

use crate::Error;
use crate::cache::EntryMetadata;
use async_trait::async_trait;

/// Stable audio source trait.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Resolve a free-text phrase to an external id plus descriptive metadata.
    ///
    /// The returned metadata has no `filename`. Fails with
    /// [`Error::ExtractionFailed`].
    async fn resolve_phrase(&self, phrase: &str) -> Result<EntryMetadata, Error>;

    /// Download the resource with the given id, returning the filename
    /// relative to the audio directory. Fails with [`Error::DownloadFailed`].
    async fn download(&self, id: &str) -> Result<String, Error>;
}
