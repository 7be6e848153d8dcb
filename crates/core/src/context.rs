//! Shared collaborators handed to every component at construction.

use crate::export::{Exporter, NoopExporter};
use crate::registry::Registry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Process-owned context: the facts registry, the exporter and the
/// directory audio files live in.
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<Registry>,
    pub exporter: Arc<dyn Exporter>,
    pub audio_dir: PathBuf,
}

impl AppContext {
    pub fn new(registry: Arc<Registry>, exporter: Arc<dyn Exporter>, audio_dir: impl Into<PathBuf>) -> Self {
        Self { registry, exporter, audio_dir: audio_dir.into() }
    }

    /// Context with a fresh registry and no export, for tests and tools.
    pub fn detached(audio_dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(Registry::new()), Arc::new(NoopExporter), audio_dir)
    }

    /// Whether `filename` exists inside the audio directory.
    pub async fn audio_file_exists(&self, filename: &str) -> bool {
        let path = self.audio_path(filename);
        tracing::debug!(path = %path.display(), "looking for audio file");
        tokio::fs::try_exists(&path).await.unwrap_or(false)
    }

    pub fn audio_path(&self, filename: &str) -> PathBuf {
        self.audio_dir.join(filename)
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("registry", &self.registry)
            .field("audio_dir", &self.audio_dir)
            .finish_non_exhaustive()
    }
}
