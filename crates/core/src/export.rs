//! Change notification for cache consumers.
//!
//! After every mutation a cache pushes its complete phrase -> filename
//! projection to an [`Exporter`]. Exporter failures are logged by the caller
//! and never undo the mutation.

use crate::Error;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Phrase -> filename projection. A `None` filename marks a download in flight.
pub type Projection = BTreeMap<String, Option<String>>;

/// Receives the full projection after each cache change.
pub trait Exporter: Send + Sync {
    fn export(&self, projection: &Projection) -> Result<(), Error>;
}

/// Exporter that discards every projection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExporter;

impl Exporter for NoopExporter {
    fn export(&self, _projection: &Projection) -> Result<(), Error> {
        Ok(())
    }
}

/// Writes the projection as a pretty-printed JSON object.
///
/// Inside a tokio runtime the write runs on the blocking pool so cache
/// mutations never wait on the filesystem. Each write goes to a sibling
/// temp file that is renamed over the target; a write older than the last
/// one on disk is dropped.
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    path: PathBuf,
    issued: Arc<AtomicU64>,
    written: Arc<Mutex<u64>>,
}

impl JsonFileExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), issued: Arc::default(), written: Arc::default() }
    }

    fn write(&self, seq: u64, json: &str) -> Result<(), Error> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if seq <= *written {
            tracing::debug!(path = %self.path.display(), seq, "newer projection already exported");
            return Ok(());
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        *written = seq;
        tracing::debug!(path = %self.path.display(), seq, "exported cache projection");
        Ok(())
    }
}

impl Exporter for JsonFileExporter {
    fn export(&self, projection: &Projection) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(projection)?;
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return self.write(seq, &json);
        };
        let exporter = self.clone();
        handle.spawn_blocking(move || {
            if let Err(e) = exporter.write(seq, &json) {
                tracing::warn!(path = %exporter.path.display(), error = %e, "cache export failed");
            }
        });
        Ok(())
    }
}

/// Run an exporter, logging instead of propagating failures.
pub(crate) fn notify(exporter: &dyn Exporter, projection: &Projection) {
    if let Err(e) = exporter.export(projection) {
        tracing::warn!(error = %e, "cache export failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_file_exporter_writes_projection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let exporter = JsonFileExporter::new(&path);

        let mut projection = Projection::new();
        projection.insert("binary%20love".into(), Some("Binary Love.mp3".into()));
        projection.insert("pending".into(), None);
        exporter.export(&projection).unwrap();

        let written: Projection = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, projection);
    }

    #[tokio::test]
    async fn test_export_within_runtime_ends_on_latest_projection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let exporter = JsonFileExporter::new(&path);

        let mut projection = Projection::new();
        for i in 0..5 {
            projection.insert(format!("phrase {i}"), Some(format!("{i}.mp3")));
            exporter.export(&projection).unwrap();
        }

        let mut written = Projection::new();
        for _ in 0..200 {
            if let Ok(text) = std::fs::read_to_string(&path)
                && let Ok(parsed) = serde_json::from_str::<Projection>(&text)
            {
                written = parsed;
                if written.len() == 5 {
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(written, projection);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_notify_swallows_failures() {
        let exporter = JsonFileExporter::new("/nonexistent-dir/for/sure/export.json");
        notify(&exporter, &Projection::new());
    }
}
