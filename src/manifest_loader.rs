//! A loader that reads and parses the experiment manifest from a file on disk.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::{Document, Error, Result};

/// A loader for the on-disk manifest file.
///
/// Tracks the file's last-seen modification time so that [`load_if_changed`] can skip
/// re-parsing an unchanged file between polls. Only successful loads advance the tracked
/// time, so a manifest that fails to parse is retried on the next poll.
///
/// [`load_if_changed`]: ManifestLoader::load_if_changed
pub struct ManifestLoader {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ManifestLoader {
    pub fn new(path: impl Into<PathBuf>) -> ManifestLoader {
        ManifestLoader {
            path: path.into(),
            last_modified: None,
        }
    }

    /// Load the manifest if the file changed since the last successful load.
    ///
    /// Returns `Ok(None)` when the file is unchanged.
    pub fn load_if_changed(&mut self) -> Result<Option<Document>> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        if self.last_modified == Some(modified) {
            return Ok(None);
        }

        let document = self.load()?;
        self.last_modified = Some(modified);
        Ok(Some(document))
    }

    /// Unconditionally read and parse the manifest.
    pub fn load(&self) -> Result<Document> {
        let bytes = std::fs::read(&self.path)?;
        let manifest = serde_json::from_slice(&bytes).map_err(|err| Error::ManifestParse {
            path: self.path.display().to_string(),
            source: Arc::new(err),
        })?;

        let document = Document::from_manifest(manifest);
        log::debug!(target: "decider",
            path:display = self.path.display(),
            experiments = document.experiments.len();
            "loaded manifest");

        Ok(document)
    }
}
