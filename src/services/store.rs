//! Materialized artifact storage
//!
//! Artifacts are LZ4-compressed and published by writing a temporary file in
//! the store directory and renaming it into place, so a failed
//! materialization never leaves a partial file at the final path.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

/// File extension for stored artifacts
pub const ARTIFACT_EXTENSION: &str = "msa";

/// Handle to a published artifact
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactHandle {
    path: PathBuf,
}

impl ArtifactHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn for_tests(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Directory of published artifacts keyed by asset configuration
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of the artifact for `key`
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.root.join(format!("{file_name}.{ARTIFACT_EXTENSION}"))
    }

    /// Handle to an already published artifact, if any
    pub fn lookup(&self, key: &str) -> Option<ArtifactHandle> {
        let path = self.artifact_path(key);
        path.is_file().then_some(ArtifactHandle { path })
    }

    /// Compress and atomically publish `bytes` under `key`, replacing any previous artifact.
    pub fn publish(&self, key: &str, bytes: &[u8]) -> Result<ArtifactHandle> {
        let path = self.artifact_path(key);
        let compressed = lz4_flex::compress_prepend_size(bytes);

        let mut temp = tempfile::NamedTempFile::new_in(&self.root)?;
        temp.write_all(&compressed)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        log::trace!("Published artifact {} ({} -> {} bytes)", path.display(), bytes.len(), compressed.len());
        Ok(ArtifactHandle { path })
    }

    /// Read and decompress a published artifact
    pub fn read(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        let compressed = std::fs::read(&handle.path)?;
        lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| Error::Decode(format!("LZ4 decompression of {} failed: {e}", handle.path.display())))
    }

    /// Delete the artifact for `key` if it exists
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.artifact_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
