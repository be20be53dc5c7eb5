//! Destinations for packaged files.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::naming::make_unique_filename;

use super::types::PackagingError;

/// Where packaged files are written.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Stores `bytes` under `filename` and returns the name actually used.
    async fn save(&self, bytes: Bytes, filename: &str) -> Result<String, PackagingError>;
}

/// Writes files into a directory, creating it on first save.
///
/// Existing files are never replaced: a taken name gets the next free `_N`
/// suffix.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(&self, bytes: Bytes, filename: &str) -> Result<String, PackagingError> {
        // Names come from the naming service, but never trust a separator.
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackagingError::write_failed(filename, "not a file name"))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PackagingError::write_failed(filename, e))?;

        let mut taken = HashSet::new();
        loop {
            let candidate = make_unique_filename(name, &taken);
            let path = self.dir.join(&candidate);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(&bytes)
                        .await
                        .map_err(|e| PackagingError::write_failed(&candidate, e))?;
                    file.flush()
                        .await
                        .map_err(|e| PackagingError::write_failed(&candidate, e))?;
                    debug!(path = %path.display(), bytes = bytes.len(), "File saved");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Name taken, trying next");
                    taken.insert(candidate);
                }
                Err(e) => return Err(PackagingError::write_failed(filename, e)),
            }
        }
    }
}
