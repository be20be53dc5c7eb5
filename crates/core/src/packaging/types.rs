//! Types for packaging.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while packaging results.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// Nothing to package.
    #[error("no artifacts to package")]
    Empty,

    /// Building the zip archive failed.
    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A sink could not store a file.
    #[error("failed to write {filename}: {reason}")]
    WriteFailed { filename: String, reason: String },

    /// Some files of a multiple save failed; the others were stored.
    #[error("{} file(s) could not be saved", .failed.len())]
    Incomplete {
        saved: Vec<String>,
        failed: Vec<PackagingError>,
    },
}

impl PackagingError {
    pub fn write_failed(filename: &str, err: impl std::fmt::Display) -> Self {
        Self::WriteFailed {
            filename: filename.to_string(),
            reason: err.to_string(),
        }
    }
}

/// How completed artifacts leave the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagingStrategy {
    /// One artifact saved directly.
    Single,
    /// Every artifact saved on its own, staggered.
    Multiple,
    /// One deflate-compressed archive.
    Zip,
}

impl PackagingStrategy {
    /// Picks the strategy for `count` artifacts.
    ///
    /// A single artifact is always saved directly. Otherwise the requested
    /// strategy wins and zip is the default.
    pub fn choose(count: usize, requested: Option<PackagingStrategy>) -> Self {
        match (count, requested) {
            (0 | 1, _) => Self::Single,
            (_, Some(Self::Multiple)) => Self::Multiple,
            _ => Self::Zip,
        }
    }
}

/// What a packaging call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
    pub strategy: PackagingStrategy,
    /// Names handed to the sink, in save order.
    pub files: Vec<String>,
}
