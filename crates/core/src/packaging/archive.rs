//! Zip archive building.

use bytes::Bytes;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::naming::UsedNames;
use crate::orchestrator::ResultArtifact;

use super::types::PackagingError;

/// Packs `artifacts` into a deflate-compressed zip.
///
/// Entry names pass through a fresh collision resolver, so artifacts from
/// different sessions that share a name become `name`, `name_1`, ...
pub fn archive(artifacts: &[ResultArtifact]) -> Result<Bytes, PackagingError> {
    if artifacts.is_empty() {
        return Err(PackagingError::Empty);
    }

    let names = UsedNames::new();
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for artifact in artifacts {
        let name = names.claim(&artifact.filename);
        writer.start_file(name.as_str(), options)?;
        writer
            .write_all(&artifact.bytes)
            .map_err(|e| PackagingError::write_failed(&name, e))?;
    }

    let cursor = writer.finish()?;
    let bytes = cursor.into_inner();
    debug!(entries = artifacts.len(), bytes = bytes.len(), "Archive built");
    Ok(Bytes::from(bytes))
}
