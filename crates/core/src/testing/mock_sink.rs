//! In-memory artifact sink for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::packaging::{ArtifactSink, PackagingError};

/// Mock implementation of [`ArtifactSink`] that keeps every save in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    saved: Arc<RwLock<Vec<(String, Bytes)>>>,
    fail_on: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects saves of `filename`.
    pub fn failing_on(filename: impl Into<String>) -> Self {
        Self {
            fail_on: Some(filename.into()),
            ..Self::default()
        }
    }

    /// Saved files in save order.
    pub async fn saved(&self) -> Vec<(String, Bytes)> {
        self.saved.read().await.clone()
    }

    pub async fn filenames(&self) -> Vec<String> {
        self.saved.read().await.iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn save(&self, bytes: Bytes, filename: &str) -> Result<String, PackagingError> {
        if self.fail_on.as_deref() == Some(filename) {
            return Err(PackagingError::WriteFailed {
                filename: filename.to_string(),
                reason: "mock sink failure".to_string(),
            });
        }
        self.saved.write().await.push((filename.to_string(), bytes));
        Ok(filename.to_string())
    }
}
