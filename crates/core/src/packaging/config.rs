//! Packaging configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for saving results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingConfig {
    /// Delay between saves with the multiple strategy (milliseconds).
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Filename of the zip archive.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
}

fn default_stagger_ms() -> u64 {
    150
}

fn default_archive_name() -> String {
    "converted.zip".to_string()
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            stagger_ms: default_stagger_ms(),
            archive_name: default_archive_name(),
        }
    }
}

impl PackagingConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}
