//! Saving results with the single, multiple or zip strategy.

use bytes::Bytes;
use tracing::{info, warn};

use crate::orchestrator::ResultArtifact;

use super::archive::archive;
use super::config::PackagingConfig;
use super::sink::ArtifactSink;
use super::types::{PackageSummary, PackagingError, PackagingStrategy};

/// Hands completed artifacts to an [`ArtifactSink`].
pub struct Packager<S: ArtifactSink> {
    config: PackagingConfig,
    sink: S,
}

impl<S: ArtifactSink> Packager<S> {
    pub fn new(config: PackagingConfig, sink: S) -> Self {
        Self { config, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Saves one file as is and returns the stored name.
    pub async fn save_single(&self, bytes: Bytes, filename: &str) -> Result<String, PackagingError> {
        self.sink.save(bytes, filename).await
    }

    /// Saves every artifact on its own, pausing between saves.
    ///
    /// A failed save does not stop the others. If any failed, the result is
    /// [`PackagingError::Incomplete`] carrying both the stored names and the
    /// failures.
    pub async fn save_multiple(&self, artifacts: &[ResultArtifact]) -> Result<Vec<String>, PackagingError> {
        if artifacts.is_empty() {
            return Err(PackagingError::Empty);
        }
        let mut saved = Vec::with_capacity(artifacts.len());
        let mut failed = Vec::new();
        for (i, artifact) in artifacts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.stagger()).await;
            }
            match self.sink.save(artifact.bytes.clone(), &artifact.filename).await {
                Ok(name) => saved.push(name),
                Err(e) => {
                    warn!(filename = %artifact.filename, error = %e, "Save failed");
                    failed.push(e);
                }
            }
        }
        if failed.is_empty() {
            Ok(saved)
        } else {
            Err(PackagingError::Incomplete { saved, failed })
        }
    }

    /// Packages `artifacts` with the strategy chosen for their count.
    pub async fn package(
        &self,
        artifacts: &[ResultArtifact],
        requested: Option<PackagingStrategy>,
    ) -> Result<PackageSummary, PackagingError> {
        let strategy = PackagingStrategy::choose(artifacts.len(), requested);
        let files = match strategy {
            PackagingStrategy::Single => {
                let artifact = artifacts.first().ok_or(PackagingError::Empty)?;
                vec![
                    self.save_single(artifact.bytes.clone(), &artifact.filename)
                        .await?,
                ]
            }
            PackagingStrategy::Multiple => self.save_multiple(artifacts).await?,
            PackagingStrategy::Zip => {
                let bytes = archive(artifacts)?;
                vec![self.save_single(bytes, &self.config.archive_name).await?]
            }
        };

        info!(strategy = ?strategy, artifacts = artifacts.len(), files = files.len(), "Results packaged");
        Ok(PackageSummary { strategy, files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ids::WEBP;
    use crate::packaging::DirectorySink;
    use crate::testing::MemorySink;
    use std::time::Duration;
    use tokio::time::Instant;

    fn artifact(name: &str) -> ResultArtifact {
        ResultArtifact {
            bytes: Bytes::from(name.as_bytes().to_vec()),
            filename: name.to_string(),
            content_type: "image/webp".to_string(),
            format: WEBP,
            dimensions: None,
        }
    }

    #[tokio::test]
    async fn test_single_artifact_is_saved_directly() {
        let packager = Packager::new(PackagingConfig::default(), MemorySink::new());
        let summary = packager.package(&[artifact("a.webp")], None).await.unwrap();
        assert_eq!(summary.strategy, PackagingStrategy::Single);
        assert_eq!(packager.sink().filenames().await, vec!["a.webp"]);
    }

    #[tokio::test]
    async fn test_many_artifacts_default_to_zip() {
        let packager = Packager::new(PackagingConfig::default(), MemorySink::new());
        let summary = packager
            .package(&[artifact("a.webp"), artifact("b.webp")], None)
            .await
            .unwrap();
        assert_eq!(summary.strategy, PackagingStrategy::Zip);
        assert_eq!(summary.files, vec!["converted.zip"]);

        let saved = packager.sink().saved().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(&saved[0].1[..2], b"PK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_saves_are_staggered() {
        let packager = Packager::new(PackagingConfig::default(), MemorySink::new());
        let started = Instant::now();
        let summary = packager
            .package(
                &[artifact("a.webp"), artifact("b.webp"), artifact("c.webp")],
                Some(PackagingStrategy::Multiple),
            )
            .await
            .unwrap();

        assert_eq!(summary.files, vec!["a.webp", "b.webp", "c.webp"]);
        assert_eq!(Instant::now() - started, Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_empty_list_is_an_error() {
        let packager = Packager::new(PackagingConfig::default(), MemorySink::new());
        assert!(matches!(
            packager.package(&[], None).await,
            Err(PackagingError::Empty)
        ));
        assert!(matches!(
            packager.save_multiple(&[]).await,
            Err(PackagingError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_failed_save_does_not_stop_the_others() {
        let config = PackagingConfig {
            stagger_ms: 0,
            ..PackagingConfig::default()
        };
        let packager = Packager::new(config, MemorySink::failing_on("b.webp"));
        let err = packager
            .save_multiple(&[artifact("a.webp"), artifact("b.webp"), artifact("c.webp")])
            .await
            .unwrap_err();

        match err {
            PackagingError::Incomplete { saved, failed } => {
                assert_eq!(saved, vec!["a.webp", "c.webp"]);
                assert_eq!(failed.len(), 1);
                assert!(matches!(
                    &failed[0],
                    PackagingError::WriteFailed { filename, .. } if filename == "b.webp"
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(packager.sink().filenames().await, vec!["a.webp", "c.webp"]);
    }

    #[tokio::test]
    async fn test_summary_reports_names_chosen_by_the_sink() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("converted.zip"), b"older archive").unwrap();
        let packager = Packager::new(PackagingConfig::default(), DirectorySink::new(temp.path()));

        let summary = packager
            .package(&[artifact("a.webp"), artifact("b.webp")], None)
            .await
            .unwrap();

        assert_eq!(summary.files, vec!["converted_1.zip"]);
        assert_eq!(
            std::fs::read(temp.path().join("converted.zip")).unwrap(),
            b"older archive"
        );
    }
}
