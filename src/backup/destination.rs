// dbbackup/src/backup/destination.rs
use std::fmt;
use std::sync::Arc;

use crate::backup::artifact::{Artifact, StageOutcome};
use crate::backup::dropbox::FileSync;
use crate::backup::s3_upload::ObjectStore;
use crate::errors::{BackupError, Result};

/// Where a finished artifact can be stored. New backends are new variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Local,
    ObjectStore { bucket: String },
    FileSync,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Local => f.write_str("local"),
            Destination::ObjectStore { bucket } => write!(f, "s3:{}", bucket),
            Destination::FileSync => f.write_str("dropbox"),
        }
    }
}

/// Clients and key prefixes shared by every upload of a run.
#[derive(Clone, Default)]
pub struct UploadTargets {
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub object_store_prefix: String,
    pub file_sync: Option<Arc<dyn FileSync>>,
    pub file_sync_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationResult {
    pub destination: Destination,
    /// Key, path or local file the artifact was stored under.
    pub location: String,
    pub outcome: StageOutcome,
}

impl DestinationResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }
}

impl Destination {
    pub fn is_object_store(&self) -> bool {
        matches!(self, Destination::ObjectStore { .. })
    }

    /// Where `artifact` ends up for this destination.
    pub fn location(&self, artifact: &Artifact, targets: &UploadTargets) -> String {
        match self {
            Destination::Local => artifact.path.display().to_string(),
            Destination::ObjectStore { .. } => artifact.key_under(&targets.object_store_prefix),
            Destination::FileSync => artifact.key_under(&targets.file_sync_prefix),
        }
    }

    pub async fn store(&self, artifact: &Artifact, targets: &UploadTargets) -> Result<()> {
        let upload_error = |detail: String| BackupError::Upload { destination: self.to_string(), detail };
        match self {
            Destination::Local => {
                let exists = tokio::fs::try_exists(&artifact.path)
                    .await
                    .map_err(|e| upload_error(e.to_string()))?;
                if !exists {
                    return Err(upload_error(format!(
                        "{} is not present on local storage",
                        artifact.path.display()
                    )));
                }
                Ok(())
            }
            Destination::ObjectStore { bucket } => {
                let store = targets
                    .object_store
                    .as_ref()
                    .ok_or_else(|| upload_error("object storage is not configured".into()))?;
                let key = self.location(artifact, targets);
                store
                    .put(bucket, &key, &artifact.path)
                    .await
                    .map_err(|e| upload_error(format!("{:#}", e)))
            }
            Destination::FileSync => {
                let sync = targets
                    .file_sync
                    .as_ref()
                    .ok_or_else(|| upload_error("file sync is not configured".into()))?;
                let contents = tokio::fs::read(&artifact.path).await.map_err(|e| {
                    upload_error(format!("Failed to read {}: {}", artifact.path.display(), e))
                })?;
                let key = self.location(artifact, targets);
                sync.put(&key, contents).await.map_err(|e| upload_error(format!("{:#}", e)))
            }
        }
    }

    /// Only the local variant can remove the artifact it holds.
    pub async fn remove(&self, artifact: &Artifact) -> Result<()> {
        match self {
            Destination::Local => tokio::fs::remove_file(&artifact.path).await.map_err(|e| {
                BackupError::Cleanup(format!("{}: {}", artifact.path.display(), e))
            }),
            other => Err(BackupError::Cleanup(format!("{} cannot remove local files", other))),
        }
    }
}

/// Runs every store concurrently and returns one result per destination, in
/// the order given.
pub async fn fan_out(
    destinations: &[Destination],
    artifact: &Artifact,
    targets: &UploadTargets,
) -> Vec<(DestinationResult, Option<BackupError>)> {
    let handles: Vec<_> = destinations
        .iter()
        .cloned()
        .map(|destination| {
            let artifact = artifact.clone();
            let targets = targets.clone();
            tokio::spawn(async move { destination.store(&artifact, &targets).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (handle, destination) in handles.into_iter().zip(destinations) {
        let location = destination.location(artifact, targets);
        let (outcome, error) = match handle.await {
            Ok(Ok(())) => (StageOutcome::Success, None),
            Ok(Err(e)) => (StageOutcome::Failure(e.to_string()), Some(e)),
            Err(join_error) => {
                let e = BackupError::Upload {
                    destination: destination.to_string(),
                    detail: format!("upload task failed: {}", join_error),
                };
                (StageOutcome::Failure(e.to_string()), Some(e))
            }
        };
        results.push((
            DestinationResult { destination: destination.clone(), location, outcome },
            error,
        ));
    }
    results
}
