// dbbackup/src/backup/report.rs
use thiserror::Error;
use uuid::Uuid;

use crate::backup::artifact::{Artifact, Stage, StageOutcome};
use crate::backup::destination::DestinationResult;
use crate::errors::BackupError;

/// Summary of a run that reached `Done`.
#[derive(Debug)]
pub struct BackupReport {
    pub run_id: Uuid,
    pub artifact: Artifact,
    pub compressed: bool,
    pub encrypted: bool,
    pub recorded: bool,
    pub destinations: Vec<DestinationResult>,
    pub local_removed: bool,
    /// Non-fatal failures, one per failed destination or side stage.
    pub warnings: Vec<BackupError>,
}

impl BackupReport {
    pub fn new(run_id: Uuid, artifact: Artifact) -> Self {
        Self {
            run_id,
            artifact,
            compressed: false,
            encrypted: false,
            recorded: false,
            destinations: Vec::new(),
            local_removed: false,
            warnings: Vec::new(),
        }
    }

    /// Records a non-fatal failure. Fatal errors belong in a `PipelineAbort`.
    pub fn warn(&mut self, error: BackupError) {
        debug_assert!(!error.is_fatal(), "fatal error recorded as warning: {}", error);
        self.warnings.push(error);
    }

    pub fn failed_destinations(&self) -> impl Iterator<Item = &DestinationResult> {
        self.destinations.iter().filter(|d| !d.succeeded())
    }

    /// Human-readable lines for the terminal, in the order things happened.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Database backup was successful. {} was saved to {}",
            self.artifact.name,
            self.artifact.path.display()
        )];
        if self.encrypted {
            lines.push("The dump is encrypted.".to_string());
        }
        if self.recorded {
            lines.push("Dump name saved.".to_string());
        }
        for result in &self.destinations {
            lines.push(match &result.outcome {
                StageOutcome::Success => format!("✓ {}: stored as {}", result.destination, result.location),
                StageOutcome::Failure(reason) => format!("✗ {}: {}", result.destination, reason),
            });
        }
        if self.local_removed {
            lines.push(format!("Local dump {} removed.", self.artifact.path.display()));
        }
        for warning in &self.warnings {
            lines.push(format!("⚠️ {}", warning));
        }
        lines
    }
}

/// A run that stopped before `Done`. Nothing after `stage` was attempted.
#[derive(Debug, Error)]
#[error("Backup aborted at {stage}: {error}")]
pub struct PipelineAbort {
    pub run_id: Uuid,
    pub stage: Stage,
    #[source]
    pub error: BackupError,
    /// The local file as it was left, if naming got that far.
    pub artifact: Option<Artifact>,
    /// Set when encryption was requested but a plaintext file was left behind.
    pub untrusted: bool,
}

impl PipelineAbort {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("❌ {}", self)];
        if let (Some(artifact), true) = (&self.artifact, self.untrusted) {
            lines.push(format!(
                "⚠️ {} is not encrypted and must not be distributed.",
                artifact.path.display()
            ));
        }
        lines
    }
}
