// dbbackup/src/backup/archive.rs
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use crate::backup::artifact::{Artifact, Stage};
use crate::errors::{BackupError, Result};

pub const GZIP_SUFFIX: &str = ".gz";

/// Replaces the artifact's file with a compressed version of itself.
///
/// On success the artifact points at the compressed file and the original
/// file is gone.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, artifact: &mut Artifact) -> Result<()>;
}

/// gzip at the best compression level, like `gzip -9`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self { level: Compression::best() }
    }
}

#[async_trait]
impl Compressor for GzipCompressor {
    async fn compress(&self, artifact: &mut Artifact) -> Result<()> {
        let source = artifact.path.clone();
        let mut compressed = artifact.clone();
        compressed.push_suffix(GZIP_SUFFIX);
        let target = compressed.path.clone();
        let level = self.level;

        tokio::task::spawn_blocking(move || gzip_file(&source, &target, level))
            .await
            .map_err(|e| transform_error(format!("compression task failed: {}", e)))??;

        *artifact = compressed;
        Ok(())
    }
}

fn gzip_file(source: &Path, target: &Path, level: Compression) -> Result<()> {
    let input = File::open(source).map_err(|e| {
        transform_error(format!("Failed to open dump file {}: {}", source.display(), e))
    })?;
    let output = File::create(target).map_err(|e| {
        transform_error(format!("Failed to create compressed file {}: {}", target.display(), e))
    })?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), level);
    let written = io::copy(&mut BufReader::new(input), &mut encoder)
        .and_then(|_| encoder.finish())
        .and_then(|mut writer| writer.flush());
    if let Err(e) = written {
        let _ = fs::remove_file(target);
        return Err(transform_error(format!(
            "Failed to gzip {} into {}: {}",
            source.display(),
            target.display(),
            e
        )));
    }

    fs::remove_file(source).map_err(|e| {
        transform_error(format!(
            "Compressed {} but could not remove the original: {}",
            source.display(),
            e
        ))
    })?;

    tracing::info!(path = %target.display(), "✓ dump compressed");
    Ok(())
}

fn transform_error(detail: String) -> BackupError {
    BackupError::Transform { stage: Stage::Compressing, detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[tokio::test]
    async fn test_gzip_consumes_original_and_renames_artifact() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("nightly.sql");
        let body = "INSERT INTO users VALUES (1, 'ada');\n".repeat(200);
        fs::write(&path, &body)?;

        let mut artifact = Artifact::new(path.clone(), "nightly.sql".into());
        GzipCompressor::default().compress(&mut artifact).await?;

        assert_eq!(artifact.name, "nightly.sql.gz");
        assert_eq!(artifact.path, tmp.path().join("nightly.sql.gz"));
        assert!(!path.exists());

        let mut decoded = String::new();
        GzDecoder::new(File::open(&artifact.path)?).read_to_string(&mut decoded)?;
        assert_eq!(decoded, body);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_source_is_transform_error_and_artifact_untouched() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("missing.sql");
        let mut artifact = Artifact::new(path.clone(), "missing.sql".into());

        let result = GzipCompressor::default().compress(&mut artifact).await;
        assert!(matches!(
            result,
            Err(BackupError::Transform { stage: Stage::Compressing, .. })
        ));
        assert_eq!(artifact.path, path);
        Ok(())
    }
}
