// dbbackup/src/backup/naming.rs
use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{self, Path, PathBuf};

use crate::backup::artifact::{Artifact, BackupRequest};
use crate::errors::{BackupError, Result};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Turns a request into the initial artifact path and name.
#[derive(Debug, Clone)]
pub struct NamingScheme {
    dumps_dir: PathBuf,
    append_extension: bool,
}

impl NamingScheme {
    pub fn new(dumps_dir: impl Into<PathBuf>, append_extension: bool) -> Self {
        Self { dumps_dir: dumps_dir.into(), append_extension }
    }

    /// Resolves the artifact for `request` and makes sure its directory exists.
    pub fn resolve(&self, request: &BackupRequest, extension: &str) -> Result<Artifact> {
        self.resolve_at(request, extension, Local::now())
    }

    pub fn resolve_at(
        &self,
        request: &BackupRequest,
        extension: &str,
        now: DateTime<Local>,
    ) -> Result<Artifact> {
        let artifact = self.derive(request, extension, now)?;
        let dir = artifact
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(self.dumps_dir.as_path());
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "creating dump directory");
            fs::create_dir_all(dir).map_err(|e| {
                BackupError::Io(io::Error::new(
                    e.kind(),
                    format!("Failed to create dump directory {}: {}", dir.display(), e),
                ))
            })?;
        }
        Ok(artifact)
    }

    /// Pure part of naming: no filesystem access.
    pub fn derive(
        &self,
        request: &BackupRequest,
        extension: &str,
        now: DateTime<Local>,
    ) -> Result<Artifact> {
        match request.target.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(target) if target.contains(path::is_separator) => {
                let dump_path = PathBuf::from(target);
                let name = dump_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .filter(|_| !target.ends_with(path::is_separator))
                    .map(str::to_string)
                    .ok_or_else(|| {
                        BackupError::config(format!("Dump path {} does not end with a file name", target))
                    })?;
                Ok(Artifact::new(dump_path, name))
            }
            Some(file_name) => {
                let name = if self.append_extension && Path::new(file_name).extension().is_none() {
                    with_extension(file_name, extension)
                } else {
                    file_name.to_string()
                };
                Ok(Artifact::new(self.dumps_dir.join(&name), name))
            }
            None => {
                let stem = format!(
                    "{}_{}",
                    request.connection_id.replace(is_name_separator, "_"),
                    now.format(TIMESTAMP_FORMAT)
                );
                let name = with_extension(&stem, extension);
                Ok(Artifact::new(self.dumps_dir.join(&name), name))
            }
        }
    }
}

/// Never allowed inside a synthesized name, whatever the host platform.
fn is_name_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn with_extension(stem: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, extension)
    }
}
