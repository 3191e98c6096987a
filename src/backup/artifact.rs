// dbbackup/src/backup/artifact.rs
use std::fmt;
use std::path::PathBuf;

/// What the caller asked for. Built once per run and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupRequest {
    /// Bare file name or full path for the dump. `None` synthesizes one.
    pub target: Option<String>,
    pub connection_id: String,
    pub options: BackupOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupOptions {
    pub encrypt: bool,
    pub file_sync: bool,
    pub save_dump_name: bool,
    pub object_store_bucket: Option<String>,
    pub keep_only_remote: bool,
    pub retain_local: bool,
}

impl BackupRequest {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self { connection_id: connection_id.into(), ..Default::default() }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }
}

/// The dump file as it currently exists on local storage.
///
/// `name` is always the final component of `path`; both change together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub name: String,
}

impl Artifact {
    pub fn new(path: PathBuf, name: String) -> Self {
        Self { path, name }
    }

    /// Appends `suffix` (e.g. `.gz`) to both path and name.
    pub fn push_suffix(&mut self, suffix: &str) {
        let mut raw = self.path.clone().into_os_string();
        raw.push(suffix);
        self.path = PathBuf::from(raw);
        self.name.push_str(suffix);
    }

    /// Remote object key for this artifact under `prefix`.
    pub fn key_under(&self, prefix: &str) -> String {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", prefix, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failure(String),
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validating,
    Naming,
    Dumping,
    Compressing,
    Encrypting,
    Recording,
    Uploading,
    Cleaning,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Validating => "Validating",
            Stage::Naming => "Naming",
            Stage::Dumping => "Dumping",
            Stage::Compressing => "Compressing",
            Stage::Encrypting => "Encrypting",
            Stage::Recording => "Recording",
            Stage::Uploading => "Uploading",
            Stage::Cleaning => "Cleaning",
            Stage::Done => "Done",
        };
        f.write_str(label)
    }
}
