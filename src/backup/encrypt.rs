// dbbackup/src/backup/encrypt.rs
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::utils::find_executable;

const PASSPHRASE_ENV: &str = "DBBACKUP_ENCRYPTION_PASSPHRASE";

/// Encrypts a file in place. The path does not change, only the content.
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// `false` means the file must be treated as unencrypted.
    async fn encrypt(&self, path: &Path) -> bool;
}

/// AES-256-CBC through the `openssl enc` command.
pub struct OpensslEncryptor {
    passphrase: String,
    program: Option<PathBuf>,
}

impl OpensslEncryptor {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self { passphrase: passphrase.into(), program: None }
    }

    /// Uses a specific openssl binary instead of looking it up on PATH.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    async fn run(&self, path: &Path) -> anyhow::Result<()> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => find_executable("openssl")?,
        };
        let staging = staging_path(path);

        let output = Command::new(program)
            .args(["enc", "-aes-256-cbc", "-salt", "-pbkdf2", "-pass"])
            .arg(format!("env:{}", PASSPHRASE_ENV))
            .arg("-in")
            .arg(path)
            .arg("-out")
            .arg(&staging)
            .env(PASSPHRASE_ENV, &self.passphrase)
            .output()
            .await?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&staging).await;
            anyhow::bail!(
                "openssl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }
}

#[async_trait]
impl Encryptor for OpensslEncryptor {
    async fn encrypt(&self, path: &Path) -> bool {
        match self.run(path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "✓ dump encrypted");
                true
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "encryption failed");
                false
            }
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(".enc.tmp");
    PathBuf::from(raw)
}
