// dbbackup/src/backup/metadata.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgConnection};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// One row describing a finished dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub file: String,
    pub file_name: String,
    pub prefix: Option<String>,
    pub encrypted: bool,
    /// Epoch seconds.
    pub created_at: i64,
}

/// Append-only store for backup records.
#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn append(&self, record: &BackupRecord) -> Result<()>;
}

/// Inserts into a `dumps`-style table on a Postgres database.
pub struct PostgresMetadataSink {
    database_url: String,
    table: String,
}

impl PostgresMetadataSink {
    /// `table` must already be a validated identifier.
    pub fn new(database_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self { database_url: database_url.into(), table: table.into() }
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO \"{}\" (file, file_name, prefix, encrypted, created_at) VALUES ($1, $2, $3, $4, $5)",
            self.table
        )
    }
}

#[async_trait]
impl MetadataSink for PostgresMetadataSink {
    async fn append(&self, record: &BackupRecord) -> Result<()> {
        let mut conn = PgConnection::connect(&self.database_url)
            .await
            .context("Failed to connect to the metadata database")?;

        sqlx::query(&self.insert_sql())
            .bind(&record.file)
            .bind(&record.file_name)
            .bind(&record.prefix)
            .bind(record.encrypted)
            .bind(record.created_at)
            .execute(&mut conn)
            .await
            .with_context(|| format!("Failed to insert dump record into {}", self.table))?;

        conn.close().await.ok();
        tracing::info!(table = %self.table, file = %record.file_name, "dump record saved");
        Ok(())
    }
}

/// One JSON object per line in a local file.
pub struct JsonLinesMetadataSink {
    path: PathBuf,
}

impl JsonLinesMetadataSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MetadataSink for JsonLinesMetadataSink {
    async fn append(&self, record: &BackupRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open metadata file {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to metadata file {}", self.path.display()))?;
        file.flush().await?;

        tracing::info!(path = %self.path.display(), file = %record.file_name, "dump record saved");
        Ok(())
    }
}
