// dbbackup/src/backup/dropbox.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::config::DropboxConfig;

/// File-sync service that takes a whole file body under a key.
#[async_trait]
pub trait FileSync: Send + Sync {
    async fn put(&self, key: &str, contents: Vec<u8>) -> Result<()>;
}

pub struct DropboxClient {
    http: reqwest::Client,
    access_token: String,
    upload_url: String,
}

impl DropboxClient {
    pub fn new(config: &DropboxConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: config.access_token.clone(),
            upload_url: format!("{}/2/files/upload", config.content_url.trim_end_matches('/')),
        }
    }
}

/// Dropbox paths are absolute and never end with a slash.
fn dropbox_path(key: &str) -> String {
    format!("/{}", key.trim_start_matches('/'))
}

fn upload_arg(key: &str) -> String {
    serde_json::json!({
        "path": dropbox_path(key),
        "mode": "overwrite",
        "autorename": false,
        "mute": true,
    })
    .to_string()
}

#[async_trait]
impl FileSync for DropboxClient {
    async fn put(&self, key: &str, contents: Vec<u8>) -> Result<()> {
        tracing::info!(path = %dropbox_path(key), bytes = contents.len(), "uploading dump to Dropbox");

        let response = self
            .http
            .post(&self.upload_url)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("Dropbox-API-Arg", upload_arg(key))
            .body(contents)
            .send()
            .await
            .with_context(|| format!("Failed to send Dropbox upload for {}", key))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Dropbox upload for {} returned {}: {}", key, status, body.trim());
        }

        tracing::info!(path = %dropbox_path(key), "✅ uploaded to Dropbox");
        Ok(())
    }
}
