// dbbackup/src/config/mod.rs
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_DUMPS_DIR: &str = "storage/dumps";
const DEFAULT_S3_PREFIX: &str = "dumps";
const DEFAULT_METADATA_TABLE: &str = "dumps";
const DEFAULT_METADATA_FILE: &str = "dumps.jsonl";
const DEFAULT_DROPBOX_CONTENT_URL: &str = "https://content.dropboxapi.com";

pub const DROPBOX_TOKEN_ENV: &str = "DROPBOX_ACCESS_TOKEN";
pub const ENCRYPTION_KEY_ENV: &str = "DB_BACKUP_ENCRYPTION_KEY";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonConnection {
    pub driver: String,
    pub url: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonDropboxConfig {
    pub access_token: Option<String>,
    pub prefix: Option<String>,
    pub content_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonEncryptionConfig {
    pub passphrase: Option<String>,
    pub openssl_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonMetadataConfig {
    pub database_url: Option<String>,
    pub table: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub dumps_dir: Option<PathBuf>,
    pub default_connection: Option<String>,
    pub compress: Option<bool>,
    pub append_extension: Option<bool>,
    pub connections: Option<HashMap<String, JsonConnection>>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub dropbox: Option<JsonDropboxConfig>,
    pub encryption: Option<JsonEncryptionConfig>,
    pub metadata: Option<JsonMetadataConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfig {
    Postgres { url: String },
    MySql { url: String },
    Sqlite { path: PathBuf },
}

impl ConnectionConfig {
    pub fn default_extension(&self) -> &'static str {
        match self {
            ConnectionConfig::Postgres { .. } | ConnectionConfig::MySql { .. } => "sql",
            ConnectionConfig::Sqlite { .. } => "sqlite",
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    /// `(access_key_id, secret_access_key)`; `None` uses the default provider chain.
    pub static_credentials: Option<(String, String)>,
    pub folder_prefix: String,
}

#[derive(Debug, Clone)]
pub struct DropboxConfig {
    pub access_token: String,
    pub prefix: String,
    /// Base of the content API; upload requests go to `<content_url>/2/files/upload`.
    pub content_url: String,
}

#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    pub passphrase: String,
    pub openssl_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub database_url: Option<String>,
    pub table: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dumps_dir: PathBuf,
    pub default_connection: String,
    pub compress: bool,
    pub append_extension: bool,
    pub connections: HashMap<String, ConnectionConfig>,
    pub s3: S3Config,
    pub dropbox: Option<DropboxConfig>,
    pub encryption: Option<EncryptionConfig>,
    pub metadata: MetadataConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        Self::from_raw(raw_json_config, |key| std::env::var(key).ok())
    }

    /// Validates the raw file contents. `env` supplies secrets that may live
    /// outside config.json.
    pub fn from_raw(raw: RawJsonConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let dumps_dir = raw
            .dumps_dir
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DUMPS_DIR));

        let connections = parse_connections(raw.connections.unwrap_or_default())?;
        if connections.is_empty() {
            anyhow::bail!("At least one entry in 'connections' must be set in config.json");
        }

        let default_connection = match raw.default_connection.filter(|s| !s.trim().is_empty()) {
            Some(name) => name,
            None if connections.len() == 1 => connections.keys().next().cloned().unwrap_or_default(),
            None => anyhow::bail!(
                "default_connection must be set in config.json when more than one connection is configured"
            ),
        };
        if !connections.contains_key(&default_connection) {
            anyhow::bail!(
                "default_connection '{}' is not listed in 'connections'",
                default_connection
            );
        }

        let metadata = raw.metadata.as_ref();
        let metadata = MetadataConfig {
            database_url: metadata
                .and_then(|m| m.database_url.clone())
                .filter(|s| !s.is_empty()),
            table: metadata
                .and_then(|m| m.table.clone())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_METADATA_TABLE.to_string()),
            file: metadata
                .and_then(|m| m.file.clone())
                .unwrap_or_else(|| dumps_dir.join(DEFAULT_METADATA_FILE)),
        };
        if !valid_identifier(&metadata.table) {
            anyhow::bail!("metadata.table '{}' is not a valid table name", metadata.table);
        }

        Ok(AppConfig {
            compress: raw.compress.unwrap_or(true),
            append_extension: raw.append_extension.unwrap_or(true),
            s3: parse_s3(raw.s3_storage.as_ref()),
            dropbox: parse_dropbox(raw.dropbox.as_ref(), &env),
            encryption: parse_encryption(raw.encryption, &env),
            dumps_dir,
            default_connection,
            connections,
            metadata,
        })
    }

    /// Picks the requested connection, or the default one.
    pub fn connection_id(&self, requested: Option<&str>) -> Result<String> {
        let name = requested.unwrap_or(&self.default_connection);
        if self.connections.contains_key(name) {
            Ok(name.to_string())
        } else {
            Err(anyhow::anyhow!(
                "Database connection '{}' is not configured. Known connections: {:?}",
                name,
                self.connections.keys().collect::<Vec<_>>()
            ))
        }
    }
}

fn valid_identifier(name: &str) -> bool {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Parses the connections map into typed connection settings.
fn parse_connections(
    raw: HashMap<String, JsonConnection>,
) -> Result<HashMap<String, ConnectionConfig>> {
    let mut connections = HashMap::with_capacity(raw.len());
    for (name, conn) in raw {
        if !valid_identifier(&name) {
            anyhow::bail!("Invalid character in connection name '{}'", name);
        }
        let parsed = match conn.driver.to_ascii_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => ConnectionConfig::Postgres {
                url: conn
                    .url
                    .filter(|u| !u.is_empty())
                    .with_context(|| format!("connections.{}.url must be set for pgsql", name))?,
            },
            "mysql" | "mariadb" => ConnectionConfig::MySql {
                url: conn
                    .url
                    .filter(|u| !u.is_empty())
                    .with_context(|| format!("connections.{}.url must be set for mysql", name))?,
            },
            "sqlite" => ConnectionConfig::Sqlite {
                path: conn
                    .path
                    .filter(|p| !p.as_os_str().is_empty())
                    .with_context(|| format!("connections.{}.path must be set for sqlite", name))?,
            },
            other => anyhow::bail!("Unsupported driver '{}' for connection '{}'", other, name),
        };
        connections.insert(name, parsed);
    }
    Ok(connections)
}

fn parse_s3(raw: Option<&JsonS3StorageConfig>) -> S3Config {
    let non_empty = |v: Option<&String>| v.filter(|s| !s.is_empty()).cloned();
    let static_credentials = raw.and_then(|s3_raw| {
        match (
            non_empty(s3_raw.access_key_id.as_ref()),
            non_empty(s3_raw.secret_access_key.as_ref()),
        ) {
            (Some(key_id), Some(secret)) => Some((key_id, secret)),
            (None, None) => None,
            _ => {
                tracing::warn!(
                    "s3_storage has only one of access_key_id/secret_access_key set; using the default AWS credential chain"
                );
                None
            }
        }
    });

    S3Config {
        region: raw.and_then(|s| non_empty(s.region.as_ref())),
        endpoint_url: raw.and_then(|s| non_empty(s.endpoint_url.as_ref())),
        static_credentials,
        folder_prefix: raw
            .and_then(|s| s.folder_prefix.clone())
            .unwrap_or_else(|| DEFAULT_S3_PREFIX.to_string()),
    }
}

/// A non-empty environment value wins over the file.
fn secret(env: &impl Fn(&str) -> Option<String>, key: &str, from_file: Option<String>) -> Option<String> {
    env(key)
        .filter(|s| !s.is_empty())
        .or_else(|| from_file.filter(|s| !s.is_empty()))
}

fn parse_encryption(
    raw: Option<JsonEncryptionConfig>,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<EncryptionConfig> {
    let (passphrase, openssl_path) = match raw {
        Some(e) => (e.passphrase, e.openssl_path),
        None => (None, None),
    };
    let passphrase = secret(env, ENCRYPTION_KEY_ENV, passphrase)?;
    Some(EncryptionConfig { passphrase, openssl_path })
}

fn parse_dropbox(
    raw: Option<&JsonDropboxConfig>,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<DropboxConfig> {
    let access_token = secret(env, DROPBOX_TOKEN_ENV, raw.and_then(|d| d.access_token.clone()))?;
    Some(DropboxConfig {
        access_token,
        prefix: raw.and_then(|d| d.prefix.clone()).unwrap_or_default(),
        content_url: raw
            .and_then(|d| d.content_url.clone())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_DROPBOX_CONTENT_URL.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawJsonConfig {
        serde_json::from_value(value).expect("valid raw config")
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_minimal_config_uses_defaults() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(
            raw(json!({
                "connections": { "main": { "driver": "pgsql", "url": "postgres://u:p@db/app" } }
            })),
            no_env,
        )?;

        assert_eq!(config.default_connection, "main");
        assert_eq!(config.dumps_dir, PathBuf::from(DEFAULT_DUMPS_DIR));
        assert!(config.compress);
        assert!(config.append_extension);
        assert_eq!(config.s3.folder_prefix, "dumps");
        assert!(config.dropbox.is_none());
        assert!(config.encryption.is_none());
        assert_eq!(config.metadata.table, "dumps");
        assert_eq!(config.metadata.file, PathBuf::from("storage/dumps/dumps.jsonl"));
        Ok(())
    }

    #[test]
    fn test_parse_connections_drivers() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(
            raw(json!({
                "default_connection": "pg",
                "connections": {
                    "pg": { "driver": "postgres", "url": "postgres://db/app" },
                    "my": { "driver": "mysql", "url": "mysql://root@db/shop" },
                    "lite": { "driver": "sqlite", "path": "/var/app.db" }
                }
            })),
            no_env,
        )?;

        assert_eq!(
            config.connections.get("lite"),
            Some(&ConnectionConfig::Sqlite { path: PathBuf::from("/var/app.db") })
        );
        assert_eq!(config.connections["my"].default_extension(), "sql");
        assert_eq!(config.connections["lite"].default_extension(), "sqlite");
        Ok(())
    }

    #[test]
    fn test_ambiguous_default_connection_is_rejected() {
        let result = AppConfig::from_raw(
            raw(json!({
                "connections": {
                    "a": { "driver": "pgsql", "url": "postgres://db/a" },
                    "b": { "driver": "pgsql", "url": "postgres://db/b" }
                }
            })),
            no_env,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_driver_and_missing_url_are_rejected() {
        let unknown = AppConfig::from_raw(
            raw(json!({ "connections": { "a": { "driver": "oracle", "url": "x" } } })),
            no_env,
        );
        assert!(unknown.is_err());

        let missing_url = AppConfig::from_raw(
            raw(json!({ "connections": { "a": { "driver": "pgsql" } } })),
            no_env,
        );
        assert!(missing_url.is_err());
    }

    #[test]
    fn test_invalid_connection_name_is_rejected() {
        let result = AppConfig::from_raw(
            raw(json!({ "connections": { "bad/name": { "driver": "pgsql", "url": "postgres://db/a" } } })),
            no_env,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_env_supplies_secrets() -> anyhow::Result<()> {
        let env = |key: &str| match key {
            DROPBOX_TOKEN_ENV => Some("token-from-env".to_string()),
            ENCRYPTION_KEY_ENV => Some("s3cret".to_string()),
            _ => None,
        };
        let config = AppConfig::from_raw(
            raw(json!({
                "connections": { "main": { "driver": "pgsql", "url": "postgres://db/app" } },
                "dropbox": { "access_token": "from-file", "prefix": "backups" }
            })),
            env,
        )?;

        let dropbox = config.dropbox.expect("dropbox configured");
        assert_eq!(dropbox.access_token, "token-from-env");
        assert_eq!(dropbox.prefix, "backups");
        assert_eq!(config.encryption.map(|e| e.passphrase), Some("s3cret".to_string()));
        Ok(())
    }

    #[test]
    fn test_env_overrides_file_secrets_alike() -> anyhow::Result<()> {
        let file = json!({
            "connections": { "main": { "driver": "pgsql", "url": "postgres://db/app" } },
            "dropbox": { "access_token": "token-from-file" },
            "encryption": { "passphrase": "key-from-file" }
        });

        let env = |key: &str| match key {
            DROPBOX_TOKEN_ENV => Some("token-from-env".to_string()),
            ENCRYPTION_KEY_ENV => Some("key-from-env".to_string()),
            _ => None,
        };
        let config = AppConfig::from_raw(raw(file.clone()), env)?;
        assert_eq!(config.dropbox.map(|d| d.access_token).as_deref(), Some("token-from-env"));
        assert_eq!(config.encryption.map(|e| e.passphrase).as_deref(), Some("key-from-env"));

        let empty_env = |_: &str| Some(String::new());
        let config = AppConfig::from_raw(raw(file), empty_env)?;
        let dropbox = config.dropbox.expect("dropbox configured");
        assert_eq!(dropbox.access_token, "token-from-file");
        assert_eq!(dropbox.content_url, DEFAULT_DROPBOX_CONTENT_URL);
        assert_eq!(config.encryption.map(|e| e.passphrase).as_deref(), Some("key-from-file"));
        Ok(())
    }

    #[test]
    fn test_partial_s3_credentials_fall_back_to_default_chain() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(
            raw(json!({
                "connections": { "main": { "driver": "pgsql", "url": "postgres://db/app" } },
                "s3_storage": { "region": "eu-west-1", "access_key_id": "AKIA", "folder_prefix": "db" }
            })),
            no_env,
        )?;

        assert!(config.s3.static_credentials.is_none());
        assert_eq!(config.s3.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.s3.folder_prefix, "db");
        Ok(())
    }

    #[test]
    fn test_connection_id_lookup() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(
            raw(json!({ "connections": { "main": { "driver": "pgsql", "url": "postgres://db/app" } } })),
            no_env,
        )?;

        assert_eq!(config.connection_id(None)?, "main");
        assert_eq!(config.connection_id(Some("main"))?, "main");
        assert!(config.connection_id(Some("missing")).is_err());
        Ok(())
    }
}
