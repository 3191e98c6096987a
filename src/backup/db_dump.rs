// dbbackup/src/backup/db_dump.rs
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::path::Path;
use tokio::process::Command;
use url::Url;

use crate::config::ConnectionConfig;
use crate::errors::{BackupError, Result};
use crate::utils::find_executable;

/// Writes a point-in-time dump of one configured connection to a file.
#[async_trait]
pub trait DumpProducer: Send + Sync {
    /// Extension used when the caller does not name the file. Errors for
    /// unknown or malformed connections so they are caught before anything
    /// is written.
    fn default_extension(&self, connection_id: &str) -> Result<String>;

    async fn dump(&self, connection_id: &str, destination: &Path) -> Result<()>;
}

/// Shells out to the engine's own dump tool.
pub struct CommandDumpProducer {
    connections: HashMap<String, ConnectionConfig>,
}

impl CommandDumpProducer {
    pub fn new(connections: HashMap<String, ConnectionConfig>) -> Self {
        Self { connections }
    }

    fn connection(&self, connection_id: &str) -> Result<&ConnectionConfig> {
        self.connections.get(connection_id).ok_or_else(|| {
            BackupError::config(format!("Database connection '{}' is not configured", connection_id))
        })
    }
}

#[async_trait]
impl DumpProducer for CommandDumpProducer {
    fn default_extension(&self, connection_id: &str) -> Result<String> {
        let connection = self.connection(connection_id)?;
        if let ConnectionConfig::MySql { url } = connection {
            MysqlDumpArgs::from_url(url)?;
        }
        Ok(connection.default_extension().to_string())
    }

    async fn dump(&self, connection_id: &str, destination: &Path) -> Result<()> {
        match self.connection(connection_id)? {
            ConnectionConfig::Postgres { url } => {
                let pg_dump = find_executable("pg_dump").map_err(|e| BackupError::Dump(e.to_string()))?;
                tracing::info!(connection = connection_id, path = %destination.display(), "dumping with pg_dump");
                let mut cmd = Command::new(pg_dump);
                cmd.arg("--file").arg(destination).arg(url);
                run_dump_command(cmd, connection_id).await
            }
            ConnectionConfig::MySql { url } => {
                let mysqldump = find_executable("mysqldump").map_err(|e| BackupError::Dump(e.to_string()))?;
                let args = MysqlDumpArgs::from_url(url)?;
                tracing::info!(connection = connection_id, path = %destination.display(), "dumping with mysqldump");
                let mut cmd = Command::new(mysqldump);
                cmd.args(args.to_args(destination));
                if let Some(password) = &args.password {
                    cmd.env("MYSQL_PWD", password);
                }
                run_dump_command(cmd, connection_id).await
            }
            ConnectionConfig::Sqlite { path } => {
                tracing::info!(connection = connection_id, source = %path.display(), "copying sqlite database");
                tokio::fs::copy(path, destination).await.map_err(|e| {
                    BackupError::Dump(format!(
                        "Failed to copy sqlite database {} to {}: {}",
                        path.display(),
                        destination.display(),
                        e
                    ))
                })?;
                Ok(())
            }
        }
    }
}

async fn run_dump_command(mut cmd: Command, connection_id: &str) -> Result<()> {
    let output = cmd.output().await.map_err(|e| {
        BackupError::Dump(format!("Failed to execute dump for connection {}: {}", connection_id, e))
    })?;

    if !output.status.success() {
        return Err(BackupError::Dump(format!(
            "dump for connection {} failed with status: {}\nStdout: {}\nStderr: {}",
            connection_id,
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    tracing::info!(connection = connection_id, "✓ dump finished");
    Ok(())
}

/// URL userinfo and path come back percent-encoded from `Url`.
fn decode_component(raw: &str, what: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| BackupError::config(format!("MySQL URL {} is not valid UTF-8: {}", what, e)))
}

/// mysqldump takes connection details as flags rather than a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MysqlDumpArgs {
    host: String,
    port: u16,
    user: Option<String>,
    password: Option<String>,
    database: String,
}

impl MysqlDumpArgs {
    fn from_url(raw: &str) -> Result<Self> {
        let parsed = Url::parse(raw)
            .map_err(|e| BackupError::config(format!("Invalid MySQL URL format: {}", e)))?;
        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(BackupError::config("MySQL URL must name a database"));
        }
        Ok(Self {
            host: parsed.host_str().unwrap_or("localhost").to_string(),
            port: parsed.port().unwrap_or(3306),
            user: Some(decode_component(parsed.username(), "user")?).filter(|u| !u.is_empty()),
            password: parsed.password().map(|p| decode_component(p, "password")).transpose()?,
            database: decode_component(&database, "database")?,
        })
    }

    // `to_args` never puts the password on the command line.
    fn to_args(&self, destination: &Path) -> Vec<String> {
        let mut args = vec![
            "--single-transaction".to_string(),
            "--result-file".to_string(),
            destination.display().to_string(),
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        if let Some(user) = &self.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        args.push(self.database.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn producer(conn: ConnectionConfig) -> CommandDumpProducer {
        CommandDumpProducer::new(HashMap::from([("main".to_string(), conn)]))
    }

    #[test]
    fn test_mysql_args_from_url() -> anyhow::Result<()> {
        let args = MysqlDumpArgs::from_url("mysql://backup:pw@db.internal:3307/shop")?;
        assert_eq!(args.host, "db.internal");
        assert_eq!(args.port, 3307);
        assert_eq!(args.user.as_deref(), Some("backup"));
        assert_eq!(args.password.as_deref(), Some("pw"));

        let cli = args.to_args(Path::new("/dumps/shop.sql"));
        assert!(!cli.iter().any(|a| a.contains("pw")));
        assert_eq!(cli.last().map(String::as_str), Some("shop"));
        Ok(())
    }

    #[test]
    fn test_mysql_credentials_are_percent_decoded() -> anyhow::Result<()> {
        let args = MysqlDumpArgs::from_url("mysql://back%20up:p%40ss%3Aw0rd@db/shop")?;
        assert_eq!(args.user.as_deref(), Some("back up"));
        assert_eq!(args.password.as_deref(), Some("p@ss:w0rd"));
        assert_eq!(args.host, "db");
        assert_eq!(args.database, "shop");
        Ok(())
    }

    #[test]
    fn test_mysql_url_without_database_is_rejected() {
        assert!(MysqlDumpArgs::from_url("mysql://root@localhost").is_err());
    }

    #[test]
    fn test_bad_mysql_url_fails_extension_lookup() {
        for url in ["mysql://root@localhost", "not a url"] {
            let dumper = producer(ConnectionConfig::MySql { url: url.to_string() });
            assert!(
                matches!(dumper.default_extension("main"), Err(BackupError::Configuration(_))),
                "{}",
                url
            );
        }
        let dumper = producer(ConnectionConfig::MySql { url: "mysql://root@localhost/shop".into() });
        assert_eq!(dumper.default_extension("main").ok().as_deref(), Some("sql"));
    }

    #[test]
    fn test_unknown_connection_is_configuration_error() {
        let dumper = producer(ConnectionConfig::Sqlite { path: PathBuf::from("/nope.db") });
        assert!(matches!(dumper.default_extension("other"), Err(BackupError::Configuration(_))));
        assert_eq!(dumper.default_extension("main").ok().as_deref(), Some("sqlite"));
    }

    #[tokio::test]
    async fn test_sqlite_dump_copies_database_file() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let source = tmp.path().join("app.db");
        std::fs::write(&source, b"SQLite format 3\0")?;
        let dumper = producer(ConnectionConfig::Sqlite { path: source });

        let destination = tmp.path().join("copy.sqlite");
        dumper.dump("main", &destination).await?;
        assert_eq!(std::fs::read(&destination)?, b"SQLite format 3\0");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_sqlite_file_is_dump_error() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let dumper = producer(ConnectionConfig::Sqlite { path: tmp.path().join("missing.db") });

        let result = dumper.dump("main", &tmp.path().join("out.sqlite")).await;
        assert!(matches!(result, Err(BackupError::Dump(_))));
        Ok(())
    }
}
