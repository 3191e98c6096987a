//! Database Backup Tool
//!
//! Dumps a configured database, optionally compresses and encrypts it, and
//! ships it to S3-compatible storage and/or Dropbox.

// dbbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod utils;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use backup::{BackupOptions, BackupRequest};
use config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "dbbackup", version, about = "Backup a database to the dumps folder and beyond")]
struct Cli {
    /// Path to config.json
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Backup the default database to the dumps folder
    Backup(BackupArgs),
}

#[derive(Args, Debug)]
struct BackupArgs {
    /// Filename or path for the dump
    filename: Option<String>,

    /// The database connection to backup
    #[arg(long)]
    database: Option<String>,

    /// Upload the dump to this S3 bucket
    #[arg(short = 'u', long = "upload-s3", value_name = "BUCKET")]
    upload_s3: Option<String>,

    /// Delete the local dump after a successful S3 upload
    #[arg(long = "keep-only-s3", requires = "upload_s3")]
    keep_only_s3: bool,

    /// Save the dump to Dropbox
    #[arg(long)]
    dropbox: bool,

    /// Encrypt the dump
    #[arg(long)]
    encrypt: bool,

    /// Save the dump name to the metadata store
    #[arg(long)]
    save_dump_name: bool,

    /// Report the local dump as a kept destination
    #[arg(long, conflicts_with = "keep_only_s3")]
    local: bool,
}

impl BackupArgs {
    fn into_request(self, connection_id: String) -> BackupRequest {
        let options = BackupOptions {
            encrypt: self.encrypt,
            file_sync: self.dropbox,
            save_dump_name: self.save_dump_name,
            object_store_bucket: self.upload_s3,
            keep_only_remote: self.keep_only_s3,
            retain_local: self.local,
        };
        let request = BackupRequest::new(connection_id).with_options(options);
        match self.filename {
            Some(filename) => request.with_target(filename),
            None => request,
        }
    }
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    utils::logger::init_cli_logger(cli.verbose);

    match run_app(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<ExitCode> {
    let app_config = AppConfig::load_from_json(&cli.config)
        .context(format!("Failed to load application configuration from {}", cli.config.display()))?;

    match cli.command {
        Command::Backup(args) => {
            let connection_id = app_config.connection_id(args.database.as_deref())?;
            let request = args.into_request(connection_id);
            tracing::debug!(?request, "backup request");

            println!("🚀 Starting Backup Process...");
            match backup::run_backup_flow(&app_config, &request).await {
                Ok(report) => {
                    for line in report.lines() {
                        println!("{}", line);
                    }
                    let failed = report.failed_destinations().count();
                    if report.warnings.is_empty() {
                        println!("✅ Backup completed successfully.");
                    } else {
                        println!(
                            "✅ Backup completed with {} warning(s); {} of {} destination(s) failed.",
                            report.warnings.len(),
                            failed,
                            report.destinations.len()
                        );
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(abort) => {
                    for line in abort.lines() {
                        eprintln!("{}", line);
                    }
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
