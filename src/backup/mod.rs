mod logic;
pub(crate) mod archive;     // gzip stage
pub(crate) mod artifact;    // request, artifact and stage types
pub(crate) mod db_dump;     // external dump tools
pub(crate) mod destination; // upload fan-out
pub(crate) mod dropbox;     // file-sync backend
pub(crate) mod encrypt;     // openssl stage
pub(crate) mod metadata;    // dump records
pub(crate) mod naming;
pub(crate) mod report;
pub(crate) mod s3_upload;   // object-store backend

use std::sync::Arc;

pub use artifact::{BackupOptions, BackupRequest, Stage};
pub use logic::BackupPipeline;
pub use report::{BackupReport, PipelineAbort};

use crate::config::AppConfig;
use archive::GzipCompressor;
use db_dump::CommandDumpProducer;
use dropbox::DropboxClient;
use encrypt::OpensslEncryptor;
use metadata::{JsonLinesMetadataSink, MetadataSink, PostgresMetadataSink};
use naming::NamingScheme;
use s3_upload::S3ObjectStore;

/// Public entry point for the backup process: wires the configured
/// backends into a pipeline and runs `request` through it.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    request: &BackupRequest,
) -> Result<BackupReport, PipelineAbort> {
    let pipeline = build_pipeline(app_config, request).await;
    pipeline.run(request).await
}

/// Only backends the request can use are constructed; a missing one is
/// reported by the pipeline's validation stage.
async fn build_pipeline(app_config: &AppConfig, request: &BackupRequest) -> BackupPipeline {
    let naming = NamingScheme::new(&app_config.dumps_dir, app_config.append_extension);
    let dumper = Arc::new(CommandDumpProducer::new(app_config.connections.clone()));
    let mut pipeline = BackupPipeline::new(naming, dumper);

    if app_config.compress {
        pipeline = pipeline.with_compressor(Arc::new(GzipCompressor::default()));
    }

    if let Some(encryption) = &app_config.encryption {
        let mut encryptor = OpensslEncryptor::new(encryption.passphrase.clone());
        if let Some(program) = &encryption.openssl_path {
            encryptor = encryptor.with_program(program);
        }
        pipeline = pipeline.with_encryptor(Arc::new(encryptor));
    }

    if request.options.save_dump_name {
        let recorder: Arc<dyn MetadataSink> = match &app_config.metadata.database_url {
            Some(url) => Arc::new(PostgresMetadataSink::new(url, &app_config.metadata.table)),
            None => Arc::new(JsonLinesMetadataSink::new(&app_config.metadata.file)),
        };
        pipeline = pipeline.with_recorder(recorder);
    }

    if request.options.object_store_bucket.is_some() {
        let store = S3ObjectStore::connect(&app_config.s3).await;
        pipeline = pipeline.with_object_store(Arc::new(store), &app_config.s3.folder_prefix);
    }

    if let Some(dropbox) = &app_config.dropbox {
        pipeline = pipeline.with_file_sync(Arc::new(DropboxClient::new(dropbox)), &dropbox.prefix);
    }

    pipeline
}
