// dbbackup/src/backup/logic.rs
use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::backup::archive::Compressor;
use crate::backup::artifact::{Artifact, BackupRequest, Stage};
use crate::backup::db_dump::DumpProducer;
use crate::backup::destination::{fan_out, Destination, UploadTargets};
use crate::backup::dropbox::FileSync;
use crate::backup::encrypt::Encryptor;
use crate::backup::metadata::{BackupRecord, MetadataSink};
use crate::backup::naming::NamingScheme;
use crate::backup::report::{BackupReport, PipelineAbort};
use crate::backup::s3_upload::ObjectStore;
use crate::errors::{BackupError, Result};

/// Runs one backup through the fixed stage order:
/// naming, dump, compress, encrypt, record, upload, clean.
///
/// Optional stages are only entered when both the request asks for them and
/// the matching collaborator was supplied at construction.
pub struct BackupPipeline {
    naming: NamingScheme,
    dumper: Arc<dyn DumpProducer>,
    compressor: Option<Arc<dyn Compressor>>,
    encryptor: Option<Arc<dyn Encryptor>>,
    recorder: Option<Arc<dyn MetadataSink>>,
    targets: UploadTargets,
}

/// Which stages this particular run goes through.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StagePlan {
    extension: String,
    compress: bool,
    encrypt: bool,
    record: bool,
    destinations: Vec<Destination>,
    clean: bool,
}

impl StagePlan {
    fn enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Compressing => self.compress,
            Stage::Encrypting => self.encrypt,
            Stage::Recording => self.record,
            Stage::Uploading => !self.destinations.is_empty(),
            Stage::Cleaning => self.clean,
            Stage::Validating | Stage::Naming | Stage::Dumping | Stage::Done => true,
        }
    }

    /// Next enabled stage after `stage`.
    fn next(&self, stage: Stage) -> Stage {
        let mut candidate = successor(stage);
        while !self.enabled(candidate) {
            candidate = successor(candidate);
        }
        candidate
    }

    /// Prefix written into the metadata record: the first remote location
    /// that will hold the artifact.
    fn record_prefix(&self, targets: &UploadTargets) -> Option<String> {
        self.destinations
            .iter()
            .find_map(|d| match d {
                Destination::FileSync => Some(targets.file_sync_prefix.clone()),
                Destination::ObjectStore { .. } => Some(targets.object_store_prefix.clone()),
                Destination::Local => None,
            })
            .filter(|prefix| !prefix.is_empty())
    }
}

fn successor(stage: Stage) -> Stage {
    match stage {
        Stage::Validating => Stage::Naming,
        Stage::Naming => Stage::Dumping,
        Stage::Dumping => Stage::Compressing,
        Stage::Compressing => Stage::Encrypting,
        Stage::Encrypting => Stage::Recording,
        Stage::Recording => Stage::Uploading,
        Stage::Uploading => Stage::Cleaning,
        Stage::Cleaning | Stage::Done => Stage::Done,
    }
}

impl BackupPipeline {
    pub fn new(naming: NamingScheme, dumper: Arc<dyn DumpProducer>) -> Self {
        Self {
            naming,
            dumper,
            compressor: None,
            encryptor: None,
            recorder: None,
            targets: UploadTargets::default(),
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn MetadataSink>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        self.targets.object_store = Some(store);
        self.targets.object_store_prefix = prefix.into();
        self
    }

    pub fn with_file_sync(mut self, sync: Arc<dyn FileSync>, prefix: impl Into<String>) -> Self {
        self.targets.file_sync = Some(sync);
        self.targets.file_sync_prefix = prefix.into();
        self
    }

    pub async fn run(&self, request: &BackupRequest) -> std::result::Result<BackupReport, PipelineAbort> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("backup", %run_id, connection = %request.connection_id);
        self.execute(run_id, request).instrument(span).await
    }

    /// Checks the request against what this pipeline can do before any file
    /// is touched.
    fn plan(&self, request: &BackupRequest) -> Result<StagePlan> {
        let options = &request.options;
        let extension = self.dumper.default_extension(&request.connection_id)?;

        if let Some(bucket) = &options.object_store_bucket {
            if bucket.trim().is_empty() {
                return Err(BackupError::config("An object storage upload needs a bucket name"));
            }
            if self.targets.object_store.is_none() {
                return Err(BackupError::config("Object storage is not configured"));
            }
        }
        if options.keep_only_remote && options.object_store_bucket.is_none() {
            return Err(BackupError::config(
                "Keeping only the remote copy requires an object storage bucket",
            ));
        }
        if options.keep_only_remote && options.retain_local {
            return Err(BackupError::config(
                "Cannot both retain the local dump and keep only the remote copy",
            ));
        }
        if options.encrypt && self.encryptor.is_none() {
            return Err(BackupError::config(
                "Encryption was requested but no encryption key is configured",
            ));
        }
        if options.file_sync && self.targets.file_sync.is_none() {
            return Err(BackupError::config(
                "Dropbox upload was requested but no access token is configured",
            ));
        }
        if options.save_dump_name && self.recorder.is_none() {
            return Err(BackupError::config(
                "Saving the dump name was requested but no metadata store is configured",
            ));
        }

        let mut destinations = Vec::new();
        if options.file_sync {
            destinations.push(Destination::FileSync);
        }
        if let Some(bucket) = &options.object_store_bucket {
            destinations.push(Destination::ObjectStore { bucket: bucket.trim().to_string() });
        }
        if options.retain_local {
            destinations.push(Destination::Local);
        }

        Ok(StagePlan {
            extension,
            compress: self.compressor.is_some(),
            encrypt: options.encrypt,
            record: options.save_dump_name,
            destinations,
            clean: options.keep_only_remote,
        })
    }

    async fn execute(
        &self,
        run_id: Uuid,
        request: &BackupRequest,
    ) -> std::result::Result<BackupReport, PipelineAbort> {
        let abort = |stage: Stage, error: BackupError, artifact: Option<&Artifact>| {
            tracing::error!(%stage, error = %error, "backup aborted");
            PipelineAbort {
                run_id,
                stage,
                untrusted: artifact.is_some() && request.options.encrypt,
                artifact: artifact.cloned(),
                error,
            }
        };

        let plan = self.plan(request).map_err(|e| abort(Stage::Validating, e, None))?;
        tracing::debug!(?plan, "stage plan");

        let mut artifact = self
            .naming
            .resolve(request, &plan.extension)
            .map_err(|e| abort(Stage::Naming, e, None))?;
        tracing::info!(path = %artifact.path.display(), "dump target resolved");

        let mut report = BackupReport::new(run_id, artifact.clone());
        let mut stage = plan.next(Stage::Naming);

        while stage != Stage::Done {
            tracing::debug!(%stage, "entering stage");
            match stage {
                Stage::Dumping => {
                    self.dumper
                        .dump(&request.connection_id, &artifact.path)
                        .await
                        .map_err(|e| abort(stage, e, Some(&artifact)))?;
                }
                Stage::Compressing => {
                    if let Some(compressor) = &self.compressor {
                        compressor
                            .compress(&mut artifact)
                            .await
                            .map_err(|e| abort(stage, e, Some(&artifact)))?;
                        report.compressed = true;
                    }
                }
                Stage::Encrypting => {
                    let encrypted = match &self.encryptor {
                        Some(encryptor) => encryptor.encrypt(&artifact.path).await,
                        None => false,
                    };
                    if !encrypted {
                        let error = BackupError::Transform {
                            stage,
                            detail: "Encrypt returned false result".to_string(),
                        };
                        return Err(abort(stage, error, Some(&artifact)));
                    }
                    report.encrypted = true;
                }
                Stage::Recording => {
                    if let Some(recorder) = &self.recorder {
                        let record = BackupRecord {
                            file: artifact.path.display().to_string(),
                            file_name: artifact.name.clone(),
                            prefix: plan.record_prefix(&self.targets),
                            encrypted: report.encrypted,
                            created_at: Utc::now().timestamp(),
                        };
                        match recorder.append(&record).await {
                            Ok(()) => report.recorded = true,
                            Err(e) => {
                                tracing::warn!(error = %e, "could not save dump metadata");
                                report.warn(BackupError::Record(format!("{:#}", e)));
                            }
                        }
                    }
                }
                Stage::Uploading => {
                    for (result, error) in fan_out(&plan.destinations, &artifact, &self.targets).await {
                        if let Some(error) = error {
                            tracing::warn!(destination = %result.destination, error = %error, "upload failed");
                            report.warn(error);
                        }
                        report.destinations.push(result);
                    }
                }
                Stage::Cleaning => {
                    let uploaded = report
                        .destinations
                        .iter()
                        .any(|d| d.destination.is_object_store() && d.succeeded());
                    if uploaded {
                        match Destination::Local.remove(&artifact).await {
                            Ok(()) => {
                                tracing::info!(path = %artifact.path.display(), "local dump removed");
                                report.local_removed = true;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "could not remove local dump");
                                report.warn(e);
                            }
                        }
                    } else {
                        tracing::warn!(
                            path = %artifact.path.display(),
                            "keeping local dump because no object storage upload succeeded"
                        );
                    }
                }
                // Validating and Naming run before the loop.
                Stage::Validating | Stage::Naming | Stage::Done => {}
            }
            stage = plan.next(stage);
        }

        report.artifact = artifact;
        tracing::info!(
            warnings = report.warnings.len(),
            destinations = report.destinations.len(),
            "backup finished"
        );
        Ok(report)
    }
}
