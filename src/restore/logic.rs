// complete-restore/src/restore/logic.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::archive::{
    ArchiveFormat, archive_contains_database, create_scratch_dir, download_archive,
    extract_downloaded_archive, resolve_archive_password,
};
use super::db_restore;
use super::files::restore_files;
use super::locator::find_backup_file;
use super::permissions::fix_permissions;
use super::{RestoreOptions, RestoreResult, RestoreStage};
use crate::config::RestoreConfig;
use crate::database::{Database, connect, resolve_connection};
use crate::errors::{RestoreError, Result};
use crate::health::{CheckContext, HealthCheckRegistry, HealthReport, run_health_checks};
use crate::storage::open_disk;
use crate::utils::{format_bytes, log_directory_tree};

const EXTRACTED_TREE_DEPTH: usize = 3;

struct RestoreRun<'a> {
    config: &'a RestoreConfig,
    options: &'a RestoreOptions,
    stage: RestoreStage,
    scratch_dir: Option<PathBuf>,
    database: Option<Box<dyn Database>>,
    result: RestoreResult,
}

impl<'a> RestoreRun<'a> {
    fn new(config: &'a RestoreConfig, options: &'a RestoreOptions) -> Self {
        Self {
            config,
            options,
            stage: RestoreStage::Idle,
            scratch_dir: None,
            database: None,
            result: RestoreResult {
                fail_on_health_check_failure: config.restoration.fail_on_health_check_failure,
                ..RestoreResult::default()
            },
        }
    }

    fn enter(&mut self, next: RestoreStage) {
        debug!("Restore stage: {} -> {}", self.stage, next);
        self.stage = next;
    }

    async fn execute(&mut self) -> Result<()> {
        let config = self.config;
        let options = self.options;

        self.enter(RestoreStage::LocatingArchive);
        let disk_name = options.disk.as_deref().unwrap_or(&config.default_disk);
        let disk = open_disk(config, disk_name).await?;
        let archive = find_backup_file(
            disk.as_ref(),
            &config.backup_name,
            &config.file_extension,
            options.backup.as_deref(),
        )
        .await?
        .with_password(resolve_archive_password(options.password.as_deref(), config));
        info!(
            "📁 Using backup: {} ({}, {})",
            archive.file_name(),
            format_bytes(archive.size),
            archive.last_modified.format("%Y-%m-%d %H:%M:%S UTC")
        );
        self.result.archive = Some(archive.path.clone());

        let format = ArchiveFormat::from_path(&archive.path).ok_or_else(|| {
            RestoreError::Extraction(format!("unsupported archive type: {}", archive.file_name()))
        })?;
        if format == ArchiveFormat::Zip && archive.password.is_none() {
            warn!("⚠️  No archive password found, extracting without one");
        }
        let scratch = create_scratch_dir(&config.temp_directory)?;
        self.scratch_dir = Some(scratch.clone());
        let local_archive = download_archive(disk.as_ref(), &archive, format, &scratch).await?;

        self.enter(RestoreStage::CheckingForDatabase);
        let detected =
            archive_contains_database(&local_archive, format, &config.container_base_path);
        let contains_database = match detected {
            Ok(contains_database) => contains_database,
            Err(e) => {
                self.discard_scratch();
                return Err(e);
            }
        };
        self.result.contains_database = contains_database;

        self.enter(RestoreStage::ExtractingArchive);
        if let Err(e) = extract_downloaded_archive(
            &local_archive,
            format,
            archive.password.as_deref(),
            &scratch,
        ) {
            // The extractor already removed the scratch directory.
            self.scratch_dir = None;
            return Err(e);
        }
        log_directory_tree(&scratch, EXTRACTED_TREE_DEPTH);

        let mut database_ok = true;
        if options.files_only {
            info!("⏭️  Skipping database restore (--files-only)");
        } else if !contains_database {
            info!("ℹ️  No database found in backup, skipping database restore");
        } else {
            self.enter(RestoreStage::RestoringDatabase);
            database_ok = self.restore_database(&scratch).await?;
        }

        if options.database_only {
            info!("⏭️  Skipping file restore (--database-only)");
        } else if !database_ok {
            warn!("⚠️  Skipping file restore because the database restore failed");
        } else {
            self.enter(RestoreStage::RestoringFiles);
            let files = restore_files(&scratch, config);
            self.result.files = Some(files);
            if files.restored > 0 {
                self.enter(RestoreStage::FixingPermissions);
                self.result.permissions = Some(fix_permissions(config));
            }
        }

        if config.restoration.run_health_checks && !config.health_checks.is_empty() {
            self.enter(RestoreStage::RunningHealthChecks);
            if self.database.is_none() {
                self.database = try_connect(config, options).await;
            }
            let ctx = CheckContext {
                config,
                database: self.database.as_deref(),
            };
            let report = run_health_checks(
                &HealthCheckRegistry::with_builtin_checks(),
                &config.health_checks,
                &ctx,
            )
            .await;
            self.result.health = Some(report);
        }

        Ok(())
    }

    /// Returns whether the database restore succeeded. Only an unreachable or
    /// unconfigured connection is a hard error.
    async fn restore_database(&mut self, extracted_root: &Path) -> Result<bool> {
        let (name, connection) =
            resolve_connection(self.config, self.options.connection.as_deref())?;
        let database = connect(name, connection).await?;
        let reset = self.options.reset || self.config.database.drop_tables_before_restore;

        let outcome = db_restore::restore_database(
            database.as_ref(),
            extracted_root,
            &self.config.database,
            &self.config.container_base_path,
            reset,
        )
        .await;
        self.database = Some(database);

        match outcome {
            Ok(report) => {
                let success = report.success;
                self.result.database = Some(report);
                Ok(success)
            }
            Err(e) => {
                error!("❌ Database restore failed: {}", e);
                self.result.database_error = Some(e.to_string());
                Ok(false)
            }
        }
    }

    fn discard_scratch(&mut self) {
        if let Some(scratch) = self.scratch_dir.take() {
            if let Err(e) = fs::remove_dir_all(&scratch) {
                warn!("⚠️  Could not remove {}: {}", scratch.display(), e);
            }
        }
    }

    fn cleanup(&mut self) {
        self.enter(RestoreStage::Cleanup);
        if self.config.cleanup_temp_files {
            if self.scratch_dir.is_some() {
                self.discard_scratch();
                info!("🧹 Cleaned up temporary files");
            }
        } else if let Some(scratch) = &self.scratch_dir {
            info!("🗂️  Temporary files kept at {}", scratch.display());
        }
    }
}

async fn try_connect(config: &RestoreConfig, options: &RestoreOptions) -> Option<Box<dyn Database>> {
    let (name, connection) = match resolve_connection(config, options.connection.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => {
            debug!("No database available for health checks: {}", e);
            return None;
        }
    };
    match connect(name, connection).await {
        Ok(database) => Some(database),
        Err(e) => {
            warn!("⚠️  Could not connect to the database for health checks: {}", e);
            None
        }
    }
}

pub async fn perform_restore_orchestration(
    config: &RestoreConfig,
    options: &RestoreOptions,
    confirm: impl FnOnce() -> bool,
) -> Result<RestoreResult> {
    if options.database_only && options.files_only {
        return Err(RestoreError::Config(
            "--database-only and --files-only cannot be combined".to_string(),
        ));
    }

    let mut run = RestoreRun::new(config, options);
    if !options.force {
        run.enter(RestoreStage::Confirming);
        if !confirm() {
            return Err(RestoreError::Cancelled);
        }
    }

    info!("🔄 Starting complete restore...");
    if let Some(memory_limit) = &config.restoration.memory_limit {
        debug!("Configured memory limit: {}", memory_limit);
    }

    let limit = config.restoration.max_execution_time;
    let outcome = match timeout(Duration::from_secs(limit), run.execute()).await {
        Ok(outcome) => outcome,
        Err(_) => Err(RestoreError::Timeout(limit)),
    };
    run.cleanup();

    match outcome {
        Ok(()) => {
            run.enter(RestoreStage::Done);
            Ok(run.result)
        }
        Err(e) => {
            run.enter(RestoreStage::Failed);
            Err(e)
        }
    }
}

pub async fn perform_standalone_health_checks(
    config: &RestoreConfig,
    options: &RestoreOptions,
) -> HealthReport {
    let database = try_connect(config, options).await;
    let ctx = CheckContext {
        config,
        database: database.as_deref(),
    };
    run_health_checks(
        &HealthCheckRegistry::with_builtin_checks(),
        &config.health_checks,
        &ctx,
    )
    .await
}
