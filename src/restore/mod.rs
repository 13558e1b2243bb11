pub(crate) mod archive;
pub(crate) mod db_restore;
pub(crate) mod files;
pub(crate) mod locator;
mod logic;
pub(crate) mod permissions;
pub(crate) mod sql_split;

use std::fmt;

use crate::config::RestoreConfig;
use crate::errors::Result;
use crate::health::HealthReport;

use db_restore::DatabaseRestoreReport;
use files::FileRestoreReport;
use permissions::PermissionReport;

/// Per-run choices, usually taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub disk: Option<String>,
    pub backup: Option<String>,
    pub connection: Option<String>,
    pub password: Option<String>,
    pub reset: bool,
    pub database_only: bool,
    pub files_only: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    Idle,
    Confirming,
    LocatingArchive,
    CheckingForDatabase,
    ExtractingArchive,
    RestoringDatabase,
    RestoringFiles,
    FixingPermissions,
    RunningHealthChecks,
    Cleanup,
    Done,
    Failed,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RestoreStage::Idle => "idle",
            RestoreStage::Confirming => "confirming",
            RestoreStage::LocatingArchive => "locating archive",
            RestoreStage::CheckingForDatabase => "checking for database",
            RestoreStage::ExtractingArchive => "extracting archive",
            RestoreStage::RestoringDatabase => "restoring database",
            RestoreStage::RestoringFiles => "restoring files",
            RestoreStage::FixingPermissions => "fixing permissions",
            RestoreStage::RunningHealthChecks => "running health checks",
            RestoreStage::Cleanup => "cleanup",
            RestoreStage::Done => "done",
            RestoreStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Everything a finished run did.
#[derive(Debug, Clone, Default)]
pub struct RestoreResult {
    pub archive: Option<String>,
    pub contains_database: bool,
    pub database: Option<DatabaseRestoreReport>,
    /// Set when the database restore was attempted and could not complete.
    pub database_error: Option<String>,
    pub files: Option<FileRestoreReport>,
    pub permissions: Option<PermissionReport>,
    pub health: Option<HealthReport>,
    pub fail_on_health_check_failure: bool,
}

impl RestoreResult {
    pub fn database_failed(&self) -> bool {
        self.database_error.is_some() || self.database.as_ref().is_some_and(|db| !db.success)
    }

    /// Failed mappings, a failed database restore and, when configured as
    /// fatal, failed health checks.
    pub fn failure_count(&self) -> usize {
        let file_failures = self.files.map_or(0, |files| files.failed);
        let database_failures = usize::from(self.database_failed());
        let health_failures = match &self.health {
            Some(health) if self.fail_on_health_check_failure => health.failed(),
            _ => 0,
        };
        file_failures + database_failures + health_failures
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Runs a complete restore. `confirm` is asked once before anything is
/// touched unless `options.force` is set.
pub async fn run_restore_flow(
    config: &RestoreConfig,
    options: &RestoreOptions,
    confirm: impl FnOnce() -> bool,
) -> Result<RestoreResult> {
    logic::perform_restore_orchestration(config, options, confirm).await
}

/// Runs only the configured health checks against the current system.
pub async fn run_health_check_only(
    config: &RestoreConfig,
    options: &RestoreOptions,
) -> HealthReport {
    logic::perform_standalone_health_checks(config, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckResult, HealthCheckOutcome};

    fn health(passed: bool) -> HealthReport {
        HealthReport {
            results: vec![CheckResult {
                name: "check".to_string(),
                outcome: if passed {
                    HealthCheckOutcome::pass("ok")
                } else {
                    HealthCheckOutcome::fail("bad")
                },
            }],
            unknown: Vec::new(),
        }
    }

    #[test]
    fn test_failure_count() {
        let mut result = RestoreResult {
            files: Some(FileRestoreReport {
                restored: 2,
                failed: 1,
                skipped: 3,
            }),
            health: Some(health(false)),
            ..RestoreResult::default()
        };
        assert_eq!(result.failure_count(), 1);

        result.fail_on_health_check_failure = true;
        assert_eq!(result.failure_count(), 2);

        result.database_error = Some("connection refused".to_string());
        assert_eq!(result.failure_count(), 3);
        assert!(!result.is_success());
    }

    #[test]
    fn test_skipped_mappings_are_not_failures() {
        let result = RestoreResult {
            files: Some(FileRestoreReport {
                restored: 0,
                failed: 0,
                skipped: 2,
            }),
            health: Some(health(true)),
            fail_on_health_check_failure: true,
            ..RestoreResult::default()
        };
        assert!(result.is_success());
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(RestoreStage::CheckingForDatabase.to_string(), "checking for database");
        assert_eq!(RestoreStage::Done.to_string(), "done");
    }
}
