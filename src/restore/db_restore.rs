// complete-restore/src/restore/db_restore.rs
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::archive::is_application_entry;
use super::sql_split::split_statements;
use crate::config::DatabaseOptions;
use crate::database::Database;
use crate::errors::{RestoreError, Result};
use crate::utils::preview;

const PROGRESS_INTERVAL: usize = 50;
const PREVIEW_CHARS: usize = 100;
const DUMP_DIRECTORY: &str = "db-dumps";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropReport {
    pub dropped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Set when a single-transaction replay was rolled back.
    pub rolled_back: bool,
    /// Set when the rollback could not undo schema statements that the target
    /// had already committed on its own.
    pub rollback_incomplete: bool,
}

impl ReplayReport {
    /// Best-effort replays succeed once any statement went through; atomic
    /// replays only when every statement did.
    pub fn is_success(&self, atomic: bool) -> bool {
        if atomic {
            !self.rolled_back && self.total > 0 && self.failed == 0
        } else {
            self.succeeded > 0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRestoreReport {
    pub dump_file: PathBuf,
    pub dropped: Option<DropReport>,
    pub replay: ReplayReport,
    pub success: bool,
}

/// Finds the SQL dump (`.sql` or `.sql.gz`) below `root`. Dumps in
/// `db-dumps/` come first, then the rest sorted by path. The application tree
/// under `container_base_path` is never searched.
pub fn find_dump_file(root: &Path, container_base_path: &str) -> Result<PathBuf> {
    let dumps_dir = root.join(DUMP_DIRECTORY);
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.path().strip_prefix(root).ok().is_none_or(|relative| {
            !is_application_entry(&relative.to_string_lossy(), container_base_path)
        })
    });

    let mut dumps = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".sql") || name.ends_with(".sql.gz") {
            dumps.push(entry.into_path());
        }
    }
    dumps.sort_by_key(|path| (!path.starts_with(&dumps_dir), path.clone()));
    dumps
        .into_iter()
        .next()
        .ok_or_else(|| RestoreError::MissingDump(root.to_path_buf()))
}

/// Reads a dump as text, decompressing `.gz` files.
pub fn read_dump(path: &Path) -> Result<String> {
    let is_gzip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    let bytes = if is_gzip {
        let mut decoded = Vec::new();
        GzDecoder::new(File::open(path)?).read_to_end(&mut decoded)?;
        decoded
    } else {
        fs::read(path)?
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Drops every table of the target. Foreign-key checks are switched off for the
/// drops and switched back on afterwards even when drops fail.
pub async fn drop_all_tables(db: &dyn Database) -> Result<DropReport> {
    info!("🗑️  Dropping existing tables...");
    let tables = db.list_tables().await?;
    let mut report = DropReport::default();
    if tables.is_empty() {
        info!("   No tables to drop");
        return Ok(report);
    }

    if let Err(e) = db.set_foreign_key_checks(false).await {
        warn!("⚠️  Could not disable foreign key checks: {}", e);
    }
    for table in tables {
        match db.drop_table(&table).await {
            Ok(()) => {
                debug!("Dropped table {}", table);
                report.dropped.push(table);
            }
            Err(e) => {
                warn!("⚠️  Could not drop table {}: {}", table, e);
                report.failed.push(table);
            }
        }
    }
    if let Err(e) = db.set_foreign_key_checks(true).await {
        warn!("⚠️  Could not re-enable foreign key checks: {}", e);
    }

    info!(
        "✅ Dropped {} tables ({} failed)",
        report.dropped.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Replays `sql` statement by statement.
pub async fn replay_dump(db: &dyn Database, sql: &str, options: &DatabaseOptions) -> ReplayReport {
    let statements = split_statements(sql);
    let mut report = ReplayReport {
        total: statements.len(),
        ..ReplayReport::default()
    };
    info!("📊 Processing {} SQL statements...", report.total);

    if options.skip_foreign_key_checks {
        if let Err(e) = db.set_foreign_key_checks(false).await {
            warn!("⚠️  Could not disable foreign key checks: {}", e);
        }
    }

    if options.use_single_transaction {
        replay_atomically(db, &statements, options, &mut report).await;
    } else {
        replay_best_effort(db, &statements, options, &mut report).await;
    }

    if options.skip_foreign_key_checks {
        if let Err(e) = db.set_foreign_key_checks(true).await {
            warn!("⚠️  Could not re-enable foreign key checks: {}", e);
        }
    }
    report
}

async fn replay_best_effort(
    db: &dyn Database,
    statements: &[String],
    options: &DatabaseOptions,
    report: &mut ReplayReport,
) {
    for (index, statement) in statements.iter().enumerate() {
        let number = index + 1;
        match db.execute_unprepared(statement).await {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                report.failed += 1;
                if report.failed <= options.max_reported_errors {
                    log_statement_failure(number, statement, &e);
                }
            }
        }
        if number % PROGRESS_INTERVAL == 0 {
            info!(
                "⏳ Processing statement {}/{}... (errors: {})",
                number, report.total, report.failed
            );
        }
    }

    if report.failed > options.max_reported_errors {
        warn!(
            "⚠️  ... and {} more errors",
            report.failed - options.max_reported_errors
        );
    }
}

async fn replay_atomically(
    db: &dyn Database,
    statements: &[String],
    options: &DatabaseOptions,
    report: &mut ReplayReport,
) {
    if !db.transactional_ddl() {
        warn!(
            "⚠️  This database commits schema statements implicitly; \
             a rollback only undoes data changes"
        );
    }
    if let Err(e) = db.begin().await {
        error!("❌ Could not start transaction: {}", e);
        report.failed = report.total.max(1);
        report.rolled_back = true;
        return;
    }

    for (index, statement) in statements.iter().enumerate() {
        let number = index + 1;
        if let Err(e) = db.execute_unprepared(statement).await {
            report.failed += 1;
            if options.max_reported_errors > 0 {
                log_statement_failure(number, statement, &e);
            }
            if let Err(rollback_error) = db.rollback().await {
                error!("❌ Rollback failed: {}", rollback_error);
            }
            report.rolled_back = true;
            report.succeeded = 0;
            warn!("↩️  Rolled back after statement {}/{}", number, report.total);
            let schema_changed = statements[..index].iter().any(|s| is_schema_statement(s));
            if schema_changed && !db.transactional_ddl() {
                report.rollback_incomplete = true;
                warn!("⚠️  Schema changes made before statement {} remain in place", number);
            }
            return;
        }
        report.succeeded += 1;
        if number % PROGRESS_INTERVAL == 0 {
            info!("⏳ Processing statement {}/{}...", number, report.total);
        }
    }

    if let Err(e) = db.commit().await {
        error!("❌ Commit failed: {}", e);
        report.failed += 1;
        report.succeeded = 0;
        report.rolled_back = true;
    }
}

fn is_schema_statement(statement: &str) -> bool {
    let keyword = statement
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(keyword.as_str(), "CREATE" | "DROP" | "ALTER" | "TRUNCATE" | "RENAME")
}

fn log_statement_failure(number: usize, statement: &str, e: &sqlx::Error) {
    warn!(
        "⚠️  Statement {} failed: {}...",
        number,
        preview(statement, PREVIEW_CHARS)
    );
    warn!("   Error: {}", e);
}

/// Restores the dump found below `extracted_root` into `db`, optionally
/// dropping every existing table first.
pub async fn restore_database(
    db: &dyn Database,
    extracted_root: &Path,
    options: &DatabaseOptions,
    container_base_path: &str,
    reset: bool,
) -> Result<DatabaseRestoreReport> {
    let dump_file = find_dump_file(extracted_root, container_base_path)?;
    info!(
        "📄 Found database dump: {}",
        dump_file
            .strip_prefix(extracted_root)
            .unwrap_or(&dump_file)
            .display()
    );

    let dropped = if reset {
        Some(drop_all_tables(db).await?)
    } else {
        None
    };

    let sql = read_dump(&dump_file)?;
    let replay = replay_dump(db, &sql, options).await;
    let success = replay.is_success(options.use_single_transaction);

    if success {
        info!(
            "✅ Database restore completed ({} statements, {} errors)",
            replay.total, replay.failed
        );
    } else {
        error!(
            "❌ Database restore failed ({} of {} statements succeeded)",
            replay.succeeded, replay.total
        );
    }

    Ok(DatabaseRestoreReport {
        dump_file,
        dropped,
        replay,
        success,
    })
}
