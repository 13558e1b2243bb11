//! Complete restore tool
//!
//! Restores an application's database and files from a backup archive.

// complete-restore/src/main.rs
mod cli;
mod config;
mod database;
mod errors;
mod health;
mod restore;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use std::process::ExitCode;
use tracing::{error, info, warn};

use cli::Cli;
use config::RestoreConfig;
use errors::RestoreError;
use restore::locator::list_backups;
use restore::{RestoreOptions, RestoreResult, run_health_check_only, run_restore_flow};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    utils::setup_logging(cli.verbose);

    match run_app(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<ExitCode> {
    let config = RestoreConfig::load_from_json(&cli.config).with_context(|| {
        format!(
            "Failed to load restore configuration from {}",
            cli.config.display()
        )
    })?;

    if cli.list {
        list_backups(&config).await;
        return Ok(ExitCode::SUCCESS);
    }

    let options = cli.restore_options();

    if cli.health_check {
        if config.health_checks.is_empty() {
            info!("ℹ️  No health checks configured");
            return Ok(ExitCode::SUCCESS);
        }
        let report = run_health_check_only(&config, &options).await;
        return Ok(if report.all_passed() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    print_banner(&config, &options);

    match run_restore_flow(&config, &options, confirm_restore).await {
        Ok(result) => {
            print_summary(&result);
            if result.is_success() {
                info!("✅ Complete restore finished successfully!");
                print_next_steps();
                Ok(ExitCode::SUCCESS)
            } else {
                error!(
                    "❌ Restore finished with {} failure(s)",
                    result.failure_count()
                );
                Ok(ExitCode::FAILURE)
            }
        }
        Err(RestoreError::Cancelled) => {
            info!("❌ Restore operation cancelled.");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!("❌ Restore failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_banner(config: &RestoreConfig, options: &RestoreOptions) {
    let mode = if options.database_only {
        "database only"
    } else if options.files_only {
        "files only"
    } else {
        "database and files"
    };

    info!("🔄 Complete Restore");
    info!("==================");
    info!(
        "Disk:       {}",
        options.disk.as_deref().unwrap_or(&config.default_disk)
    );
    info!(
        "Backup:     {}",
        options.backup.as_deref().unwrap_or("latest")
    );
    if !options.files_only {
        info!(
            "Connection: {}",
            options
                .connection
                .as_deref()
                .or(config.default_connection.as_deref())
                .unwrap_or("(none)")
        );
    }
    info!("Mode:       {}", mode);
    if options.reset {
        info!("Reset:      all existing tables will be dropped first");
    }
}

fn confirm_restore() -> bool {
    warn!("⚠️  This will overwrite the current database and files!");
    // A non-interactive terminal counts as a refusal.
    Confirm::new()
        .with_prompt("Do you want to continue?")
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn print_summary(result: &RestoreResult) {
    info!("");
    info!("📊 Restore Summary");
    info!("==================");
    if let Some(archive) = &result.archive {
        info!("Backup:      {}", archive);
    }

    match (&result.database, &result.database_error) {
        (_, Some(e)) => info!("Database:    ❌ failed ({})", e),
        (Some(report), None) => {
            let status = if report.success { "✅" } else { "❌" };
            info!(
                "Database:    {} {} of {} statements succeeded",
                status, report.replay.succeeded, report.replay.total
            );
            if let Some(dropped) = &report.dropped {
                info!(
                    "             {} tables dropped before import",
                    dropped.dropped.len()
                );
            }
        }
        (None, None) if result.contains_database => info!("Database:    ⏭️  skipped"),
        (None, None) => info!("Database:    not in backup"),
    }

    match &result.files {
        Some(files) => info!(
            "Files:       {} restored, {} failed, {} skipped",
            files.restored, files.failed, files.skipped
        ),
        None => info!("Files:       ⏭️  skipped"),
    }

    if let Some(permissions) = &result.permissions {
        info!(
            "Permissions: {} updated, {} failed",
            permissions.updated, permissions.failed
        );
    }

    if let Some(health) = &result.health {
        info!(
            "Health:      {} passed, {} failed, {} total",
            health.passed(),
            health.failed(),
            health.total()
        );
        if !health.unknown.is_empty() {
            info!("             unknown checks: {}", health.unknown.join(", "));
        }
    }
}

fn print_next_steps() {
    info!("");
    info!("📝 Next steps:");
    info!("   1. Clear application caches");
    info!("   2. Check file permissions and ownership");
    info!("   3. Test application functionality");
}
