// complete-restore/src/restore/permissions.rs
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{PermissionModes, RestoreConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionReport {
    pub directories: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Applies the configured modes below every web and storage directory.
pub fn fix_permissions(config: &RestoreConfig) -> PermissionReport {
    info!("🔐 Fixing permissions...");
    let mut report = PermissionReport::default();

    for dir in config
        .web_directories
        .iter()
        .chain(config.storage_directories.iter())
    {
        if !dir.is_dir() {
            debug!("Skipping missing directory {}", dir.display());
            continue;
        }
        report.directories += 1;
        apply_recursive(dir, config.permissions, &mut report);
    }

    if report.failed > 0 {
        warn!(
            "⚠️  Permissions updated on {} entries, {} failed",
            report.updated, report.failed
        );
    } else {
        info!(
            "✅ Permissions updated on {} entries in {} directories",
            report.updated, report.directories
        );
    }
    report
}

fn apply_recursive(root: &Path, modes: PermissionModes, report: &mut PermissionReport) {
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️  Could not walk {}: {}", root.display(), e);
                report.failed += 1;
                continue;
            }
        };

        let file_type = entry.file_type();
        let mode = if file_type.is_dir() {
            modes.directories
        } else if file_type.is_file() {
            modes.files
        } else {
            continue;
        };

        match set_mode(entry.path(), mode) {
            Ok(()) => report.updated += 1,
            Err(e) => {
                warn!(
                    "⚠️  Could not set mode {:o} on {}: {}",
                    mode,
                    entry.path().display(),
                    e
                );
                report.failed += 1;
            }
        }
    }
}

fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_mode(mode);
        fs::set_permissions(path, permissions)?;
    }

    #[cfg(not(unix))]
    {
        debug!("Skipping mode {:o} on {} (not supported)", mode, path.display());
    }

    Ok(())
}
