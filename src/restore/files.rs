// complete-restore/src/restore/files.rs
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{FileMapping, RestoreConfig};
use crate::errors::Result;
use crate::utils::unix_timestamp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileRestoreReport {
    pub restored: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Restores every configured mapping from the extracted archive.
pub fn restore_files(extracted_root: &Path, config: &RestoreConfig) -> FileRestoreReport {
    info!("📁 Restoring files...");
    let source_root = extracted_root.join(&config.container_base_path);
    let timestamp = unix_timestamp();
    let mut report = FileRestoreReport::default();

    if config.file_mappings.is_empty() {
        info!("   No file mappings configured");
        return report;
    }

    for mapping in &config.file_mappings {
        let source = source_root.join(&mapping.source);
        if !source.exists() {
            warn!("⚠️  Source not found in backup: {}", mapping.source);
            report.skipped += 1;
            continue;
        }

        match restore_mapping(&source, mapping, config.backup_existing_files, timestamp) {
            Ok(copied) => {
                info!(
                    "   ✅ {} → {} ({} files)",
                    mapping.source,
                    mapping.destination.display(),
                    copied
                );
                report.restored += 1;
            }
            Err(e) => {
                error!(
                    "   ❌ Failed to restore {} → {}: {}",
                    mapping.source,
                    mapping.destination.display(),
                    e
                );
                report.failed += 1;
            }
        }
    }

    info!(
        "📁 Files restored: {}, failed: {}, skipped: {}",
        report.restored, report.failed, report.skipped
    );
    report
}

fn restore_mapping(
    source: &Path,
    mapping: &FileMapping,
    backup_existing: bool,
    timestamp: i64,
) -> Result<usize> {
    let destination = &mapping.destination;
    if backup_existing && destination.exists() {
        let snapshot = snapshot_path(destination, timestamp);
        copy_tree(destination, &snapshot)?;
        info!("   💾 Existing files saved to {}", snapshot.display());
    }
    copy_tree(source, destination)
}

/// `<destination>_backup_<timestamp>`, next to the destination.
pub fn snapshot_path(destination: &Path, timestamp: i64) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(format!("_backup_{}", timestamp));
    PathBuf::from(name)
}

/// Copies `source` (a file or a directory tree) onto `destination`.
///
/// Existing files are overwritten; files only present at the destination are
/// left alone. Returns the number of files copied.
pub fn copy_tree(source: &Path, destination: &Path) -> Result<usize> {
    if source.is_file() {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, destination)?;
        return Ok(1);
    }

    fs::create_dir_all(destination)?;
    let mut copied = 0;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source).map_err(|e| {
            std::io::Error::other(format!(
                "{} is outside {}: {}",
                entry.path().display(),
                source.display(),
                e
            ))
        })?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        } else {
            debug!("Skipping special file {}", entry.path().display());
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawJsonConfig;
    use serde_json::json;
    use tempfile::tempdir;

    fn config_for(app: &Path, mappings: serde_json::Value, backup_existing: bool) -> RestoreConfig {
        let raw: RawJsonConfig = serde_json::from_value(json!({
            "base_path": app,
            "disks": { "local": { "root": "backups" } },
            "file_mappings": mappings,
            "backup_existing_files": backup_existing
        }))
        .unwrap();
        RestoreConfig::from_raw(raw, app).unwrap()
    }

    #[test]
    fn test_merge_overwrites_and_keeps_extra_files() -> anyhow::Result<()> {
        let extracted = tempdir()?;
        let app = tempdir()?;
        let uploads = extracted.path().join("var/www/html/public/uploads");
        fs::create_dir_all(uploads.join("2024"))?;
        fs::write(uploads.join("2024/photo.jpg"), "new")?;
        fs::write(uploads.join("logo.png"), "logo")?;

        let destination = app.path().join("public/uploads");
        fs::create_dir_all(destination.join("2024"))?;
        fs::write(destination.join("2024/photo.jpg"), "old")?;
        fs::write(destination.join("local-only.txt"), "keep me")?;

        let config = config_for(
            app.path(),
            json!([{ "source": "public/uploads", "destination": "public/uploads" }]),
            false,
        );
        let report = restore_files(extracted.path(), &config);

        assert_eq!(report, FileRestoreReport { restored: 1, failed: 0, skipped: 0 });
        assert_eq!(fs::read_to_string(destination.join("2024/photo.jpg"))?, "new");
        assert_eq!(fs::read_to_string(destination.join("logo.png"))?, "logo");
        assert_eq!(fs::read_to_string(destination.join("local-only.txt"))?, "keep me");
        Ok(())
    }

    #[test]
    fn test_missing_source_is_skipped() -> anyhow::Result<()> {
        let extracted = tempdir()?;
        let app = tempdir()?;
        fs::create_dir_all(extracted.path().join("var/www/html/storage/app"))?;
        fs::write(extracted.path().join("var/www/html/storage/app/a.txt"), "a")?;

        let config = config_for(
            app.path(),
            json!([
                { "source": "public/missing", "destination": "public/missing" },
                { "source": "storage/app", "destination": "storage/app" }
            ]),
            false,
        );
        let report = restore_files(extracted.path(), &config);

        assert_eq!(report, FileRestoreReport { restored: 1, failed: 0, skipped: 1 });
        assert!(!app.path().join("public/missing").exists());
        assert!(app.path().join("storage/app/a.txt").is_file());
        Ok(())
    }

    #[test]
    fn test_existing_destination_is_snapshotted() -> anyhow::Result<()> {
        let extracted = tempdir()?;
        let app = tempdir()?;
        fs::create_dir_all(extracted.path().join("var/www/html/config"))?;
        fs::write(extracted.path().join("var/www/html/config/app.php"), "restored")?;

        let destination = app.path().join("config");
        fs::create_dir_all(&destination)?;
        fs::write(destination.join("app.php"), "original")?;

        let config = config_for(
            app.path(),
            json!([{ "source": "config", "destination": "config" }]),
            true,
        );
        let report = restore_files(extracted.path(), &config);
        assert_eq!(report.restored, 1);
        assert_eq!(fs::read_to_string(destination.join("app.php"))?, "restored");

        let snapshots: Vec<PathBuf> = fs::read_dir(app.path())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with("config_backup_"))
            })
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(fs::read_to_string(snapshots[0].join("app.php"))?, "original");
        Ok(())
    }

    #[test]
    fn test_single_file_mapping() -> anyhow::Result<()> {
        let extracted = tempdir()?;
        let app = tempdir()?;
        fs::create_dir_all(extracted.path().join("var/www/html"))?;
        fs::write(extracted.path().join("var/www/html/.env"), "APP_KEY=x")?;

        let config = config_for(
            app.path(),
            json!([{ "source": ".env", "destination": ".env" }]),
            false,
        );
        let report = restore_files(extracted.path(), &config);
        assert_eq!(report.restored, 1);
        assert_eq!(fs::read_to_string(app.path().join(".env"))?, "APP_KEY=x");
        Ok(())
    }

    #[test]
    fn test_snapshot_path() {
        assert_eq!(
            snapshot_path(Path::new("/srv/app/public"), 1700000000),
            PathBuf::from("/srv/app/public_backup_1700000000")
        );
    }
}
