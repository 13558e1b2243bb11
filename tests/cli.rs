// tests/cli.rs
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn restore_cmd() -> Command {
    let mut cmd = Command::cargo_bin("restore-complete").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("RESTORE_CONFIG")
        .env_remove("RESTORE_LOG_FILE")
        .env_remove("BACKUP_ARCHIVE_PASSWORD");
    cmd
}

/// Writes a config whose local disk lives in `<root>/backups` and whose
/// application lives in `<root>/app`.
fn write_config(root: &Path) -> std::path::PathBuf {
    fs::create_dir_all(root.join("app")).unwrap();
    let config = serde_json::json!({
        "base_path": root.join("app"),
        "disks": { "local": { "driver": "local", "root": root.join("backups") } },
        "file_mappings": [{ "source": "public/uploads", "destination": "public/uploads" }],
        "backup_existing_files": false,
        "temp_directory": root.join("tmp/restore"),
        "web_directories": ["public"]
    });
    let path = root.join("restore.json");
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

fn write_backup(root: &Path, name: &str, entries: &[(&str, &str)]) {
    let dir = root.join("backups/laravel-backup");
    fs::create_dir_all(&dir).unwrap();
    let mut writer = zip::ZipWriter::new(File::create(dir.join(name)).unwrap());
    for (entry, content) in entries {
        writer
            .start_file(*entry, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn test_cli_help() -> Result<(), Box<dyn std::error::Error>> {
    restore_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--files-only"))
        .stdout(predicate::str::contains("--health-check"));
    Ok(())
}

#[test]
fn test_missing_config_fails() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    restore_cmd()
        .arg("--config")
        .arg(root.path().join("nope.json"))
        .arg("--list")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failed to load restore configuration"));
    Ok(())
}

#[test]
fn test_list_without_backups() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let config = write_config(root.path());

    restore_cmd()
        .arg("--config")
        .arg(&config)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("📋 Available Backups"))
        .stdout(predicate::str::contains("Disk: local"))
        .stdout(predicate::str::contains("No backups found"));
    Ok(())
}

#[test]
fn test_list_with_empty_backup_directory() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let config = write_config(root.path());
    fs::create_dir_all(root.path().join("backups/laravel-backup"))?;
    fs::write(root.path().join("backups/laravel-backup/notes.txt"), "not an archive")?;

    restore_cmd()
        .arg("--config")
        .arg(&config)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Disk: local"))
        .stdout(predicate::str::contains("No backup files found"));
    Ok(())
}

#[test]
fn test_list_shows_archives() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let config = write_config(root.path());
    write_backup(root.path(), "2024-02-01-00-00-00.zip", &[("a.txt", "a")]);

    restore_cmd()
        .arg("--config")
        .arg(&config)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-02-01-00-00-00.zip"));
    Ok(())
}

#[test]
fn test_restore_without_force_is_cancelled() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let config = write_config(root.path());
    write_backup(
        root.path(),
        "2024-02-01-00-00-00.zip",
        &[("var/www/html/public/uploads/a.txt", "a")],
    );

    restore_cmd()
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Restore operation cancelled."));
    assert!(!root.path().join("app/public/uploads").exists());
    Ok(())
}

#[test]
fn test_unknown_backup_fails() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let config = write_config(root.path());
    write_backup(root.path(), "2024-02-01-00-00-00.zip", &[("a.txt", "a")]);

    restore_cmd()
        .arg("--config")
        .arg(&config)
        .args(["--backup", "foo.zip", "--force"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Backup file 'foo.zip' not found"));
    Ok(())
}

#[test]
fn test_conflicting_modes_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    restore_cmd()
        .args(["--database-only", "--files-only"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_files_only_restore_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let config = write_config(root.path());
    write_backup(
        root.path(),
        "2024-01-01-00-00-00.zip",
        &[("var/www/html/public/uploads/old.txt", "old")],
    );
    write_backup(
        root.path(),
        "2024-02-01-00-00-00.zip",
        &[
            ("var/www/html/public/uploads/photo.txt", "latest"),
            ("var/www/html/public/uploads/nested/deep.txt", "deep"),
        ],
    );
    let old = File::options()
        .write(true)
        .open(root.path().join("backups/laravel-backup/2024-01-01-00-00-00.zip"))?;
    old.set_modified(std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_704_067_200))?;

    fs::create_dir_all(root.path().join("app/public/uploads"))?;
    fs::write(root.path().join("app/public/uploads/keep.txt"), "local")?;

    restore_cmd()
        .arg("--config")
        .arg(&config)
        .args(["--files-only", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Using backup: 2024-02-01-00-00-00.zip"))
        .stdout(predicate::str::contains("Next steps"));

    let uploads = root.path().join("app/public/uploads");
    assert_eq!(fs::read_to_string(uploads.join("photo.txt"))?, "latest");
    assert_eq!(fs::read_to_string(uploads.join("nested/deep.txt"))?, "deep");
    assert_eq!(fs::read_to_string(uploads.join("keep.txt"))?, "local");
    assert!(!uploads.join("old.txt").exists());
    assert_eq!(fs::read_dir(root.path().join("tmp"))?.count(), 0);
    Ok(())
}

#[test]
fn test_health_check_mode_without_checks() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let config = write_config(root.path());

    restore_cmd()
        .arg("--config")
        .arg(&config)
        .arg("--health-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("No health checks configured"));
    Ok(())
}
