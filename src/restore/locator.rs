// complete-restore/src/restore/locator.rs
use chrono::{DateTime, Local, Utc};
use tracing::{debug, info, warn};

use crate::config::RestoreConfig;
use crate::errors::{RestoreError, Result};
use crate::storage::{Disk, DiskFile, join_disk_path, open_disk};
use crate::utils::format_bytes;

const LISTED_BACKUPS_PER_DISK: usize = 10;

/// The archive chosen for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    /// Disk-relative path, e.g. `laravel-backup/2024-02-01-00-00-00.zip`.
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub password: Option<String>,
}

impl BackupArchive {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }
}

impl From<DiskFile> for BackupArchive {
    fn from(file: DiskFile) -> Self {
        Self {
            path: file.path,
            size: file.size,
            last_modified: file.last_modified,
            password: None,
        }
    }
}

/// Archives in `files` carrying `extension`, newest first. Ties on the
/// modification time fall back to the file name, newest-looking first.
pub fn sorted_archives(files: Vec<DiskFile>, extension: &str) -> Vec<DiskFile> {
    let mut archives: Vec<DiskFile> = files
        .into_iter()
        .filter(|file| file.file_name().ends_with(extension))
        .collect();
    archives.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.file_name().cmp(a.file_name()))
    });
    archives
}

/// Picks the archive to restore from `disk`.
///
/// With `requested`, a name containing `/` is taken as a disk path and a bare
/// name is looked up in `backup_dir`; failing that, an archive in `backup_dir`
/// with the same file name is used. Without it the newest archive wins.
pub async fn find_backup_file(
    disk: &dyn Disk,
    backup_dir: &str,
    extension: &str,
    requested: Option<&str>,
) -> Result<BackupArchive> {
    if let Some(requested) = requested.filter(|name| !name.trim().is_empty()) {
        let candidate = if requested.contains('/') {
            join_disk_path("", requested)
        } else {
            join_disk_path(backup_dir, requested)
        };
        match disk.metadata(&candidate).await {
            Ok(file) => return Ok(BackupArchive::from(file)),
            Err(RestoreError::NotFound(reason)) => debug!("{}", reason),
            Err(e) => return Err(e),
        }

        let basename = requested.rsplit('/').next().unwrap_or(requested);
        if disk.exists(backup_dir).await? {
            if let Some(file) = disk
                .files(backup_dir)
                .await?
                .into_iter()
                .find(|file| file.file_name() == basename)
            {
                return Ok(BackupArchive::from(file));
            }
        }
        return Err(RestoreError::NotFound(format!(
            "Backup file '{}' not found on disk '{}'",
            requested,
            disk.name()
        )));
    }

    if !disk.exists(backup_dir).await? {
        return Err(RestoreError::NotFound(format!(
            "Backup directory '{}' does not exist on disk '{}'",
            backup_dir,
            disk.name()
        )));
    }

    let files = disk.files(backup_dir).await?;
    sorted_archives(files, extension)
        .into_iter()
        .next()
        .map(BackupArchive::from)
        .ok_or_else(|| {
            RestoreError::NotFound(format!(
                "No backup files ({}) found in '{}' on disk '{}'",
                extension,
                backup_dir,
                disk.name()
            ))
        })
}

/// Prints the newest archives of every configured disk.
pub async fn list_backups(config: &RestoreConfig) {
    info!("📋 Available Backups");
    info!("==================");

    for disk_name in config.disks.keys() {
        info!("");
        info!("💾 Disk: {}", disk_name);

        let disk = match open_disk(config, disk_name).await {
            Ok(disk) => disk,
            Err(e) => {
                warn!("   Error accessing disk: {}", e);
                continue;
            }
        };

        if let Err(e) = list_disk_backups(disk.as_ref(), config).await {
            warn!("   Error accessing disk: {}", e);
        }
    }
}

async fn list_disk_backups(disk: &dyn Disk, config: &RestoreConfig) -> Result<()> {
    if !disk.exists(&config.backup_name).await? {
        info!("   No backups found");
        return Ok(());
    }

    let archives = sorted_archives(disk.files(&config.backup_name).await?, &config.file_extension);
    if archives.is_empty() {
        info!("   No backup files found");
        return Ok(());
    }

    for archive in archives.iter().take(LISTED_BACKUPS_PER_DISK) {
        info!(
            "   📁 {} ({}) - {}",
            archive.file_name(),
            format_bytes(archive.size),
            archive
                .last_modified
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
    }
    if archives.len() > LISTED_BACKUPS_PER_DISK {
        info!(
            "   ... and {} more backups",
            archives.len() - LISTED_BACKUPS_PER_DISK
        );
    }
    Ok(())
}
