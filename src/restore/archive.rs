// complete-restore/src/restore/archive.rs
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::locator::BackupArchive;
use crate::config::RestoreConfig;
use crate::errors::{RestoreError, Result};
use crate::storage::Disk;
use crate::utils::{format_bytes, unix_timestamp};

pub const PASSWORD_ENV_KEY: &str = "BACKUP_ARCHIVE_PASSWORD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }

    fn local_file_name(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "backup.zip",
            ArchiveFormat::TarGz => "backup.tar.gz",
        }
    }
}

/// Picks the archive password: the explicit value, then the configured one,
/// then `BACKUP_ARCHIVE_PASSWORD` from the application's env file.
pub fn resolve_archive_password(explicit: Option<&str>, config: &RestoreConfig) -> Option<String> {
    explicit
        .filter(|password| !password.is_empty())
        .map(str::to_string)
        .or_else(|| config.archive_password.clone())
        .or_else(|| read_password_from_env_file(&config.env_file))
}

/// Reads `BACKUP_ARCHIVE_PASSWORD` from a dotenv file without touching the
/// process environment.
pub fn read_password_from_env_file(path: &Path) -> Option<String> {
    let entries = dotenvy::from_path_iter(path).ok()?;
    for entry in entries {
        match entry {
            Ok((key, value)) if key == PASSWORD_ENV_KEY => {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                return (!value.is_empty()).then(|| value.to_string());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Skipping unreadable line in {}: {}", path.display(), e);
            }
        }
    }
    None
}

/// Creates a fresh `<base>-<timestamp>` working directory.
pub fn create_scratch_dir(base: &Path) -> Result<PathBuf> {
    let stem = format!("{}-{}", base.display(), unix_timestamp());
    let mut candidate = PathBuf::from(&stem);
    let mut attempt = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}-{}", stem, attempt));
        attempt += 1;
    }
    fs::create_dir_all(&candidate)?;
    debug!("Created scratch directory {}", candidate.display());
    Ok(candidate)
}

/// Downloads `archive` from `disk` into `scratch_dir`.
pub async fn download_archive(
    disk: &dyn Disk,
    archive: &BackupArchive,
    format: ArchiveFormat,
    scratch_dir: &Path,
) -> Result<PathBuf> {
    let local_path = scratch_dir.join(format.local_file_name());
    info!("📥 Downloading backup file...");
    let bytes = disk.download(&archive.path, &local_path).await?;
    info!("✅ Downloaded {} ({})", archive.file_name(), format_bytes(bytes));
    Ok(local_path)
}

/// Entry names of the archive, without extracting anything.
pub fn list_archive_entries(archive_path: &Path, format: ArchiveFormat) -> Result<Vec<String>> {
    match format {
        ArchiveFormat::Zip => {
            let archive = zip::ZipArchive::new(File::open(archive_path)?)?;
            Ok(archive.file_names().map(str::to_string).collect())
        }
        ArchiveFormat::TarGz => {
            let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive_path)?));
            let mut names = Vec::new();
            for entry in archive.entries()? {
                let entry = entry?;
                names.push(entry.path()?.to_string_lossy().to_string());
            }
            Ok(names)
        }
    }
}

/// Whether `name` lies inside the application tree packed under
/// `container_base_path`.
pub fn is_application_entry(name: &str, container_base_path: &str) -> bool {
    let prefix = container_base_path.trim_matches('/');
    if prefix.is_empty() {
        return false;
    }
    let name = name.trim_start_matches("./").trim_start_matches('/');
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Whether an entry name looks like part of a database dump. SQL files shipped
/// with the application (schema dumps, seeds) do not count.
pub fn is_database_entry(name: &str, container_base_path: &str) -> bool {
    if is_application_entry(name, container_base_path) {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".sql") || lower.ends_with(".sql.gz") || lower.contains("db-dumps/")
}

/// Inspects the archive's entry names for a database dump.
pub fn archive_contains_database(
    archive_path: &Path,
    format: ArchiveFormat,
    container_base_path: &str,
) -> Result<bool> {
    let entries = list_archive_entries(archive_path, format).map_err(|e| {
        RestoreError::Extraction(format!(
            "Failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;
    let contains_database = entries
        .iter()
        .any(|name| is_database_entry(name, container_base_path));
    debug!(
        "Archive has {} entries; database dump present: {}",
        entries.len(),
        contains_database
    );
    Ok(contains_database)
}

/// Extracts the downloaded archive into `scratch_dir` and deletes the archive.
///
/// On failure the whole scratch directory is removed before the error is returned.
pub fn extract_downloaded_archive(
    archive_path: &Path,
    format: ArchiveFormat,
    password: Option<&str>,
    scratch_dir: &Path,
) -> Result<usize> {
    info!("📦 Extracting backup...");
    let extracted = match format {
        ArchiveFormat::Zip => extract_zip(archive_path, password, scratch_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, scratch_dir),
    };

    match extracted {
        Ok(count) => {
            if let Err(e) = fs::remove_file(archive_path) {
                warn!(
                    "Could not remove downloaded archive {}: {}",
                    archive_path.display(),
                    e
                );
            }
            info!("✅ Extracted {} files", count);
            Ok(count)
        }
        Err(e) => {
            if let Err(cleanup_error) = fs::remove_dir_all(scratch_dir) {
                warn!(
                    "Could not remove scratch directory {}: {}",
                    scratch_dir.display(),
                    cleanup_error
                );
            }
            let hint = if password.is_some() {
                " (check the archive password)"
            } else {
                ""
            };
            Err(RestoreError::Extraction(format!(
                "Failed to extract {}{}: {}",
                archive_path.display(),
                hint,
                e
            )))
        }
    }
}

fn extract_zip(archive_path: &Path, password: Option<&str>, extract_to: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;
    let mut extracted = 0;

    for index in 0..archive.len() {
        let mut entry = match password {
            Some(password) => archive.by_index_decrypt(index, password.as_bytes())?,
            None => archive.by_index(index)?,
        };
        let relative = entry.enclosed_name().ok_or_else(|| {
            RestoreError::Extraction(format!("unsafe entry path '{}'", entry.name()))
        })?;
        let out_path = extract_to.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
        extracted += 1;
    }
    Ok(extracted)
}

fn extract_tar_gz(archive_path: &Path, extract_to: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive_path)?));
    let mut extracted = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_file = entry.header().entry_type().is_file();
        // unpack_in refuses entries that would land outside extract_to.
        if entry.unpack_in(extract_to)? && is_file {
            extracted += 1;
        }
    }
    Ok(extracted)
}
