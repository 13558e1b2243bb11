// complete-restore/src/storage/local.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Disk, DiskFile, join_disk_path};
use crate::errors::{RestoreError, Result};

/// A disk backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDisk {
    name: String,
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(name: &str, root: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            root,
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let relative = path.trim_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    fn describe(&self, path: &str, full_path: &Path) -> Result<DiskFile> {
        let metadata = fs::metadata(full_path)?;
        if !metadata.is_file() {
            return Err(RestoreError::NotFound(format!(
                "'{}' is not a file on disk '{}'",
                path, self.name
            )));
        }
        let last_modified: DateTime<Utc> = metadata.modified()?.into();
        Ok(DiskFile {
            path: path.trim_matches('/').to_string(),
            size: metadata.len(),
            last_modified,
        })
    }
}

#[async_trait]
impl Disk for LocalDisk {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).exists())
    }

    async fn files(&self, directory: &str) -> Result<Vec<DiskFile>> {
        let dir = self.full_path(directory);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let path = join_disk_path(directory, &name);
            files.push(self.describe(&path, &entry.path())?);
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn metadata(&self, path: &str) -> Result<DiskFile> {
        let full_path = self.full_path(path);
        if !full_path.exists() {
            return Err(RestoreError::NotFound(format!(
                "'{}' does not exist on disk '{}'",
                path, self.name
            )));
        }
        self.describe(path, &full_path)
    }

    async fn download(&self, path: &str, destination: &Path) -> Result<u64> {
        let source = self.full_path(path);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(
            "Copying {} from local disk '{}' to {}",
            source.display(),
            self.name,
            destination.display()
        );
        let bytes = fs::copy(&source, destination)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_files_lists_only_direct_files() -> Result<()> {
        let root = tempfile::tempdir()?;
        let backups = root.path().join("laravel-backup");
        fs::create_dir_all(backups.join("nested"))?;
        fs::write(backups.join("a.zip"), b"aaaa")?;
        fs::write(backups.join("b.zip"), b"bb")?;
        fs::write(backups.join("nested").join("c.zip"), b"c")?;

        let disk = LocalDisk::new("local", root.path().to_path_buf());
        let files = disk.files("laravel-backup").await?;

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["laravel-backup/a.zip", "laravel-backup/b.zip"]);
        assert_eq!(files[0].size, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_directory_has_no_files() -> Result<()> {
        let root = tempfile::tempdir()?;
        let disk = LocalDisk::new("local", root.path().to_path_buf());
        assert!(!disk.exists("laravel-backup").await?);
        assert!(disk.files("laravel-backup").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_download_copies_bytes() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir_all(root.path().join("dir"))?;
        fs::write(root.path().join("dir/backup.zip"), b"payload")?;

        let target = tempfile::tempdir()?;
        let destination = target.path().join("scratch/backup.zip");
        let disk = LocalDisk::new("local", root.path().to_path_buf());
        let bytes = disk.download("dir/backup.zip", &destination).await?;

        assert_eq!(bytes, 7);
        assert_eq!(fs::read(&destination)?, b"payload");
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_of_missing_file_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let disk = LocalDisk::new("local", root.path().to_path_buf());
        let err = disk.metadata("nope.zip").await.unwrap_err();
        assert!(matches!(err, RestoreError::NotFound(_)));
    }
}
