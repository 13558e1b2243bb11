//! Named disks holding backup archives.
//!
//! A disk is addressed with `/`-separated paths relative to its root, the way
//! the backup job wrote them (`<backup_name>/<archive>`).

pub(crate) mod local;
pub(crate) mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::config::{DiskConfig, RestoreConfig};
use crate::errors::{RestoreError, Result};

pub use local::LocalDisk;
pub use s3::S3Disk;

/// A single file on a disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskFile {
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl DiskFile {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

#[async_trait]
pub trait Disk: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a file or a directory exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Files directly inside `directory` (not recursive).
    async fn files(&self, directory: &str) -> Result<Vec<DiskFile>>;

    async fn metadata(&self, path: &str) -> Result<DiskFile>;

    /// Copies the file at `path` to the local `destination`, returning the byte count.
    async fn download(&self, path: &str, destination: &Path) -> Result<u64>;
}

/// Builds the disk registered under `name` in the configuration.
pub async fn open_disk(config: &RestoreConfig, name: &str) -> Result<Box<dyn Disk>> {
    let disk_config = config
        .disks
        .get(name)
        .ok_or_else(|| RestoreError::NotFound(format!("disk '{}' is not configured", name)))?;

    match disk_config {
        DiskConfig::Local { root } => Ok(Box::new(LocalDisk::new(name, root.clone()))),
        DiskConfig::S3(s3_config) => Ok(Box::new(S3Disk::connect(name, s3_config).await)),
    }
}

/// Joins disk path segments with `/`, ignoring empty segments.
pub fn join_disk_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_matches('/');
    let child = child.trim_matches('/');
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{}/{}", parent, child),
    }
}
