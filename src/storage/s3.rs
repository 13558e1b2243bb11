// complete-restore/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{Disk, DiskFile, join_disk_path};
use crate::config::S3DiskConfig;
use crate::errors::{RestoreError, Result};

/// A disk backed by an S3-compatible bucket, optionally below a key prefix.
pub struct S3Disk {
    name: String,
    bucket: String,
    root: Option<String>,
    client: s3::Client,
}

impl S3Disk {
    pub async fn connect(name: &str, config: &S3DiskConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,
                None,
                "Static",
            ))
            .load()
            .await;

        Self {
            name: name.to_string(),
            bucket: config.bucket_name.clone(),
            root: config.root.clone(),
            client: s3::Client::new(&sdk_config),
        }
    }

    fn key_for(&self, path: &str) -> String {
        match &self.root {
            Some(root) => join_disk_path(root, path),
            None => path.trim_matches('/').to_string(),
        }
    }

    /// Maps a bucket key back to a disk-relative path.
    fn path_for(&self, key: &str) -> String {
        match &self.root {
            Some(root) => key
                .strip_prefix(root.as_str())
                .map(|rest| rest.trim_start_matches('/').to_string())
                .unwrap_or_else(|| key.to_string()),
            None => key.to_string(),
        }
    }
}

fn to_utc(timestamp: Option<&s3::primitives::DateTime>) -> DateTime<Utc> {
    timestamp
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[async_trait]
impl Disk for S3Disk {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = self.key_for(path);
        if self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .is_ok()
        {
            return Ok(true);
        }

        // Directories only exist as key prefixes.
        let listing = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(format!("{}/", key))
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                RestoreError::Storage(format!(
                    "Failed to list s3://{}/{}/: {}",
                    self.bucket, key, e
                ))
            })?;
        Ok(listing.key_count().unwrap_or(0) > 0)
    }

    async fn files(&self, directory: &str) -> Result<Vec<DiskFile>> {
        let key = self.key_for(directory);
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        };

        let mut files = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .delimiter("/")
                .set_continuation_token(continuation_token.clone())
                .send()
                .await
                .map_err(|e| {
                    RestoreError::Storage(format!(
                        "Failed to list s3://{}/{}: {}",
                        self.bucket, prefix, e
                    ))
                })?;

            for object in output.contents() {
                let Some(object_key) = object.key() else {
                    continue;
                };
                if object_key.ends_with('/') {
                    continue;
                }
                files.push(DiskFile {
                    path: self.path_for(object_key),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: to_utc(object.last_modified()),
                });
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(str::to_string);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!("Listed {} objects under s3://{}/{}", files.len(), self.bucket, prefix);
        Ok(files)
    }

    async fn metadata(&self, path: &str) -> Result<DiskFile> {
        let key = self.key_for(path);
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                RestoreError::NotFound(format!("s3://{}/{} ({})", self.bucket, key, e))
            })?;

        Ok(DiskFile {
            path: path.trim_matches('/').to_string(),
            size: head.content_length().unwrap_or(0).max(0) as u64,
            last_modified: to_utc(head.last_modified()),
        })
    }

    async fn download(&self, path: &str, destination: &Path) -> Result<u64> {
        let key = self.key_for(path);
        info!(
            "⏳ Downloading s3://{}/{} to {}",
            self.bucket,
            key,
            destination.display()
        );

        if let Some(parent_dir) = destination.parent() {
            tokio::fs::create_dir_all(parent_dir).await?;
        }

        let mut output_file = File::create(destination).await?;

        let mut object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                RestoreError::Storage(format!(
                    "Failed to get object s3://{}/{}: {}",
                    self.bucket, key, e
                ))
            })?;

        let mut total_bytes_downloaded = 0u64;
        while let Some(bytes_chunk) = object.body.try_next().await.map_err(|e| {
            RestoreError::Storage(format!(
                "Failed to read object body s3://{}/{}: {}",
                self.bucket, key, e
            ))
        })? {
            output_file.write_all(&bytes_chunk).await?;
            total_bytes_downloaded += bytes_chunk.len() as u64;
        }
        output_file.flush().await?;

        Ok(total_bytes_downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_with_root(root: Option<&str>) -> S3Disk {
        let sdk_config = s3::Config::builder()
            .behavior_version(s3::config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        S3Disk {
            name: "s3".to_string(),
            bucket: "backups".to_string(),
            root: root.map(str::to_string),
            client: s3::Client::from_conf(sdk_config),
        }
    }

    #[test]
    fn test_keys_are_prefixed_with_root() {
        let disk = disk_with_root(Some("tenant-a"));
        assert_eq!(disk.key_for("laravel-backup/x.zip"), "tenant-a/laravel-backup/x.zip");
        assert_eq!(disk.path_for("tenant-a/laravel-backup/x.zip"), "laravel-backup/x.zip");

        let bare = disk_with_root(None);
        assert_eq!(bare.key_for("/laravel-backup/x.zip"), "laravel-backup/x.zip");
        assert_eq!(bare.path_for("laravel-backup/x.zip"), "laravel-backup/x.zip");
    }

    #[test]
    fn test_missing_timestamp_maps_to_epoch() {
        assert_eq!(to_utc(None), DateTime::<Utc>::UNIX_EPOCH);
        let ts = s3::primitives::DateTime::from_secs(1_706_745_600);
        assert_eq!(to_utc(Some(&ts)).timestamp(), 1_706_745_600);
    }
}
