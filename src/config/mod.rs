// complete-restore/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;

pub const DEFAULT_BACKUP_NAME: &str = "laravel-backup";
pub const DEFAULT_FILE_EXTENSION: &str = ".zip";
pub const DEFAULT_CONTAINER_BASE_PATH: &str = "var/www/html";
pub const DEFAULT_TEMP_DIRECTORY: &str = "storage/app/temp-restore";
pub const DEFAULT_MAX_EXECUTION_TIME: u64 = 3600;
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 5;

// Structs for deserializing the JSON config file
#[derive(Debug, Clone, Deserialize)]
pub struct JsonDiskConfig {
    pub driver: Option<String>,
    pub root: Option<PathBuf>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonConnectionConfig {
    pub driver: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonPermissions {
    pub directories: Option<serde_json::Value>,
    pub files: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDatabaseOptions {
    pub drop_tables_before_restore: Option<bool>,
    pub skip_foreign_key_checks: Option<bool>,
    pub use_single_transaction: Option<bool>,
    pub max_reported_errors: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRestorationOptions {
    pub max_execution_time: Option<u64>,
    pub memory_limit: Option<String>,
    pub run_health_checks: Option<bool>,
    pub fail_on_health_check_failure: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub backup_name: Option<String>,
    pub default_disk: Option<String>,
    pub disks: Option<BTreeMap<String, JsonDiskConfig>>,
    pub default_connection: Option<String>,
    pub connections: Option<BTreeMap<String, JsonConnectionConfig>>,
    pub base_path: Option<PathBuf>,
    pub container_base_path: Option<String>,
    pub file_mappings: Option<Vec<FileMapping>>,
    pub backup_existing_files: Option<bool>,
    pub permissions: Option<JsonPermissions>,
    pub web_directories: Option<Vec<PathBuf>>,
    pub storage_directories: Option<Vec<PathBuf>>,
    pub health_checks: Option<Vec<HealthCheckEntry>>,
    pub archive_password: Option<String>,
    pub env_file: Option<PathBuf>,
    pub file_extension: Option<String>,
    pub temp_directory: Option<PathBuf>,
    pub cleanup_temp_files: Option<bool>,
    pub database: Option<JsonDatabaseOptions>,
    pub restoration: Option<JsonRestorationOptions>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct S3DiskConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub root: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DiskConfig {
    Local { root: PathBuf },
    S3(S3DiskConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    MySql,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub driver: DatabaseDriver,
    pub url: String,
}

/// Backup-relative source (below the container base path) and its local destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileMapping {
    pub source: String,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionModes {
    pub directories: u32,
    pub files: u32,
}

impl Default for PermissionModes {
    fn default() -> Self {
        Self {
            directories: 0o755,
            files: 0o644,
        }
    }
}

/// One configured health check: a bare identifier or an identifier with options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HealthCheckEntry {
    Id(String),
    Detailed {
        check: String,
        #[serde(default)]
        files: Vec<PathBuf>,
    },
}

impl HealthCheckEntry {
    pub fn id(&self) -> &str {
        match self {
            HealthCheckEntry::Id(id) => id,
            HealthCheckEntry::Detailed { check, .. } => check,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        match self {
            HealthCheckEntry::Id(_) => &[],
            HealthCheckEntry::Detailed { files, .. } => files,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub drop_tables_before_restore: bool,
    pub skip_foreign_key_checks: bool,
    /// Replays the dump in one transaction, rolled back on the first failure.
    /// MySQL commits `CREATE`/`DROP`/`ALTER` implicitly, so there the rollback
    /// only covers data statements.
    pub use_single_transaction: bool,
    pub max_reported_errors: usize,
}

#[derive(Debug, Clone)]
pub struct RestorationOptions {
    pub max_execution_time: u64,
    pub memory_limit: Option<String>,
    pub run_health_checks: bool,
    pub fail_on_health_check_failure: bool,
}

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub backup_name: String,
    pub default_disk: String,
    pub disks: BTreeMap<String, DiskConfig>,
    pub default_connection: Option<String>,
    pub connections: BTreeMap<String, ConnectionConfig>,
    pub base_path: PathBuf,
    pub container_base_path: String,
    pub file_mappings: Vec<FileMapping>,
    pub backup_existing_files: bool,
    pub permissions: PermissionModes,
    pub web_directories: Vec<PathBuf>,
    pub storage_directories: Vec<PathBuf>,
    pub health_checks: Vec<HealthCheckEntry>,
    pub archive_password: Option<String>,
    pub env_file: PathBuf,
    pub file_extension: String,
    pub temp_directory: PathBuf,
    pub cleanup_temp_files: bool,
    pub database: DatabaseOptions,
    pub restoration: RestorationOptions,
}

impl RestoreConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_raw(raw_json_config, &config_dir)
    }

    /// Builds the typed configuration; relative paths resolve against `base_path`,
    /// and a relative `base_path` against `config_dir`.
    pub fn from_raw(raw: RawJsonConfig, config_dir: &Path) -> Result<Self> {
        let base_path = match raw.base_path {
            Some(path) if path.is_absolute() => path,
            Some(path) => config_dir.join(path),
            None => config_dir.to_path_buf(),
        };
        let resolve = |path: PathBuf| -> PathBuf {
            if path.is_absolute() {
                path
            } else {
                base_path.join(path)
            }
        };

        let raw_disks = raw
            .disks
            .filter(|disks| !disks.is_empty())
            .context("disks must define at least one disk in the config file")?;
        let mut disks = BTreeMap::new();
        for (name, raw_disk) in raw_disks {
            let disk = parse_disk_config(&name, raw_disk, &resolve)?;
            disks.insert(name, disk);
        }

        let default_disk = match raw.default_disk {
            Some(name) => name,
            None => disks
                .keys()
                .find(|name| name.as_str() == "local")
                .or_else(|| disks.keys().next())
                .cloned()
                .unwrap_or_default(),
        };
        if !disks.contains_key(&default_disk) {
            return Err(anyhow::anyhow!(
                "default_disk '{}' is not defined under disks",
                default_disk
            ));
        }

        let mut connections = BTreeMap::new();
        for (name, raw_connection) in raw.connections.unwrap_or_default() {
            let connection = parse_connection_config(&name, raw_connection)?;
            connections.insert(name, connection);
        }
        let default_connection = raw
            .default_connection
            .or_else(|| connections.keys().next().cloned());

        let permissions = match raw.permissions {
            Some(raw_permissions) => {
                let defaults = PermissionModes::default();
                PermissionModes {
                    directories: match raw_permissions.directories {
                        Some(value) => parse_mode(&value)
                            .context("permissions.directories is not a valid octal mode")?,
                        None => defaults.directories,
                    },
                    files: match raw_permissions.files {
                        Some(value) => parse_mode(&value)
                            .context("permissions.files is not a valid octal mode")?,
                        None => defaults.files,
                    },
                }
            }
            None => PermissionModes::default(),
        };

        let mut file_extension = raw
            .file_extension
            .filter(|ext| !ext.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_EXTENSION.to_string());
        if !file_extension.starts_with('.') {
            file_extension.insert(0, '.');
        }

        let raw_database = raw.database.unwrap_or_default();
        let raw_restoration = raw.restoration.unwrap_or_default();

        let file_mappings = raw
            .file_mappings
            .unwrap_or_default()
            .into_iter()
            .map(|mapping| FileMapping {
                source: mapping.source.trim_matches('/').to_string(),
                destination: resolve(mapping.destination),
            })
            .collect();

        Ok(RestoreConfig {
            backup_name: raw
                .backup_name
                .map(|name| name.trim_matches('/').to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_BACKUP_NAME.to_string()),
            default_disk,
            disks,
            default_connection,
            connections,
            container_base_path: raw
                .container_base_path
                .unwrap_or_else(|| DEFAULT_CONTAINER_BASE_PATH.to_string())
                .trim_matches('/')
                .to_string(),
            file_mappings,
            backup_existing_files: raw.backup_existing_files.unwrap_or(true),
            permissions,
            web_directories: raw
                .web_directories
                .unwrap_or_default()
                .into_iter()
                .map(&resolve)
                .collect(),
            storage_directories: raw
                .storage_directories
                .unwrap_or_default()
                .into_iter()
                .map(&resolve)
                .collect(),
            health_checks: raw.health_checks.unwrap_or_default(),
            archive_password: raw.archive_password.filter(|p| !p.is_empty()),
            env_file: resolve(raw.env_file.unwrap_or_else(|| PathBuf::from(".env"))),
            file_extension,
            temp_directory: resolve(
                raw.temp_directory
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIRECTORY)),
            ),
            cleanup_temp_files: raw.cleanup_temp_files.unwrap_or(true),
            database: DatabaseOptions {
                drop_tables_before_restore: raw_database
                    .drop_tables_before_restore
                    .unwrap_or(false),
                skip_foreign_key_checks: raw_database.skip_foreign_key_checks.unwrap_or(true),
                use_single_transaction: raw_database.use_single_transaction.unwrap_or(false),
                max_reported_errors: raw_database
                    .max_reported_errors
                    .unwrap_or(DEFAULT_MAX_REPORTED_ERRORS),
            },
            restoration: RestorationOptions {
                max_execution_time: raw_restoration
                    .max_execution_time
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_MAX_EXECUTION_TIME),
                memory_limit: raw_restoration.memory_limit,
                run_health_checks: raw_restoration.run_health_checks.unwrap_or(true),
                fail_on_health_check_failure: raw_restoration
                    .fail_on_health_check_failure
                    .unwrap_or(false),
            },
            base_path,
        })
    }

    /// Resolves an application-relative path against `base_path`.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

fn parse_disk_config(
    name: &str,
    raw_disk: JsonDiskConfig,
    resolve: &dyn Fn(PathBuf) -> PathBuf,
) -> Result<DiskConfig> {
    let driver = raw_disk.driver.as_deref().unwrap_or("local");
    match driver {
        "local" => {
            let root = raw_disk
                .root
                .with_context(|| format!("disk '{}' (local) must define a root", name))?;
            Ok(DiskConfig::Local {
                root: resolve(root),
            })
        }
        "s3" => {
            let required = [
                ("bucket", &raw_disk.bucket),
                ("region", &raw_disk.region),
                ("access_key_id", &raw_disk.access_key_id),
                ("secret_access_key", &raw_disk.secret_access_key),
                ("endpoint_url", &raw_disk.endpoint_url),
            ];
            let missing: Vec<&str> = required
                .iter()
                .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
                .map(|(field, _)| *field)
                .collect();
            if !missing.is_empty() {
                return Err(anyhow::anyhow!(
                    "disk '{}' (s3) is missing required fields: {}",
                    name,
                    missing.join(", ")
                ));
            }

            Ok(DiskConfig::S3(S3DiskConfig {
                bucket_name: raw_disk.bucket.unwrap_or_default(),
                region: raw_disk.region.unwrap_or_default(),
                access_key_id: raw_disk.access_key_id.unwrap_or_default(),
                secret_access_key: raw_disk.secret_access_key.unwrap_or_default(),
                endpoint_url: raw_disk.endpoint_url.unwrap_or_default(),
                root: raw_disk
                    .root
                    .map(|root| root.to_string_lossy().trim_matches('/').to_string())
                    .filter(|root| !root.is_empty()),
            }))
        }
        other => Err(anyhow::anyhow!(
            "disk '{}' uses unsupported driver '{}' (expected 'local' or 's3')",
            name,
            other
        )),
    }
}

fn parse_connection_config(name: &str, raw: JsonConnectionConfig) -> Result<ConnectionConfig> {
    let url = raw
        .url
        .filter(|url| !url.trim().is_empty())
        .with_context(|| format!("connection '{}' must define a url", name))?;

    let driver_name = match raw.driver {
        Some(driver) => driver,
        None => Url::parse(&url)
            .with_context(|| format!("connection '{}' has an invalid url", name))?
            .scheme()
            .to_string(),
    };

    let driver = match driver_name.as_str() {
        "mysql" | "mariadb" => DatabaseDriver::MySql,
        "pgsql" | "postgres" | "postgresql" => DatabaseDriver::Postgres,
        other => {
            warn!("Connection '{}' declares unsupported driver '{}'", name, other);
            return Err(anyhow::anyhow!(
                "connection '{}' uses unsupported driver '{}' (expected mysql or pgsql)",
                name,
                other
            ));
        }
    };

    Ok(ConnectionConfig { driver, url })
}

/// Parses a permission mode. Strings and integers are both read as octal digits,
/// so `"0755"`, `"755"` and `755` all mean `0o755`.
fn parse_mode(value: &serde_json::Value) -> Result<u32> {
    let digits = match value {
        serde_json::Value::String(s) => s.trim().trim_start_matches("0o").to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(anyhow::anyhow!("unsupported mode value: {}", other)),
    };
    let mode = u32::from_str_radix(&digits, 8)
        .with_context(|| format!("'{}' is not an octal permission mode", digits))?;
    if mode > 0o7777 {
        return Err(anyhow::anyhow!("mode {:o} is out of range", mode));
    }
    Ok(mode)
}
