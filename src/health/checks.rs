// complete-restore/src/health/checks.rs
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

use super::{CheckContext, HealthCheck, HealthCheckOutcome, HealthCheckRegistry};
use crate::config::{HealthCheckEntry, RestoreConfig};

const CRITICAL_FILES: [&str; 3] = [".env", "config/app.php", "config/database.php"];
const STORAGE_DIRECTORIES: [&str; 5] = [
    "storage/app",
    "storage/logs",
    "storage/framework/cache",
    "storage/framework/sessions",
    "storage/framework/views",
];
const ACCEPTED_DIRECTORY_MODES: [u32; 2] = [0o755, 0o775];
const REQUIRED_APP_SETTINGS: [&str; 4] = ["APP_NAME", "APP_ENV", "APP_KEY", "APP_DEBUG"];

pub fn register_builtin_checks(registry: &mut HealthCheckRegistry) {
    registry.register("database-connection", |_, _| Box::new(DatabaseConnection));
    registry.register("database-has-tables", |_, _| Box::new(DatabaseHasTables));
    registry.register("database-has-records", |_, _| Box::new(DatabaseHasRecords));
    registry.register("files-exist", |entry, config| {
        Box::new(FilesExist {
            paths: paths_or(entry, config, || {
                config
                    .file_mappings
                    .iter()
                    .map(|mapping| mapping.destination.clone())
                    .collect()
            }),
        })
    });
    registry.register("file-integrity", |entry, config| {
        Box::new(FileIntegrity {
            paths: paths_or(entry, config, || {
                config
                    .file_mappings
                    .iter()
                    .map(|mapping| mapping.destination.clone())
                    .collect()
            }),
        })
    });
    registry.register("storage-directories", |entry, config| {
        Box::new(StorageDirectories {
            paths: paths_or(entry, config, || {
                STORAGE_DIRECTORIES
                    .iter()
                    .map(|dir| config.resolve_path(Path::new(dir)))
                    .collect()
            }),
        })
    });
    registry.register("critical-files", |entry, config| {
        Box::new(CriticalFiles {
            paths: paths_or(entry, config, || {
                CRITICAL_FILES
                    .iter()
                    .map(|file| config.resolve_path(Path::new(file)))
                    .collect()
            }),
        })
    });
    registry.register("application-configuration", |_, config| {
        Box::new(ApplicationConfiguration {
            env_file: config.env_file.clone(),
        })
    });
}

/// The entry's own `files` (resolved against the base path), or `default`.
fn paths_or(
    entry: &HealthCheckEntry,
    config: &RestoreConfig,
    default: impl FnOnce() -> Vec<PathBuf>,
) -> Vec<PathBuf> {
    if entry.files().is_empty() {
        default()
    } else {
        entry
            .files()
            .iter()
            .map(|path| config.resolve_path(path))
            .collect()
    }
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

struct DatabaseConnection;

#[async_trait]
impl HealthCheck for DatabaseConnection {
    fn name(&self) -> &str {
        "Database connection"
    }

    fn description(&self) -> &str {
        "The restored database accepts connections"
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> HealthCheckOutcome {
        let Some(db) = ctx.database else {
            return HealthCheckOutcome::fail("No database connection available");
        };
        match db.ping().await {
            Ok(()) => HealthCheckOutcome::pass("Database connection successful"),
            Err(e) => HealthCheckOutcome::fail(format!("Database connection failed: {}", e)),
        }
    }
}

struct DatabaseHasTables;

#[async_trait]
impl HealthCheck for DatabaseHasTables {
    fn name(&self) -> &str {
        "Database has tables"
    }

    fn description(&self) -> &str {
        "The restored database contains at least one table"
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> HealthCheckOutcome {
        let Some(db) = ctx.database else {
            return HealthCheckOutcome::fail("No database connection available");
        };
        match db.list_tables().await {
            Ok(tables) if !tables.is_empty() => {
                HealthCheckOutcome::pass(format!("Database has {} tables", tables.len()))
            }
            Ok(_) => HealthCheckOutcome::fail("Database has no tables"),
            Err(e) => HealthCheckOutcome::fail(format!("Could not list tables: {}", e)),
        }
    }
}

struct DatabaseHasRecords;

#[async_trait]
impl HealthCheck for DatabaseHasRecords {
    fn name(&self) -> &str {
        "Database has records"
    }

    fn description(&self) -> &str {
        "At least one table of the restored database holds rows"
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> HealthCheckOutcome {
        let Some(db) = ctx.database else {
            return HealthCheckOutcome::fail("No database connection available");
        };
        let tables = match db.list_tables().await {
            Ok(tables) => tables,
            Err(e) => return HealthCheckOutcome::fail(format!("Could not list tables: {}", e)),
        };

        let mut total_rows = 0i64;
        let mut populated = 0usize;
        for table in &tables {
            match db.count_rows(table).await {
                Ok(rows) if rows > 0 => {
                    total_rows += rows;
                    populated += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    return HealthCheckOutcome::fail(format!(
                        "Could not count rows in {}: {}",
                        table, e
                    ));
                }
            }
        }

        if total_rows > 0 {
            HealthCheckOutcome::pass(format!(
                "Found {} records in {} of {} tables",
                total_rows,
                populated,
                tables.len()
            ))
        } else {
            HealthCheckOutcome::fail("No records found in any table")
        }
    }
}

struct FilesExist {
    paths: Vec<PathBuf>,
}

#[async_trait]
impl HealthCheck for FilesExist {
    fn name(&self) -> &str {
        "Files exist"
    }

    fn description(&self) -> &str {
        "Every restored destination exists"
    }

    async fn run(&self, _ctx: &CheckContext<'_>) -> HealthCheckOutcome {
        let missing: Vec<PathBuf> = self.paths.iter().filter(|p| !p.exists()).cloned().collect();
        if missing.is_empty() {
            HealthCheckOutcome::pass(format!("All {} paths exist", self.paths.len()))
        } else {
            HealthCheckOutcome::fail(format!("Missing: {}", list_paths(&missing)))
        }
    }
}

struct FileIntegrity {
    paths: Vec<PathBuf>,
}

impl FileIntegrity {
    fn problem(path: &Path) -> Option<String> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => return Some(format!("{} is not accessible ({})", path.display(), e)),
        };

        if metadata.is_dir() {
            if let Err(e) = fs::read_dir(path) {
                return Some(format!("{} is not readable ({})", path.display(), e));
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;

                let mode = metadata.permissions().mode() & 0o7777;
                if !ACCEPTED_DIRECTORY_MODES.contains(&mode) {
                    return Some(format!("{} has mode {:o}", path.display(), mode));
                }
            }
        } else if let Err(e) = fs::File::open(path) {
            return Some(format!("{} is not readable ({})", path.display(), e));
        }
        None
    }
}

#[async_trait]
impl HealthCheck for FileIntegrity {
    fn name(&self) -> &str {
        "File integrity"
    }

    fn description(&self) -> &str {
        "Restored directories are readable with a 0755 or 0775 mode"
    }

    async fn run(&self, _ctx: &CheckContext<'_>) -> HealthCheckOutcome {
        let problems: Vec<String> = self
            .paths
            .iter()
            .filter_map(|path| Self::problem(path))
            .collect();
        if problems.is_empty() {
            HealthCheckOutcome::pass("Restored paths are readable with expected permissions")
        } else {
            HealthCheckOutcome::fail(problems.join("; "))
        }
    }
}

struct StorageDirectories {
    paths: Vec<PathBuf>,
}

#[async_trait]
impl HealthCheck for StorageDirectories {
    fn name(&self) -> &str {
        "Storage directories"
    }

    fn description(&self) -> &str {
        "Storage directories exist and are writable"
    }

    async fn run(&self, _ctx: &CheckContext<'_>) -> HealthCheckOutcome {
        let mut problems = Vec::new();
        for dir in &self.paths {
            match fs::metadata(dir) {
                Ok(metadata) if metadata.is_dir() && !metadata.permissions().readonly() => {}
                Ok(metadata) if metadata.is_dir() => {
                    problems.push(format!("{} is not writable", dir.display()))
                }
                Ok(_) => problems.push(format!("{} is not a directory", dir.display())),
                Err(_) => problems.push(format!("{} does not exist", dir.display())),
            }
        }
        if problems.is_empty() {
            HealthCheckOutcome::pass(format!(
                "All {} storage directories are writable",
                self.paths.len()
            ))
        } else {
            HealthCheckOutcome::fail(problems.join("; "))
        }
    }
}

struct CriticalFiles {
    paths: Vec<PathBuf>,
}

#[async_trait]
impl HealthCheck for CriticalFiles {
    fn name(&self) -> &str {
        "Critical files"
    }

    fn description(&self) -> &str {
        "Application files required to boot are present"
    }

    async fn run(&self, _ctx: &CheckContext<'_>) -> HealthCheckOutcome {
        let missing: Vec<PathBuf> = self.paths.iter().filter(|p| !p.is_file()).cloned().collect();
        if missing.is_empty() {
            HealthCheckOutcome::pass("All critical files are present")
        } else {
            HealthCheckOutcome::fail(format!("Missing critical files: {}", list_paths(&missing)))
        }
    }
}

struct ApplicationConfiguration {
    env_file: PathBuf,
}

#[async_trait]
impl HealthCheck for ApplicationConfiguration {
    fn name(&self) -> &str {
        "Application configuration"
    }

    fn description(&self) -> &str {
        "The env file sets APP_NAME, APP_ENV, APP_KEY and APP_DEBUG"
    }

    async fn run(&self, _ctx: &CheckContext<'_>) -> HealthCheckOutcome {
        let entries = match dotenvy::from_path_iter(&self.env_file) {
            Ok(entries) => entries,
            Err(e) => {
                return HealthCheckOutcome::fail(format!(
                    "Could not read {}: {}",
                    self.env_file.display(),
                    e
                ));
            }
        };
        let set: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, _)| key)
            .collect();

        let missing: Vec<&str> = REQUIRED_APP_SETTINGS
            .into_iter()
            .filter(|key| !set.iter().any(|found| found == key))
            .collect();
        if missing.is_empty() {
            HealthCheckOutcome::pass("Application configuration is complete")
        } else {
            HealthCheckOutcome::fail(format!("Configuration missing: {}", missing.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawJsonConfig;
    use crate::database::testing::MemoryDatabase;
    use crate::health::run_health_checks;
    use serde_json::json;
    use tempfile::tempdir;

    fn config_in(app: &Path, extra: serde_json::Value) -> RestoreConfig {
        let mut value = json!({
            "base_path": app,
            "disks": { "local": { "root": "backups" } }
        });
        if let (Some(target), Some(source)) = (value.as_object_mut(), extra.as_object()) {
            for (key, item) in source {
                target.insert(key.clone(), item.clone());
            }
        }
        let raw: RawJsonConfig = serde_json::from_value(value).unwrap();
        RestoreConfig::from_raw(raw, app).unwrap()
    }

    async fn run_one(id: &str, config: &RestoreConfig, db: Option<&MemoryDatabase>) -> HealthCheckOutcome {
        let registry = HealthCheckRegistry::with_builtin_checks();
        let entry = HealthCheckEntry::Id(id.to_string());
        let check = registry.resolve(&entry, config).unwrap();
        let ctx = CheckContext {
            config,
            database: db.map(|db| db as &dyn crate::database::Database),
        };
        check.run(&ctx).await
    }

    #[tokio::test]
    async fn test_database_checks() {
        let app = tempdir().unwrap();
        let config = config_in(app.path(), json!({}));

        let empty = MemoryDatabase::with_tables(&[("users", 0)]);
        assert!(run_one("database-connection", &config, Some(&empty)).await.passed);
        assert!(run_one("database-has-tables", &config, Some(&empty)).await.passed);
        assert!(!run_one("database-has-records", &config, Some(&empty)).await.passed);

        let populated = MemoryDatabase::with_tables(&[("users", 2), ("posts", 0)]);
        let outcome = run_one("database-has-records", &config, Some(&populated)).await;
        assert!(outcome.passed);
        assert!(outcome.message.contains("2 records"));

        let unreachable = MemoryDatabase {
            unreachable: true,
            ..MemoryDatabase::default()
        };
        assert!(!run_one("database-connection", &config, Some(&unreachable)).await.passed);
        assert!(!run_one("database-has-tables", &config, None).await.passed);
    }

    #[tokio::test]
    async fn test_files_exist_defaults_to_mapping_destinations() {
        let app = tempdir().unwrap();
        fs::create_dir_all(app.path().join("public")).unwrap();
        let config = config_in(
            app.path(),
            json!({ "file_mappings": [
                { "source": "public", "destination": "public" },
                { "source": "storage", "destination": "storage" }
            ]}),
        );

        let outcome = run_one("files-exist", &config, None).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains("storage"));

        fs::create_dir_all(app.path().join("storage")).unwrap();
        assert!(run_one("files-exist", &config, None).await.passed);
    }

    #[tokio::test]
    async fn test_critical_files_and_detailed_entries() {
        let app = tempdir().unwrap();
        fs::create_dir_all(app.path().join("config")).unwrap();
        fs::write(app.path().join(".env"), "APP_KEY=x").unwrap();
        fs::write(app.path().join("config/app.php"), "<?php").unwrap();

        let config = config_in(
            app.path(),
            json!({ "health_checks": [
                "critical-files",
                { "check": "critical-files", "files": [".env", "config/app.php"] }
            ]}),
        );
        let ctx = CheckContext {
            config: &config,
            database: None,
        };
        let report = run_health_checks(
            &HealthCheckRegistry::with_builtin_checks(),
            &config.health_checks,
            &ctx,
        )
        .await;

        assert_eq!(report.total(), 2);
        assert!(!report.results[0].outcome.passed);
        assert!(report.results[0].outcome.message.contains("database.php"));
        assert!(report.results[1].outcome.passed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_integrity_checks_directory_modes() {
        use std::os::unix::fs::PermissionsExt;

        let app = tempdir().unwrap();
        let public = app.path().join("public");
        fs::create_dir_all(&public).unwrap();
        fs::set_permissions(&public, fs::Permissions::from_mode(0o755)).unwrap();
        let config = config_in(
            app.path(),
            json!({ "file_mappings": [{ "source": "public", "destination": "public" }] }),
        );
        assert!(run_one("file-integrity", &config, None).await.passed);

        fs::set_permissions(&public, fs::Permissions::from_mode(0o700)).unwrap();
        let outcome = run_one("file-integrity", &config, None).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains("700"));
    }

    #[tokio::test]
    async fn test_storage_directories_must_exist() {
        let app = tempdir().unwrap();
        fs::create_dir_all(app.path().join("storage/app")).unwrap();
        fs::create_dir_all(app.path().join("storage/logs")).unwrap();
        let config = config_in(app.path(), json!({}));
        let outcome = run_one("storage-directories", &config, None).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains("storage/framework/cache"));

        for dir in ["cache", "sessions", "views"] {
            fs::create_dir_all(app.path().join("storage/framework").join(dir)).unwrap();
        }
        assert!(run_one("storage-directories", &config, None).await.passed);
    }

    #[tokio::test]
    async fn test_application_configuration_names_missing_settings() {
        let app = tempdir().unwrap();
        let config = config_in(app.path(), json!({}));
        let outcome = run_one("application-configuration", &config, None).await;
        assert!(!outcome.passed);
        assert!(outcome.message.contains(".env"));

        fs::write(
            app.path().join(".env"),
            "APP_NAME=Shop\nAPP_ENV=production\nAPP_KEY=\nDB_HOST=localhost\n",
        )
        .unwrap();
        let outcome = run_one("ApplicationConfiguration", &config, None).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.message, "Configuration missing: APP_KEY, APP_DEBUG");

        fs::write(
            app.path().join(".env"),
            "APP_NAME=Shop\nAPP_ENV=production\nAPP_KEY=base64:abc\nAPP_DEBUG=false\n",
        )
        .unwrap();
        assert!(run_one("application-configuration", &config, None).await.passed);
    }
}
