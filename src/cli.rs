use clap::Parser;
use std::path::PathBuf;

use crate::restore::RestoreOptions;

/// Complete restore of database AND files from an application backup.
#[derive(Parser, Debug)]
#[command(name = "restore-complete", version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "RESTORE_CONFIG", default_value = "restore.json")]
    pub config: PathBuf,

    /// Disk to restore from (defaults to the configured default disk)
    #[arg(long)]
    pub disk: Option<String>,

    /// Specific backup file to restore (defaults to the latest)
    #[arg(long)]
    pub backup: Option<String>,

    /// Database connection to restore into
    #[arg(long)]
    pub connection: Option<String>,

    /// Password for encrypted archives
    #[arg(long, env = "BACKUP_ARCHIVE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Drop all existing tables before importing the dump
    #[arg(long)]
    pub reset: bool,

    /// Only restore the database
    #[arg(long, conflicts_with = "files_only")]
    pub database_only: bool,

    /// Only restore files
    #[arg(long)]
    pub files_only: bool,

    /// List available backups and exit
    #[arg(long)]
    pub list: bool,

    /// Only run the configured health checks
    #[arg(long)]
    pub health_check: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn restore_options(&self) -> RestoreOptions {
        RestoreOptions {
            disk: self.disk.clone(),
            backup: self.backup.clone(),
            connection: self.connection.clone(),
            password: self.password.clone(),
            reset: self.reset,
            database_only: self.database_only,
            files_only: self.files_only,
            force: self.force,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_restore_flags() {
        let cli = Cli::parse_from([
            "restore-complete",
            "--disk",
            "s3",
            "--backup",
            "2024-02-01.zip",
            "--reset",
            "--files-only",
            "--force",
        ]);
        let options = cli.restore_options();
        assert_eq!(options.disk.as_deref(), Some("s3"));
        assert_eq!(options.backup.as_deref(), Some("2024-02-01.zip"));
        assert!(options.reset && options.files_only && options.force);
        assert!(!options.database_only);
    }

    #[test]
    fn test_database_only_conflicts_with_files_only() {
        let parsed = Cli::try_parse_from(["restore-complete", "--database-only", "--files-only"]);
        assert!(parsed.is_err());
    }
}
