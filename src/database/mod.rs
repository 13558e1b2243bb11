//! Target database connections used to replay dumps and run health checks.

pub(crate) mod mysql;
pub(crate) mod postgres;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::config::{ConnectionConfig, DatabaseDriver, RestoreConfig};
use crate::errors::{RestoreError, Result};

pub use mysql::MySqlTarget;
pub use postgres::PgTarget;

/// A single live connection to the restore target.
///
/// Session settings (foreign-key checks, open transactions) apply to every later
/// call, so implementations must hold exactly one connection.
#[async_trait]
pub trait Database: Send + Sync {
    /// Executes one statement through the simple (unprepared) query protocol.
    async fn execute_unprepared(&self, statement: &str) -> std::result::Result<(), sqlx::Error>;

    async fn list_tables(&self) -> std::result::Result<Vec<String>, sqlx::Error>;

    async fn drop_table(&self, table: &str) -> std::result::Result<(), sqlx::Error>;

    async fn set_foreign_key_checks(&self, enabled: bool) -> std::result::Result<(), sqlx::Error>;

    async fn count_rows(&self, table: &str) -> std::result::Result<i64, sqlx::Error>;

    async fn ping(&self) -> std::result::Result<(), sqlx::Error>;

    /// Whether schema statements (`CREATE`, `DROP`, `ALTER`) can be rolled back.
    fn transactional_ddl(&self) -> bool {
        true
    }

    async fn begin(&self) -> std::result::Result<(), sqlx::Error> {
        self.execute_unprepared("BEGIN").await
    }

    async fn commit(&self) -> std::result::Result<(), sqlx::Error> {
        self.execute_unprepared("COMMIT").await
    }

    async fn rollback(&self) -> std::result::Result<(), sqlx::Error> {
        self.execute_unprepared("ROLLBACK").await
    }
}

/// Resolves the connection name (explicit or configured default) to its settings.
pub fn resolve_connection<'a>(
    config: &'a RestoreConfig,
    requested: Option<&str>,
) -> Result<(&'a str, &'a ConnectionConfig)> {
    let name = requested
        .or(config.default_connection.as_deref())
        .ok_or_else(|| {
            RestoreError::NotFound("no database connection configured".to_string())
        })?;

    config
        .connections
        .get_key_value(name)
        .map(|(name, connection)| (name.as_str(), connection))
        .ok_or_else(|| {
            RestoreError::NotFound(format!("Database connection '{}' not found", name))
        })
}

/// Opens the single connection used for the whole run.
pub async fn connect(name: &str, connection: &ConnectionConfig) -> Result<Box<dyn Database>> {
    info!(
        "📊 Connecting to '{}' ({})",
        name,
        describe_connection_url(&connection.url)
    );
    let database: Box<dyn Database> = match connection.driver {
        DatabaseDriver::MySql => Box::new(MySqlTarget::connect(&connection.url).await?),
        DatabaseDriver::Postgres => Box::new(PgTarget::connect(&connection.url).await?),
    };
    Ok(database)
}

/// Describes a connection URL as `database on host:port`, without credentials.
pub fn describe_connection_url(db_url: &str) -> String {
    match Url::parse(db_url) {
        Ok(parsed) => {
            let database = parsed.path().trim_start_matches('/');
            let host = parsed.host_str().unwrap_or("localhost");
            match parsed.port() {
                Some(port) => format!("{} on {}:{}", database, host, port),
                None => format!("{} on {}", database, host),
            }
        }
        Err(_) => "unparseable connection url".to_string(),
    }
}
