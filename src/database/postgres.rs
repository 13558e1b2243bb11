// complete-restore/src/database/postgres.rs
use async_trait::async_trait;
use sqlx::{Connection, Executor, PgConnection, Row};
use tokio::sync::Mutex;

use super::Database;

pub struct PgTarget {
    conn: Mutex<PgConnection>,
}

impl PgTarget {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl Database for PgTarget {
    async fn execute_unprepared(&self, statement: &str) -> Result<(), sqlx::Error> {
        let mut guard = self.conn.lock().await;
        let conn: &mut PgConnection = &mut guard;
        conn.execute(statement).await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, sqlx::Error> {
        let mut guard = self.conn.lock().await;
        let conn: &mut PgConnection = &mut guard;
        let rows = conn
            .fetch_all("SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = 'public'")
            .await?;
        rows.iter().map(|row| row.try_get::<String, _>(0)).collect()
    }

    async fn drop_table(&self, table: &str) -> Result<(), sqlx::Error> {
        self.execute_unprepared(&format!(
            "DROP TABLE IF EXISTS {} CASCADE",
            quote_identifier(table)
        ))
        .await
    }

    /// Disabling triggers through the replication role needs superuser rights.
    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<(), sqlx::Error> {
        let role = if enabled { "origin" } else { "replica" };
        self.execute_unprepared(&format!("SET session_replication_role = {}", role))
            .await
    }

    async fn count_rows(&self, table: &str) -> Result<i64, sqlx::Error> {
        let mut guard = self.conn.lock().await;
        let conn: &mut PgConnection = &mut guard;
        let row = conn
            .fetch_one(format!("SELECT COUNT(*) FROM {}", quote_identifier(table)).as_str())
            .await?;
        row.try_get::<i64, _>(0)
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut guard = self.conn.lock().await;
        guard.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
