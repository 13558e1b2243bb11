// complete-restore/src/database/mysql.rs
use async_trait::async_trait;
use sqlx::{Connection, Executor, MySqlConnection, Row};
use tokio::sync::Mutex;

use super::Database;

pub struct MySqlTarget {
    conn: Mutex<MySqlConnection>,
}

impl MySqlTarget {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let conn = MySqlConnection::connect(url).await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[async_trait]
impl Database for MySqlTarget {
    async fn execute_unprepared(&self, statement: &str) -> Result<(), sqlx::Error> {
        let mut guard = self.conn.lock().await;
        let conn: &mut MySqlConnection = &mut guard;
        conn.execute(statement).await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, sqlx::Error> {
        let mut guard = self.conn.lock().await;
        let conn: &mut MySqlConnection = &mut guard;
        let rows = conn.fetch_all("SHOW TABLES").await?;
        // Some servers report the column as VARBINARY.
        rows.iter()
            .map(|row| {
                row.try_get::<Vec<u8>, _>(0)
                    .map(|name| String::from_utf8_lossy(&name).into_owned())
            })
            .collect()
    }

    async fn drop_table(&self, table: &str) -> Result<(), sqlx::Error> {
        self.execute_unprepared(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))
            .await
    }

    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<(), sqlx::Error> {
        let value = if enabled { 1 } else { 0 };
        self.execute_unprepared(&format!("SET FOREIGN_KEY_CHECKS = {}", value))
            .await
    }

    async fn count_rows(&self, table: &str) -> Result<i64, sqlx::Error> {
        let mut guard = self.conn.lock().await;
        let conn: &mut MySqlConnection = &mut guard;
        let row = conn
            .fetch_one(format!("SELECT COUNT(*) FROM {}", quote_identifier(table)).as_str())
            .await?;
        row.try_get::<i64, _>(0)
    }

    // CREATE, DROP and ALTER end the open transaction.
    fn transactional_ddl(&self) -> bool {
        false
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut guard = self.conn.lock().await;
        guard.ping().await
    }

    async fn begin(&self) -> Result<(), sqlx::Error> {
        self.execute_unprepared("START TRANSACTION").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_backticks() {
        assert_eq!(quote_identifier("users"), "`users`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }
}
