//! Connection pools
//!
//! `DatabasePool` is what repositories and migrations hold. Repositories
//! branch on `driver()` and borrow the concrete sqlx pool through
//! `sqlite()` / `mysql()`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_MAX_CONNECTIONS: u32 = 20;
const MYSQL_MAX_CONNECTIONS: u32 = 30;
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Run a statement that returns no rows; yields the affected row count
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Round-trip a trivial query
    async fn ping(&self) -> Result<()>;

    /// Wait for checked-out connections to return, then close them all
    async fn close(&self);

    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// Like `as_sqlite`, but reports a driver mismatch as an error
    fn sqlite(&self) -> Result<&SqlitePool> {
        self.as_sqlite()
            .with_context(|| format!("Expected a SQLite pool, found {:?}", self.driver()))
    }

    /// Like `as_mysql`, but reports a driver mismatch as an error
    fn mysql(&self) -> Result<&MySqlPool> {
        self.as_mysql()
            .with_context(|| format!("Expected a MySQL pool, found {:?}", self.driver()))
    }
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// A sqlx pool for one of the supported drivers
pub enum SqlxDatabase {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
}

/// Where a SQLite URL points
#[derive(Debug, Clone, PartialEq, Eq)]
enum SqliteTarget {
    Memory,
    File(PathBuf),
}

/// Accepts `:memory:`, `sqlite::memory:`, `sqlite:path`, `sqlite://path`
/// or a bare path. Query parameters are ignored; the file is always
/// created when missing.
fn sqlite_target(url: &str) -> SqliteTarget {
    let url = url.trim();
    if url == ":memory:" || url.starts_with("sqlite::memory:") {
        return SqliteTarget::Memory;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    SqliteTarget::File(PathBuf::from(path))
}

fn mysql_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("mysql://") {
        url.to_string()
    } else {
        format!("mysql://{}", url)
    }
}

impl SqlxDatabase {
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        let pool = match sqlite_target(url) {
            SqliteTarget::Memory => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
                // Each in-memory connection is its own database: keep a
                // single connection open for the pool's whole lifetime.
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
            }
            SqliteTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory {}", parent.display())
                    })?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(SQLITE_BUSY_TIMEOUT);
                SqlitePoolOptions::new()
                    .max_connections(SQLITE_MAX_CONNECTIONS)
                    .connect_with(options)
                    .await
            }
        }
        .with_context(|| format!("Failed to open SQLite database {}", url))?;

        Ok(Self::Sqlite(pool))
    }

    pub async fn connect_mysql(url: &str) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(&mysql_url(url))
            .context("Invalid MySQL connection URL")?;
        let pool = MySqlPoolOptions::new()
            .max_connections(MYSQL_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to MySQL")?;
        Ok(Self::Mysql(pool))
    }
}

#[async_trait]
impl DatabasePool for SqlxDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let affected = match self {
            Self::Sqlite(pool) => sqlx::query(query).execute(pool).await?.rows_affected(),
            Self::Mysql(pool) => sqlx::query(query).execute(pool).await?.rows_affected(),
        };
        Ok(affected)
    }

    async fn ping(&self) -> Result<()> {
        match self {
            Self::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
            Self::Mysql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
        }
        .context("Database ping failed")
    }

    async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::Mysql(pool) => pool.close().await,
        }
    }

    fn driver(&self) -> DatabaseDriver {
        match self {
            Self::Sqlite(_) => DatabaseDriver::Sqlite,
            Self::Mysql(_) => DatabaseDriver::Mysql,
        }
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            Self::Sqlite(pool) => Some(pool),
            Self::Mysql(_) => None,
        }
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            Self::Mysql(pool) => Some(pool),
            Self::Sqlite(_) => None,
        }
    }
}

/// Open the configured database.
///
/// ```ignore
/// let pool = becore::db::create_pool(&config.database).await?;
/// pool.ping().await?;
/// ```
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let db = match config.driver {
        DatabaseDriver::Sqlite => SqlxDatabase::connect_sqlite(&config.url).await?,
        DatabaseDriver::Mysql => SqlxDatabase::connect_mysql(&config.url).await?,
    };
    Ok(Arc::new(db))
}

/// Fresh in-memory SQLite database, no migrations applied
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    Ok(Arc::new(SqlxDatabase::connect_sqlite(":memory:").await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_target_parsing() {
        assert_eq!(sqlite_target(":memory:"), SqliteTarget::Memory);
        assert_eq!(sqlite_target("sqlite::memory:"), SqliteTarget::Memory);
        assert_eq!(
            sqlite_target("sqlite:data/app.db?mode=rwc"),
            SqliteTarget::File(PathBuf::from("data/app.db"))
        );
        assert_eq!(
            sqlite_target("sqlite:///var/lib/becore.db"),
            SqliteTarget::File(PathBuf::from("/var/lib/becore.db"))
        );
        assert_eq!(
            sqlite_target("data/becore.db"),
            SqliteTarget::File(PathBuf::from("data/becore.db"))
        );
    }

    #[test]
    fn test_mysql_url_prefix() {
        assert_eq!(mysql_url("root@localhost/db"), "mysql://root@localhost/db");
        assert_eq!(mysql_url("mysql://root@localhost/db"), "mysql://root@localhost/db");
    }

    #[tokio::test]
    async fn test_memory_pool() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.sqlite().is_ok());
        assert!(pool.mysql().is_err());
        pool.ping().await.expect("Ping should succeed");
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_schema_between_queries() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        pool.execute("CREATE TABLE kept (id INTEGER PRIMARY KEY)")
            .await
            .expect("Failed to create table");
        for _ in 0..5 {
            let affected = pool
                .execute("INSERT INTO kept DEFAULT VALUES")
                .await
                .expect("Table should still exist");
            assert_eq!(affected, 1);
        }
    }

    #[tokio::test]
    async fn test_file_pool_creates_nested_directories() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("nested").join("dir").join("test.db");

        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: format!("sqlite:{}", db_path.display()),
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        pool.ping().await.expect("Ping should succeed");
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_queries() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        pool.close().await;
        assert!(pool.ping().await.is_err());
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server (MYSQL_TEST_URL)"]
    async fn test_mysql_pool() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/test".to_string());
        let config = DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
        };

        let pool = create_pool(&config).await.expect("Failed to create pool");
        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        assert!(pool.as_sqlite().is_none());
        pool.ping().await.expect("Ping should succeed");
    }
}
