//! Database layer
//!
//! Supports two backends behind one `DatabasePool` trait:
//! - SQLite (default, single-file deployments and tests)
//! - MySQL
//!
//! The driver is selected from `DatabaseConfig`; repositories branch on
//! `pool.driver()` and run backend-specific SQL.
//!
//! # Usage
//!
//! ```ignore
//! use becore::config::DatabaseConfig;
//! use becore::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool, SqlxDatabase};
