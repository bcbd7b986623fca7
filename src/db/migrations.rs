//! Database migrations module
//!
//! Code-based migrations embedded directly in the binary as SQL strings,
//! with one variant for SQLite and one for MySQL.
//!
//! # Usage
//!
//! ```ignore
//! use becore::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Identifiers are UUIDs stored as `VARCHAR(36)` text in both dialects.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id VARCHAR(36) PRIMARY KEY,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(100) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_login_at TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id VARCHAR(36) PRIMARY KEY,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(100) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                last_login_at TIMESTAMP NULL
            );
        "#,
    },
    // Metadata half of a stored object; the payload lives at `files/{id}`
    Migration {
        version: 2,
        name: "create_files",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS files (
                id VARCHAR(36) PRIMARY KEY,
                content_type VARCHAR(255),
                size BIGINT NOT NULL DEFAULT 0,
                user_id VARCHAR(36),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_user_id ON files(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS files (
                id VARCHAR(36) PRIMARY KEY,
                content_type VARCHAR(255),
                size BIGINT NOT NULL DEFAULT 0,
                user_id VARCHAR(36),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_files_user_id ON files(user_id);
        "#,
    },
    Migration {
        version: 3,
        name: "create_pages",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS pages (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(32) NOT NULL,
                description VARCHAR(256),
                content VARCHAR(2048),
                quad_icon VARCHAR(36),
                wide_icon VARCHAR(36),
                file VARCHAR(36),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_pages_name ON pages(name);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS pages (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(32) NOT NULL,
                description VARCHAR(256),
                content VARCHAR(2048),
                quad_icon VARCHAR(36),
                wide_icon VARCHAR(36),
                file VARCHAR(36),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_pages_name ON pages(name);
        "#,
    },
    // One row per (page, tag name); rows die with their page.
    // Tag names compare case-sensitively in both dialects.
    Migration {
        version: 4,
        name: "create_page_tags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS page_tags (
                id VARCHAR(36) PRIMARY KEY,
                page_id VARCHAR(36) NOT NULL,
                tag_name VARCHAR(50) NOT NULL,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE,
                UNIQUE (page_id, tag_name)
            );
            CREATE INDEX IF NOT EXISTS idx_page_tags_page_id ON page_tags(page_id);
            CREATE INDEX IF NOT EXISTS idx_page_tags_tag_name ON page_tags(tag_name);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS page_tags (
                id VARCHAR(36) PRIMARY KEY,
                page_id VARCHAR(36) NOT NULL,
                tag_name VARCHAR(50) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE,
                UNIQUE KEY uq_page_tags_page_tag (page_id, tag_name)
            );
            CREATE INDEX idx_page_tags_tag_name ON page_tags(tag_name);
        "#,
    },
    Migration {
        version: 5,
        name: "create_packs",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS packs (
                id VARCHAR(36) PRIMARY KEY,
                page_id VARCHAR(36) NOT NULL,
                name VARCHAR(32) NOT NULL,
                description VARCHAR(256),
                pack_type VARCHAR(20) NOT NULL DEFAULT 'addition',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_packs_page_id ON packs(page_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS packs (
                id VARCHAR(36) PRIMARY KEY,
                page_id VARCHAR(36) NOT NULL,
                name VARCHAR(32) NOT NULL,
                description VARCHAR(256),
                pack_type VARCHAR(20) NOT NULL DEFAULT 'addition',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
            );
        "#,
    },
    // A content maker belongs to at most one team, so membership is keyed by maker
    Migration {
        version: 6,
        name: "create_teams",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS content_makers (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS teams (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(32) NOT NULL,
                description VARCHAR(1024),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS team_members (
                maker_id VARCHAR(36) PRIMARY KEY,
                team_id VARCHAR(36) NOT NULL,
                position VARCHAR(20) NOT NULL DEFAULT 'guest',
                joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (maker_id) REFERENCES content_makers(id) ON DELETE CASCADE,
                FOREIGN KEY (team_id) REFERENCES teams(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_team_members_team_id ON team_members(team_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS content_makers (
                id VARCHAR(36) PRIMARY KEY,
                user_id VARCHAR(36) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS teams (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(32) NOT NULL,
                description VARCHAR(1024),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS team_members (
                maker_id VARCHAR(36) PRIMARY KEY,
                team_id VARCHAR(36) NOT NULL,
                position VARCHAR(20) NOT NULL DEFAULT 'guest',
                joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (maker_id) REFERENCES content_makers(id) ON DELETE CASCADE,
                FOREIGN KEY (team_id) REFERENCES teams(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 7,
        name: "create_addon_pages",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS addon_pages (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(32) NOT NULL,
                description VARCHAR(1024),
                quad_icon VARCHAR(36),
                wide_icon VARCHAR(36),
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                team_id VARCHAR(36),
                owner_id VARCHAR(36),
                resolution INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (team_id) REFERENCES teams(id) ON DELETE SET NULL,
                FOREIGN KEY (owner_id) REFERENCES content_makers(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_addon_pages_status ON addon_pages(status);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS addon_pages (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(32) NOT NULL,
                description VARCHAR(1024),
                quad_icon VARCHAR(36),
                wide_icon VARCHAR(36),
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                team_id VARCHAR(36),
                owner_id VARCHAR(36),
                resolution BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (team_id) REFERENCES teams(id) ON DELETE SET NULL,
                FOREIGN KEY (owner_id) REFERENCES content_makers(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_addon_pages_status ON addon_pages(status);
        "#,
    },
];

/// Run all pending migrations
///
/// Creates the tracking table if needed, then applies every migration whose
/// version is not yet recorded, in order.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(applied.len() == MIGRATIONS.len())
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}
