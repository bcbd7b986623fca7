//! User repository
//!
//! Username and email lookups are case-insensitive in both dialects.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use super::parse_uuid;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Record a successful sign-in
    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_sqlite(self.pool.sqlite()?, "id = ?", &id.to_string()).await,
            DatabaseDriver::Mysql => get_user_mysql(self.pool.mysql()?, "id = ?", &id.to_string()).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_sqlite(self.pool.sqlite()?, "LOWER(username) = LOWER(?)", username).await
            }
            DatabaseDriver::Mysql => {
                get_user_mysql(self.pool.mysql()?, "LOWER(username) = LOWER(?)", username).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_sqlite(self.pool.sqlite()?, "LOWER(email) = LOWER(?)", email).await
            }
            DatabaseDriver::Mysql => {
                get_user_mysql(self.pool.mysql()?, "LOWER(email) = LOWER(?)", email).await
            }
        }
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => touch_last_login_sqlite(self.pool.sqlite()?, id, at).await,
            DatabaseDriver::Mysql => touch_last_login_mysql(self.pool.mysql()?, id, at).await,
        }
    }
}

const SELECT_USER: &str = "SELECT id, username, email, password_hash, is_active, created_at, updated_at, last_login_at FROM users";

// SQLite implementations
async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, is_active, created_at, updated_at, last_login_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.id.to_string())
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .bind(user.last_login_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;
    Ok(user.clone())
}

/// `predicate` is a fixed WHERE fragment with a single placeholder
async fn get_user_sqlite(pool: &SqlitePool, predicate: &str, value: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE {}", SELECT_USER, predicate))
        .bind(value)
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;
    row.map(|r| row_to_user_sqlite(&r)).transpose()
}

async fn touch_last_login_sqlite(pool: &SqlitePool, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to update last login")?;
    Ok(())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let id: String = row.get("id");
    Ok(User {
        id: parse_uuid(&id)?,
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login_at: row.get("last_login_at"),
    })
}

// MySQL implementations
async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, is_active, created_at, updated_at, last_login_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.id.to_string())
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .bind(user.last_login_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;
    Ok(user.clone())
}

async fn get_user_mysql(pool: &MySqlPool, predicate: &str, value: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE {}", SELECT_USER, predicate))
        .bind(value)
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;
    row.map(|r| row_to_user_mysql(&r)).transpose()
}

async fn touch_last_login_mysql(pool: &MySqlPool, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to update last login")?;
    Ok(())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let id: String = row.get("id");
    Ok(User {
        id: parse_uuid(&id)?,
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login_at: row.get("last_login_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_user(username: &str, email: &str) -> User {
        User::new(username.to_string(), email.to_string(), "hash".to_string())
    }

    #[tokio::test]
    async fn test_create_and_get_by_id() {
        let (_pool, repo) = setup_test_repo().await;
        let user = create_test_user("testuser", "test@example.com");

        repo.create(&user).await.expect("Failed to create user");
        let found = repo
            .get_by_id(user.id)
            .await
            .expect("Failed to get user")
            .expect("User not found");

        assert_eq!(found.username, "testuser");
        assert!(found.is_active);
        assert!(found.last_login_at.is_none());
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let (_pool, repo) = setup_test_repo().await;
        let user = create_test_user("TestUser", "Test@Example.com");
        repo.create(&user).await.unwrap();

        assert!(repo.get_by_username("testuser").await.unwrap().is_some());
        assert!(repo.get_by_email("test@example.COM").await.unwrap().is_some());
        assert!(repo.get_by_username("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_user("dup", "a@example.com")).await.unwrap();

        let result = repo.create(&create_test_user("dup", "b@example.com")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_touch_last_login() {
        let (_pool, repo) = setup_test_repo().await;
        let user = create_test_user("testuser", "test@example.com");
        repo.create(&user).await.unwrap();

        let at = Utc::now();
        repo.touch_last_login(user.id, at).await.unwrap();

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.last_login_at.map(|t| t.timestamp()), Some(at.timestamp()));
    }
}
