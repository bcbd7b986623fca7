//! Addon page repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AddonPage, AddonStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::{opt_uuid_str, parse_opt_uuid, parse_uuid};

#[async_trait]
pub trait AddonPageRepository: Send + Sync {
    async fn create(&self, page: &AddonPage) -> Result<AddonPage>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<AddonPage>>;
    /// All addon pages, optionally restricted to one status, newest first
    async fn list(&self, status: Option<AddonStatus>) -> Result<Vec<AddonPage>>;
    /// Returns the updated page, or `None` if it does not exist
    async fn set_status(&self, id: Uuid, status: AddonStatus) -> Result<Option<AddonPage>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

pub struct SqlxAddonPageRepository {
    pool: DynDatabasePool,
}

impl SqlxAddonPageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AddonPageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AddonPageRepository for SqlxAddonPageRepository {
    async fn create(&self, page: &AddonPage) -> Result<AddonPage> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.sqlite()?, page).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.mysql()?, page).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<AddonPage>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self, status: Option<AddonStatus>) -> Result<Vec<AddonPage>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sqlite(self.pool.sqlite()?, status).await,
            DatabaseDriver::Mysql => list_mysql(self.pool.mysql()?, status).await,
        }
    }

    async fn set_status(&self, id: Uuid, status: AddonStatus) -> Result<Option<AddonPage>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                set_status_sqlite(pool, id, status).await?;
                get_by_id_sqlite(pool, id).await
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                set_status_mysql(pool, id, status).await?;
                get_by_id_mysql(pool, id).await
            }
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_mysql(self.pool.mysql()?, id).await,
        }
    }
}

const SELECT_ADDON: &str = "SELECT id, name, description, quad_icon, wide_icon, status, team_id, owner_id, resolution, created_at, updated_at FROM addon_pages";

// SQLite implementations
async fn create_sqlite(pool: &SqlitePool, page: &AddonPage) -> Result<AddonPage> {
    sqlx::query(
        "INSERT INTO addon_pages (id, name, description, quad_icon, wide_icon, status, team_id, owner_id, resolution, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(page.id.to_string())
    .bind(&page.name)
    .bind(&page.description)
    .bind(opt_uuid_str(page.quad_icon))
    .bind(opt_uuid_str(page.wide_icon))
    .bind(page.status.to_string())
    .bind(opt_uuid_str(page.team_id))
    .bind(opt_uuid_str(page.owner_id))
    .bind(page.resolution.map(i64::from))
    .bind(page.created_at)
    .bind(page.updated_at)
    .execute(pool)
    .await
    .context("Failed to create addon page")?;
    Ok(page.clone())
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: Uuid) -> Result<Option<AddonPage>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ADDON))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get addon page")?;
    row.map(|r| row_to_addon_sqlite(&r)).transpose()
}

async fn list_sqlite(pool: &SqlitePool, status: Option<AddonStatus>) -> Result<Vec<AddonPage>> {
    let rows = match status {
        Some(status) => {
            sqlx::query(&format!("{} WHERE status = ? ORDER BY created_at DESC", SELECT_ADDON))
                .bind(status.to_string())
                .fetch_all(pool)
                .await
        }
        None => {
            sqlx::query(&format!("{} ORDER BY created_at DESC", SELECT_ADDON))
                .fetch_all(pool)
                .await
        }
    }
    .context("Failed to list addon pages")?;
    rows.iter().map(row_to_addon_sqlite).collect()
}

async fn set_status_sqlite(pool: &SqlitePool, id: Uuid, status: AddonStatus) -> Result<()> {
    sqlx::query("UPDATE addon_pages SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to update addon status")?;
    Ok(())
}

async fn delete_sqlite(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM addon_pages WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to delete addon page")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_addon_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<AddonPage> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let resolution: Option<i64> = row.get("resolution");
    Ok(AddonPage {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        description: row.get("description"),
        quad_icon: parse_opt_uuid(row.get("quad_icon"))?,
        wide_icon: parse_opt_uuid(row.get("wide_icon"))?,
        status: AddonStatus::from_str(&status).unwrap_or_default(),
        team_id: parse_opt_uuid(row.get("team_id"))?,
        owner_id: parse_opt_uuid(row.get("owner_id"))?,
        resolution: resolution.map(u32::try_from).transpose()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// MySQL implementations
async fn create_mysql(pool: &MySqlPool, page: &AddonPage) -> Result<AddonPage> {
    sqlx::query(
        "INSERT INTO addon_pages (id, name, description, quad_icon, wide_icon, status, team_id, owner_id, resolution, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(page.id.to_string())
    .bind(&page.name)
    .bind(&page.description)
    .bind(opt_uuid_str(page.quad_icon))
    .bind(opt_uuid_str(page.wide_icon))
    .bind(page.status.to_string())
    .bind(opt_uuid_str(page.team_id))
    .bind(opt_uuid_str(page.owner_id))
    .bind(page.resolution.map(i64::from))
    .bind(page.created_at)
    .bind(page.updated_at)
    .execute(pool)
    .await
    .context("Failed to create addon page")?;
    Ok(page.clone())
}

async fn get_by_id_mysql(pool: &MySqlPool, id: Uuid) -> Result<Option<AddonPage>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ADDON))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get addon page")?;
    row.map(|r| row_to_addon_mysql(&r)).transpose()
}

async fn list_mysql(pool: &MySqlPool, status: Option<AddonStatus>) -> Result<Vec<AddonPage>> {
    let rows = match status {
        Some(status) => {
            sqlx::query(&format!("{} WHERE status = ? ORDER BY created_at DESC", SELECT_ADDON))
                .bind(status.to_string())
                .fetch_all(pool)
                .await
        }
        None => {
            sqlx::query(&format!("{} ORDER BY created_at DESC", SELECT_ADDON))
                .fetch_all(pool)
                .await
        }
    }
    .context("Failed to list addon pages")?;
    rows.iter().map(row_to_addon_mysql).collect()
}

async fn set_status_mysql(pool: &MySqlPool, id: Uuid, status: AddonStatus) -> Result<()> {
    sqlx::query("UPDATE addon_pages SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to update addon status")?;
    Ok(())
}

async fn delete_mysql(pool: &MySqlPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM addon_pages WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to delete addon page")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_addon_mysql(row: &sqlx::mysql::MySqlRow) -> Result<AddonPage> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let resolution: Option<i64> = row.get("resolution");
    Ok(AddonPage {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        description: row.get("description"),
        quad_icon: parse_opt_uuid(row.get("quad_icon"))?,
        wide_icon: parse_opt_uuid(row.get("wide_icon"))?,
        status: AddonStatus::from_str(&status).unwrap_or_default(),
        team_id: parse_opt_uuid(row.get("team_id"))?,
        owner_id: parse_opt_uuid(row.get("owner_id"))?,
        resolution: resolution.map(u32::try_from).transpose()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxAddonPageRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxAddonPageRepository::new(pool)
    }

    fn addon(name: &str, status: AddonStatus) -> AddonPage {
        let now = Utc::now();
        AddonPage {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            quad_icon: None,
            wide_icon: None,
            status,
            team_id: None,
            owner_id: None,
            resolution: Some(64),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_test_repo().await;
        let page = repo.create(&addon("Shaders", AddonStatus::Draft)).await.unwrap();

        let found = repo.get_by_id(page.id).await.unwrap().expect("Addon not found");
        assert_eq!(found.name, "Shaders");
        assert_eq!(found.resolution, Some(64));
        assert_eq!(found.status, AddonStatus::Draft);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let repo = setup_test_repo().await;
        repo.create(&addon("A", AddonStatus::Draft)).await.unwrap();
        repo.create(&addon("B", AddonStatus::Published)).await.unwrap();

        assert_eq!(repo.list(None).await.unwrap().len(), 2);
        let published = repo.list(Some(AddonStatus::Published)).await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].name, "B");
    }

    #[tokio::test]
    async fn test_set_status_and_delete() {
        let repo = setup_test_repo().await;
        let page = repo.create(&addon("A", AddonStatus::Draft)).await.unwrap();

        let updated = repo
            .set_status(page.id, AddonStatus::Published)
            .await
            .unwrap()
            .expect("Addon should exist");
        assert_eq!(updated.status, AddonStatus::Published);

        assert!(repo.set_status(Uuid::new_v4(), AddonStatus::Draft).await.unwrap().is_none());

        assert!(repo.delete(page.id).await.unwrap());
        assert!(!repo.delete(page.id).await.unwrap());
    }
}
