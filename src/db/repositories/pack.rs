//! Pack repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Pack, PackType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::parse_uuid;

#[async_trait]
pub trait PackRepository: Send + Sync {
    async fn create(&self, pack: &Pack) -> Result<Pack>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Pack>>;
    /// Packs of one page, oldest first
    async fn list_by_page(&self, page_id: Uuid) -> Result<Vec<Pack>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

pub struct SqlxPackRepository {
    pool: DynDatabasePool,
}

impl SqlxPackRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PackRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PackRepository for SqlxPackRepository {
    async fn create(&self, pack: &Pack) -> Result<Pack> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.sqlite()?, pack).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.mysql()?, pack).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Pack>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list_by_page(&self, page_id: Uuid) -> Result<Vec<Pack>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_by_page_sqlite(self.pool.sqlite()?, page_id).await,
            DatabaseDriver::Mysql => list_by_page_mysql(self.pool.mysql()?, page_id).await,
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_mysql(self.pool.mysql()?, id).await,
        }
    }
}

const SELECT_PACK: &str = "SELECT id, page_id, name, description, pack_type, created_at FROM packs";

// SQLite implementations
async fn create_sqlite(pool: &SqlitePool, pack: &Pack) -> Result<Pack> {
    sqlx::query("INSERT INTO packs (id, page_id, name, description, pack_type, created_at) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(pack.id.to_string())
        .bind(pack.page_id.to_string())
        .bind(&pack.name)
        .bind(&pack.description)
        .bind(pack.pack_type.to_string())
        .bind(pack.created_at)
        .execute(pool)
        .await
        .context("Failed to create pack")?;
    Ok(pack.clone())
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: Uuid) -> Result<Option<Pack>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PACK))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get pack")?;
    row.map(|r| row_to_pack_sqlite(&r)).transpose()
}

async fn list_by_page_sqlite(pool: &SqlitePool, page_id: Uuid) -> Result<Vec<Pack>> {
    let rows = sqlx::query(&format!("{} WHERE page_id = ? ORDER BY created_at", SELECT_PACK))
        .bind(page_id.to_string())
        .fetch_all(pool)
        .await
        .context("Failed to list packs")?;
    rows.iter().map(row_to_pack_sqlite).collect()
}

async fn delete_sqlite(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM packs WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to delete pack")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_pack_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Pack> {
    let id: String = row.get("id");
    let page_id: String = row.get("page_id");
    let pack_type: String = row.get("pack_type");
    Ok(Pack {
        id: parse_uuid(&id)?,
        page_id: parse_uuid(&page_id)?,
        name: row.get("name"),
        description: row.get("description"),
        pack_type: PackType::from_str(&pack_type).unwrap_or_default(),
        created_at: row.get("created_at"),
    })
}

// MySQL implementations
async fn create_mysql(pool: &MySqlPool, pack: &Pack) -> Result<Pack> {
    sqlx::query("INSERT INTO packs (id, page_id, name, description, pack_type, created_at) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(pack.id.to_string())
        .bind(pack.page_id.to_string())
        .bind(&pack.name)
        .bind(&pack.description)
        .bind(pack.pack_type.to_string())
        .bind(pack.created_at)
        .execute(pool)
        .await
        .context("Failed to create pack")?;
    Ok(pack.clone())
}

async fn get_by_id_mysql(pool: &MySqlPool, id: Uuid) -> Result<Option<Pack>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PACK))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get pack")?;
    row.map(|r| row_to_pack_mysql(&r)).transpose()
}

async fn list_by_page_mysql(pool: &MySqlPool, page_id: Uuid) -> Result<Vec<Pack>> {
    let rows = sqlx::query(&format!("{} WHERE page_id = ? ORDER BY created_at", SELECT_PACK))
        .bind(page_id.to_string())
        .fetch_all(pool)
        .await
        .context("Failed to list packs")?;
    rows.iter().map(row_to_pack_mysql).collect()
}

async fn delete_mysql(pool: &MySqlPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM packs WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to delete pack")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_pack_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Pack> {
    let id: String = row.get("id");
    let page_id: String = row.get("page_id");
    let pack_type: String = row.get("pack_type");
    Ok(Pack {
        id: parse_uuid(&id)?,
        page_id: parse_uuid(&page_id)?,
        name: row.get("name"),
        description: row.get("description"),
        pack_type: PackType::from_str(&pack_type).unwrap_or_default(),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Utc;

    async fn setup() -> (DynDatabasePool, SqlxPackRepository, Uuid) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let page_id = Uuid::new_v4();
        sqlx::query("INSERT INTO pages (id, name) VALUES (?, 'Host')")
            .bind(page_id.to_string())
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        let repo = SqlxPackRepository::new(pool.clone());
        (pool, repo, page_id)
    }

    fn pack(page_id: Uuid, name: &str, pack_type: PackType) -> Pack {
        Pack {
            id: Uuid::new_v4(),
            page_id,
            name: name.to_string(),
            description: None,
            pack_type,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let (_pool, repo, page_id) = setup().await;
        let scripts = repo.create(&pack(page_id, "Scripts", PackType::Script)).await.unwrap();
        repo.create(&pack(page_id, "Textures", PackType::Resources)).await.unwrap();

        let packs = repo.list_by_page(page_id).await.unwrap();
        assert_eq!(packs.len(), 2);
        assert!(packs.iter().any(|p| p.pack_type == PackType::Script));

        assert!(repo.delete(scripts.id).await.unwrap());
        assert!(repo.get_by_id(scripts.id).await.unwrap().is_none());
        assert_eq!(repo.list_by_page(page_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_packs_follow_page_deletion() {
        let (pool, repo, page_id) = setup().await;
        repo.create(&pack(page_id, "Data", PackType::Data)).await.unwrap();

        sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(page_id.to_string())
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        assert!(repo.list_by_page(page_id).await.unwrap().is_empty());
    }
}
