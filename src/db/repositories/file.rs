//! File metadata repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::FileRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use super::{opt_uuid_str, parse_opt_uuid, parse_uuid};

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn create(&self, record: &FileRecord) -> Result<FileRecord>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<FileRecord>>;
    /// Overwrite type, size and owner of an existing row
    async fn update(&self, record: &FileRecord) -> Result<()>;
    /// Returns `false` if there was no such row
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

pub struct SqlxFileRepository {
    pool: DynDatabasePool,
}

impl SqlxFileRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FileRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl FileRepository for SqlxFileRepository {
    async fn create(&self, record: &FileRecord) -> Result<FileRecord> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.sqlite()?, record).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.mysql()?, record).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<FileRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn update(&self, record: &FileRecord) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_sqlite(self.pool.sqlite()?, record).await,
            DatabaseDriver::Mysql => update_mysql(self.pool.mysql()?, record).await,
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_mysql(self.pool.mysql()?, id).await,
        }
    }
}

// SQLite implementations
async fn create_sqlite(pool: &SqlitePool, record: &FileRecord) -> Result<FileRecord> {
    sqlx::query("INSERT INTO files (id, content_type, size, user_id, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(record.id.to_string())
        .bind(&record.content_type)
        .bind(record.size)
        .bind(opt_uuid_str(record.user_id))
        .bind(record.created_at)
        .execute(pool)
        .await
        .context("Failed to create file record")?;
    Ok(record.clone())
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: Uuid) -> Result<Option<FileRecord>> {
    let row = sqlx::query("SELECT id, content_type, size, user_id, created_at FROM files WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get file record")?;
    row.map(|r| row_to_file_sqlite(&r)).transpose()
}

async fn update_sqlite(pool: &SqlitePool, record: &FileRecord) -> Result<()> {
    sqlx::query("UPDATE files SET content_type = ?, size = ?, user_id = ? WHERE id = ?")
        .bind(&record.content_type)
        .bind(record.size)
        .bind(opt_uuid_str(record.user_id))
        .bind(record.id.to_string())
        .execute(pool)
        .await
        .context("Failed to update file record")?;
    Ok(())
}

async fn delete_sqlite(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to delete file record")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_file_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<FileRecord> {
    let id: String = row.get("id");
    Ok(FileRecord {
        id: parse_uuid(&id)?,
        content_type: row.get("content_type"),
        size: row.get("size"),
        user_id: parse_opt_uuid(row.get("user_id"))?,
        created_at: row.get("created_at"),
    })
}

// MySQL implementations
async fn create_mysql(pool: &MySqlPool, record: &FileRecord) -> Result<FileRecord> {
    sqlx::query("INSERT INTO files (id, content_type, size, user_id, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(record.id.to_string())
        .bind(&record.content_type)
        .bind(record.size)
        .bind(opt_uuid_str(record.user_id))
        .bind(record.created_at)
        .execute(pool)
        .await
        .context("Failed to create file record")?;
    Ok(record.clone())
}

async fn get_by_id_mysql(pool: &MySqlPool, id: Uuid) -> Result<Option<FileRecord>> {
    let row = sqlx::query("SELECT id, content_type, size, user_id, created_at FROM files WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get file record")?;
    row.map(|r| row_to_file_mysql(&r)).transpose()
}

async fn update_mysql(pool: &MySqlPool, record: &FileRecord) -> Result<()> {
    sqlx::query("UPDATE files SET content_type = ?, size = ?, user_id = ? WHERE id = ?")
        .bind(&record.content_type)
        .bind(record.size)
        .bind(opt_uuid_str(record.user_id))
        .bind(record.id.to_string())
        .execute(pool)
        .await
        .context("Failed to update file record")?;
    Ok(())
}

async fn delete_mysql(pool: &MySqlPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to delete file record")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_file_mysql(row: &sqlx::mysql::MySqlRow) -> Result<FileRecord> {
    let id: String = row.get("id");
    Ok(FileRecord {
        id: parse_uuid(&id)?,
        content_type: row.get("content_type"),
        size: row.get("size"),
        user_id: parse_opt_uuid(row.get("user_id"))?,
        created_at: row.get("created_at"),
    })
}
