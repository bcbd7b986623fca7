//! Page repository
//!
//! Pages are always read together with their tag rows. Writes that touch
//! both tables run in a single transaction.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Page, PageTag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::{opt_uuid_str, parse_opt_uuid, parse_uuid};

#[async_trait]
pub trait PageRepository: Send + Sync {
    /// Insert the page and its tags; the page must already carry its final id.
    async fn create(&self, page: &Page) -> Result<Page>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Page>>;
    /// Every page with tags, newest first
    async fn list(&self) -> Result<Vec<Page>>;
    /// Overwrite the page row and replace its whole tag set.
    /// Returns `None` if the page does not exist.
    async fn update(&self, page: &Page) -> Result<Option<Page>>;
    /// Returns `false` if nothing was deleted
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn exists(&self, id: Uuid) -> Result<bool>;
    /// Distinct tag names across all pages, case-sensitive, in byte order
    async fn distinct_tags(&self) -> Result<Vec<String>>;
}

pub struct SqlxPageRepository {
    pool: DynDatabasePool,
}

impl SqlxPageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PageRepository for SqlxPageRepository {
    async fn create(&self, page: &Page) -> Result<Page> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.sqlite()?, page).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.mysql()?, page).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Page>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self) -> Result<Vec<Page>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_mysql(self.pool.mysql()?).await,
        }
    }

    async fn update(&self, page: &Page) -> Result<Option<Page>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_sqlite(self.pool.sqlite()?, page).await,
            DatabaseDriver::Mysql => update_mysql(self.pool.mysql()?, page).await,
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => exists_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => exists_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn distinct_tags(&self) -> Result<Vec<String>> {
        let names = match self.pool.driver() {
            DatabaseDriver::Sqlite => tag_names_sqlite(self.pool.sqlite()?).await?,
            DatabaseDriver::Mysql => tag_names_mysql(self.pool.mysql()?).await?,
        };
        // Dedup in Rust: SQL DISTINCT/ORDER BY follow the column collation.
        Ok(names.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
    }
}

const SELECT_PAGE: &str = "SELECT id, name, description, content, quad_icon, wide_icon, file, created_at, updated_at FROM pages";

/// Attach grouped tag rows to their pages
fn attach_tags(pages: &mut [Page], tags: Vec<PageTag>) {
    let mut by_page: HashMap<Uuid, Vec<PageTag>> = HashMap::new();
    for tag in tags {
        by_page.entry(tag.page_id).or_default().push(tag);
    }
    for page in pages {
        page.tags = by_page.remove(&page.id).unwrap_or_default();
    }
}

// SQLite implementations
async fn create_sqlite(pool: &SqlitePool, page: &Page) -> Result<Page> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        "INSERT INTO pages (id, name, description, content, quad_icon, wide_icon, file, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(page.id.to_string())
    .bind(&page.name)
    .bind(&page.description)
    .bind(&page.content)
    .bind(opt_uuid_str(page.quad_icon))
    .bind(opt_uuid_str(page.wide_icon))
    .bind(opt_uuid_str(page.file))
    .bind(page.created_at)
    .bind(page.updated_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create page")?;

    insert_tags_sqlite(&mut tx, page.id, &page.tags).await?;
    tx.commit().await.context("Failed to commit page")?;

    get_by_id_sqlite(pool, page.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Page not found after create"))
}

async fn insert_tags_sqlite(conn: &mut SqliteConnection, page_id: Uuid, tags: &[PageTag]) -> Result<()> {
    for tag in tags {
        sqlx::query("INSERT INTO page_tags (id, page_id, tag_name) VALUES (?, ?, ?)")
            .bind(tag.id.to_string())
            .bind(page_id.to_string())
            .bind(&tag.tag_name)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to add tag '{}'", tag.tag_name))?;
    }
    Ok(())
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: Uuid) -> Result<Option<Page>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PAGE))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get page")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut page = row_to_page_sqlite(&row)?;

    let tag_rows = sqlx::query("SELECT id, page_id, tag_name FROM page_tags WHERE page_id = ? ORDER BY tag_name")
        .bind(id.to_string())
        .fetch_all(pool)
        .await
        .context("Failed to load page tags")?;
    page.tags = tag_rows.iter().map(row_to_tag_sqlite).collect::<Result<_>>()?;

    Ok(Some(page))
}

async fn list_sqlite(pool: &SqlitePool) -> Result<Vec<Page>> {
    let rows = sqlx::query(&format!("{} ORDER BY created_at DESC, name", SELECT_PAGE))
        .fetch_all(pool)
        .await
        .context("Failed to list pages")?;
    let mut pages = rows.iter().map(row_to_page_sqlite).collect::<Result<Vec<_>>>()?;

    let tag_rows = sqlx::query("SELECT id, page_id, tag_name FROM page_tags ORDER BY tag_name")
        .fetch_all(pool)
        .await
        .context("Failed to load page tags")?;
    let tags = tag_rows.iter().map(row_to_tag_sqlite).collect::<Result<Vec<_>>>()?;

    attach_tags(&mut pages, tags);
    Ok(pages)
}

async fn update_sqlite(pool: &SqlitePool, page: &Page) -> Result<Option<Page>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let exists = sqlx::query("SELECT COUNT(*) AS count FROM pages WHERE id = ?")
        .bind(page.id.to_string())
        .fetch_one(&mut *tx)
        .await?
        .get::<i64, _>("count")
        > 0;
    if !exists {
        return Ok(None);
    }

    sqlx::query(
        "UPDATE pages SET name = ?, description = ?, content = ?, quad_icon = ?, wide_icon = ?, file = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&page.name)
    .bind(&page.description)
    .bind(&page.content)
    .bind(opt_uuid_str(page.quad_icon))
    .bind(opt_uuid_str(page.wide_icon))
    .bind(opt_uuid_str(page.file))
    .bind(page.updated_at)
    .bind(page.id.to_string())
    .execute(&mut *tx)
    .await
    .context("Failed to update page")?;

    sqlx::query("DELETE FROM page_tags WHERE page_id = ?")
        .bind(page.id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to clear page tags")?;
    insert_tags_sqlite(&mut tx, page.id, &page.tags).await?;

    tx.commit().await.context("Failed to commit page update")?;
    get_by_id_sqlite(pool, page.id).await
}

async fn delete_sqlite(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    sqlx::query("DELETE FROM page_tags WHERE page_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to delete page tags")?;
    let result = sqlx::query("DELETE FROM pages WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to delete page")?;
    tx.commit().await.context("Failed to commit page delete")?;
    Ok(result.rows_affected() > 0)
}

async fn exists_sqlite(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM pages WHERE id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn tag_names_sqlite(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT tag_name FROM page_tags")
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;
    Ok(rows.iter().map(|r| r.get("tag_name")).collect())
}

fn row_to_page_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Page> {
    let id: String = row.get("id");
    Ok(Page {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        description: row.get("description"),
        content: row.get("content"),
        quad_icon: parse_opt_uuid(row.get("quad_icon"))?,
        wide_icon: parse_opt_uuid(row.get("wide_icon"))?,
        file: parse_opt_uuid(row.get("file"))?,
        tags: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<PageTag> {
    let id: String = row.get("id");
    let page_id: String = row.get("page_id");
    Ok(PageTag {
        id: parse_uuid(&id)?,
        page_id: parse_uuid(&page_id)?,
        tag_name: row.get("tag_name"),
    })
}

// MySQL implementations
async fn create_mysql(pool: &MySqlPool, page: &Page) -> Result<Page> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        "INSERT INTO pages (id, name, description, content, quad_icon, wide_icon, file, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(page.id.to_string())
    .bind(&page.name)
    .bind(&page.description)
    .bind(&page.content)
    .bind(opt_uuid_str(page.quad_icon))
    .bind(opt_uuid_str(page.wide_icon))
    .bind(opt_uuid_str(page.file))
    .bind(page.created_at)
    .bind(page.updated_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create page")?;

    insert_tags_mysql(&mut tx, page.id, &page.tags).await?;
    tx.commit().await.context("Failed to commit page")?;

    get_by_id_mysql(pool, page.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Page not found after create"))
}

async fn insert_tags_mysql(conn: &mut MySqlConnection, page_id: Uuid, tags: &[PageTag]) -> Result<()> {
    for tag in tags {
        sqlx::query("INSERT INTO page_tags (id, page_id, tag_name) VALUES (?, ?, ?)")
            .bind(tag.id.to_string())
            .bind(page_id.to_string())
            .bind(&tag.tag_name)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to add tag '{}'", tag.tag_name))?;
    }
    Ok(())
}

async fn get_by_id_mysql(pool: &MySqlPool, id: Uuid) -> Result<Option<Page>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PAGE))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get page")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut page = row_to_page_mysql(&row)?;

    let tag_rows = sqlx::query("SELECT id, page_id, tag_name FROM page_tags WHERE page_id = ? ORDER BY tag_name")
        .bind(id.to_string())
        .fetch_all(pool)
        .await
        .context("Failed to load page tags")?;
    page.tags = tag_rows.iter().map(row_to_tag_mysql).collect::<Result<_>>()?;

    Ok(Some(page))
}

async fn list_mysql(pool: &MySqlPool) -> Result<Vec<Page>> {
    let rows = sqlx::query(&format!("{} ORDER BY created_at DESC, name", SELECT_PAGE))
        .fetch_all(pool)
        .await
        .context("Failed to list pages")?;
    let mut pages = rows.iter().map(row_to_page_mysql).collect::<Result<Vec<_>>>()?;

    let tag_rows = sqlx::query("SELECT id, page_id, tag_name FROM page_tags ORDER BY tag_name")
        .fetch_all(pool)
        .await
        .context("Failed to load page tags")?;
    let tags = tag_rows.iter().map(row_to_tag_mysql).collect::<Result<Vec<_>>>()?;

    attach_tags(&mut pages, tags);
    Ok(pages)
}

async fn update_mysql(pool: &MySqlPool, page: &Page) -> Result<Option<Page>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let exists = sqlx::query("SELECT COUNT(*) AS count FROM pages WHERE id = ? FOR UPDATE")
        .bind(page.id.to_string())
        .fetch_one(&mut *tx)
        .await?
        .get::<i64, _>("count")
        > 0;
    if !exists {
        return Ok(None);
    }

    sqlx::query(
        "UPDATE pages SET name = ?, description = ?, content = ?, quad_icon = ?, wide_icon = ?, file = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&page.name)
    .bind(&page.description)
    .bind(&page.content)
    .bind(opt_uuid_str(page.quad_icon))
    .bind(opt_uuid_str(page.wide_icon))
    .bind(opt_uuid_str(page.file))
    .bind(page.updated_at)
    .bind(page.id.to_string())
    .execute(&mut *tx)
    .await
    .context("Failed to update page")?;

    sqlx::query("DELETE FROM page_tags WHERE page_id = ?")
        .bind(page.id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to clear page tags")?;
    insert_tags_mysql(&mut tx, page.id, &page.tags).await?;

    tx.commit().await.context("Failed to commit page update")?;
    get_by_id_mysql(pool, page.id).await
}

async fn delete_mysql(pool: &MySqlPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    sqlx::query("DELETE FROM page_tags WHERE page_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to delete page tags")?;
    let result = sqlx::query("DELETE FROM pages WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to delete page")?;
    tx.commit().await.context("Failed to commit page delete")?;
    Ok(result.rows_affected() > 0)
}

async fn exists_mysql(pool: &MySqlPool, id: Uuid) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM pages WHERE id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("count") > 0)
}

async fn tag_names_mysql(pool: &MySqlPool) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT tag_name FROM page_tags")
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;
    Ok(rows.iter().map(|r| r.get("tag_name")).collect())
}

fn row_to_page_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Page> {
    let id: String = row.get("id");
    Ok(Page {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        description: row.get("description"),
        content: row.get("content"),
        quad_icon: parse_opt_uuid(row.get("quad_icon"))?,
        wide_icon: parse_opt_uuid(row.get("wide_icon"))?,
        file: parse_opt_uuid(row.get("file"))?,
        tags: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Result<PageTag> {
    let id: String = row.get("id");
    let page_id: String = row.get("page_id");
    Ok(PageTag {
        id: parse_uuid(&id)?,
        page_id: parse_uuid(&page_id)?,
        tag_name: row.get("tag_name"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::PageInput;

    async fn setup_test_repo() -> SqlxPageRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxPageRepository::new(pool)
    }

    fn new_page(name: &str, tags: &[&str]) -> Page {
        let mut page = Page::from_input(PageInput {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        });
        page.id = Uuid::new_v4();
        page.reparent_tags();
        page
    }

    fn sorted_tags(page: &Page) -> Vec<String> {
        let mut tags: Vec<String> = page.tags.iter().map(|t| t.tag_name.clone()).collect();
        tags.sort();
        tags
    }

    #[tokio::test]
    async fn test_create_and_get_with_tags() {
        let repo = setup_test_repo().await;
        let mut page = new_page("Red Fox", &["rpg", "forest"]);
        page.file = Some(Uuid::new_v4());

        let created = repo.create(&page).await.expect("Failed to create page");
        assert_eq!(created.id, page.id);
        assert_eq!(created.file, page.file);
        assert_eq!(sorted_tags(&created), vec!["forest", "rpg"]);

        let found = repo.get_by_id(page.id).await.unwrap().expect("Page not found");
        assert_eq!(found.name, "Red Fox");
        assert!(found.tags.iter().all(|t| t.page_id == page.id));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = setup_test_repo().await;
        assert!(repo.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(!repo.exists(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_attaches_tags_to_each_page() {
        let repo = setup_test_repo().await;
        let a = repo.create(&new_page("A", &["x"])).await.unwrap();
        let b = repo.create(&new_page("B", &["y", "z"])).await.unwrap();
        repo.create(&new_page("C", &[])).await.unwrap();

        let pages = repo.list().await.unwrap();
        assert_eq!(pages.len(), 3);

        let by_id: HashMap<Uuid, &Page> = pages.iter().map(|p| (p.id, p)).collect();
        assert_eq!(sorted_tags(by_id[&a.id]), vec!["x"]);
        assert_eq!(sorted_tags(by_id[&b.id]), vec!["y", "z"]);
    }

    #[tokio::test]
    async fn test_update_replaces_tag_set() {
        let repo = setup_test_repo().await;
        let mut page = repo.create(&new_page("Page", &["a", "b"])).await.unwrap();

        page.name = "Renamed".to_string();
        page.tags = vec![PageTag::new(page.id, "b"), PageTag::new(page.id, "c")];

        let updated = repo.update(&page).await.unwrap().expect("Page should exist");
        assert_eq!(updated.name, "Renamed");
        assert_eq!(sorted_tags(&updated), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let repo = setup_test_repo().await;
        let page = new_page("Ghost", &["a"]);
        assert!(repo.update(&page).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_page_and_tags() {
        let repo = setup_test_repo().await;
        let page = repo.create(&new_page("Doomed", &["a"])).await.unwrap();

        assert!(repo.delete(page.id).await.unwrap());
        assert!(repo.get_by_id(page.id).await.unwrap().is_none());
        assert!(repo.distinct_tags().await.unwrap().is_empty());

        assert!(!repo.delete(page.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_distinct_tags_case_sensitive_sorted() {
        let repo = setup_test_repo().await;
        repo.create(&new_page("A", &["rpg", "RPG", "co-op"])).await.unwrap();
        repo.create(&new_page("B", &["rpg", "action"])).await.unwrap();

        let tags = repo.distinct_tags().await.unwrap();
        assert_eq!(tags, vec!["RPG", "action", "co-op", "rpg"]);
    }
}
