//! Content service
//!
//! Pages and their tags are read and written as a unit. Filtering runs
//! over the fully loaded list so that name and tag matching behave the
//! same on every database backend.

use anyhow::Context;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repositories::PageRepository;
use crate::models::{
    IconKind, Page, PageFilter, PageInput, PageTag, PAGE_CONTENT_MAX,
    PAGE_DESCRIPTION_MAX, PAGE_NAME_MAX, TAG_NAME_MAX,
};

#[derive(Debug, thiserror::Error)]
pub enum ContentServiceError {
    #[error("Page not found: {0}")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct ContentService {
    repo: Arc<dyn PageRepository>,
}

impl ContentService {
    pub fn new(repo: Arc<dyn PageRepository>) -> Self {
        Self { repo }
    }

    /// Pages matching `filter`, newest first. No filter lists everything.
    pub async fn list(&self, filter: Option<&PageFilter>) -> Result<Vec<Page>, ContentServiceError> {
        let pages = self.repo.list().await.context("Failed to list pages")?;
        Ok(match filter.filter(|f| !f.is_empty()) {
            Some(f) => pages.into_iter().filter(|p| f.matches(p)).collect(),
            None => pages,
        })
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Page, ContentServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get page")?
            .ok_or(ContentServiceError::NotFound(id))
    }

    /// Store a new page with its tags.
    ///
    /// A nil id is replaced with a fresh one and every tag row is pointed
    /// at the final id before anything is written.
    pub async fn create(&self, mut page: Page) -> Result<Page, ContentServiceError> {
        if page.id.is_nil() {
            page.id = Uuid::new_v4();
        }
        page.tags = dedupe_tag_rows(page.tags);
        page.reparent_tags();
        validate_page(&page)?;

        let created = self.repo.create(&page).await.context("Failed to create page")?;
        tracing::info!(page_id = %created.id, tags = created.tags.len(), "Page created");
        Ok(created)
    }

    /// Overwrite every editable field and replace the whole tag set.
    pub async fn update(&self, id: Uuid, input: PageInput) -> Result<Page, ContentServiceError> {
        let mut page = Page::from_input(input);
        page.id = id;
        page.updated_at = Utc::now();
        page.reparent_tags();
        validate_page(&page)?;

        let updated = self
            .repo
            .update(&page)
            .await
            .context("Failed to update page")?
            .ok_or(ContentServiceError::NotFound(id))?;
        tracing::info!(page_id = %id, tags = updated.tags.len(), "Page updated");
        Ok(updated)
    }

    /// Point one icon slot at `file_id`, keeping everything else.
    ///
    /// Returns the updated page and the file id the slot held before.
    pub async fn set_icon(
        &self,
        id: Uuid,
        kind: IconKind,
        file_id: Option<Uuid>,
    ) -> Result<(Page, Option<Uuid>), ContentServiceError> {
        let mut page = self.get_by_id(id).await?;
        let previous = kind.get(&page);
        kind.set(&mut page, file_id);
        page.updated_at = Utc::now();

        let updated = self
            .repo
            .update(&page)
            .await
            .context("Failed to update page icon")?
            .ok_or(ContentServiceError::NotFound(id))?;
        Ok((updated, previous))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ContentServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete page")? {
            return Err(ContentServiceError::NotFound(id));
        }
        tracing::info!(page_id = %id, "Page deleted");
        Ok(())
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool, ContentServiceError> {
        Ok(self.repo.exists(id).await.context("Failed to check page")?)
    }

    /// Every tag name in use, case-sensitive, in byte order
    pub async fn distinct_tags(&self) -> Result<Vec<String>, ContentServiceError> {
        Ok(self.repo.distinct_tags().await.context("Failed to list tags")?)
    }
}

/// Trim names and drop blank or repeated rows, keeping the first of each.
fn dedupe_tag_rows(tags: Vec<PageTag>) -> Vec<PageTag> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter_map(|mut tag| {
            tag.tag_name = tag.tag_name.trim().to_string();
            (!tag.tag_name.is_empty() && seen.insert(tag.tag_name.clone())).then_some(tag)
        })
        .collect()
}

fn validate_page(page: &Page) -> Result<(), ContentServiceError> {
    let name = page.name.trim();
    if name.is_empty() {
        return Err(ContentServiceError::Validation("Page name is required".to_string()));
    }
    check_len("Page name", name, PAGE_NAME_MAX)?;
    if let Some(description) = &page.description {
        check_len("Description", description, PAGE_DESCRIPTION_MAX)?;
    }
    if let Some(content) = &page.content {
        check_len("Content", content, PAGE_CONTENT_MAX)?;
    }
    for tag in &page.tags {
        check_len("Tag name", &tag.tag_name, TAG_NAME_MAX)?;
    }
    Ok(())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), ContentServiceError> {
    if value.chars().count() > max {
        return Err(ContentServiceError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxPageRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::normalize_tags;
    use proptest::prelude::*;

    async fn setup_test_service() -> (DynDatabasePool, ContentService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = ContentService::new(SqlxPageRepository::boxed(pool.clone()));
        (pool, service)
    }

    fn input(name: &str, tags: &[&str]) -> PageInput {
        PageInput {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn filter(name: Option<&str>, tag: Option<&str>) -> PageFilter {
        PageFilter {
            name: name.map(String::from),
            tag: tag.map(String::from),
        }
    }

    fn names(pages: &[Page]) -> Vec<String> {
        let mut names: Vec<_> = pages.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names
    }

    // ========================================================================
    // Create / read
    // ========================================================================

    #[tokio::test]
    async fn test_create_assigns_id_and_reparents_tags() {
        let (_pool, service) = setup_test_service().await;

        let page = service
            .create(Page::from_input(input("Mod", &["rpg", "co-op"])))
            .await
            .unwrap();

        assert!(!page.id.is_nil());
        assert_eq!(page.tags.len(), 2);
        assert!(page.tags.iter().all(|t| t.page_id == page.id));

        let loaded = service.get_by_id(page.id).await.unwrap();
        assert_eq!(loaded.tags, page.tags);
    }

    #[tokio::test]
    async fn test_create_keeps_explicit_id() {
        let (_pool, service) = setup_test_service().await;
        let mut page = Page::from_input(input("Mod", &["rpg"]));
        let id = Uuid::new_v4();
        page.id = id;

        let created = service.create(page).await.unwrap();
        assert_eq!(created.id, id);
        assert_eq!(created.tags[0].page_id, id);
    }

    #[tokio::test]
    async fn test_create_collapses_duplicate_tag_rows() {
        let (_pool, service) = setup_test_service().await;
        let mut page = Page::from_input(input("Mod", &[]));
        page.tags = vec![
            PageTag::new(Uuid::nil(), "rpg"),
            PageTag::new(Uuid::nil(), " rpg "),
            PageTag::new(Uuid::nil(), ""),
        ];

        let created = service.create(page).await.unwrap();
        assert_eq!(created.tag_names(), vec!["rpg"]);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (_pool, service) = setup_test_service().await;

        let blank = service.create(Page::from_input(input("   ", &[]))).await;
        assert!(matches!(blank, Err(ContentServiceError::Validation(_))));

        let long_name = service.create(Page::from_input(input(&"n".repeat(33), &[]))).await;
        assert!(matches!(long_name, Err(ContentServiceError::Validation(_))));

        let long_tag = "t".repeat(51);
        let long_tag = service.create(Page::from_input(input("ok", &[&long_tag]))).await;
        assert!(matches!(long_tag, Err(ContentServiceError::Validation(_))));

        let mut long_content = Page::from_input(input("ok", &[]));
        long_content.content = Some("c".repeat(2049));
        assert!(matches!(
            service.create(long_content).await,
            Err(ContentServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_pool, service) = setup_test_service().await;
        let result = service.get_by_id(Uuid::new_v4()).await;
        assert!(matches!(result, Err(ContentServiceError::NotFound(_))));
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    #[tokio::test]
    async fn test_list_filters() {
        let (_pool, service) = setup_test_service().await;
        service.create(Page::from_input(input("Fox Quest", &["RPG"]))).await.unwrap();
        service.create(Page::from_input(input("Wolf Run", &["racing"]))).await.unwrap();
        service.create(Page::from_input(input("Foxtrot", &["racing"]))).await.unwrap();

        let all = service.list(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let by_name = service.list(Some(&filter(Some("FOX"), None))).await.unwrap();
        assert_eq!(names(&by_name), vec!["Fox Quest", "Foxtrot"]);

        let by_tag = service.list(Some(&filter(None, Some("rpg")))).await.unwrap();
        assert_eq!(names(&by_tag), vec!["Fox Quest"]);

        let both = service.list(Some(&filter(Some("fox"), Some("rac")))).await.unwrap();
        assert_eq!(names(&both), vec!["Foxtrot"]);

        let blank = service.list(Some(&filter(Some(""), Some("")))).await.unwrap();
        assert_eq!(blank.len(), 3);
    }

    #[tokio::test]
    async fn test_list_loads_tags_for_every_page() {
        let (_pool, service) = setup_test_service().await;
        service.create(Page::from_input(input("A", &["x", "y"]))).await.unwrap();
        service.create(Page::from_input(input("B", &["z"]))).await.unwrap();

        for page in service.list(None).await.unwrap() {
            let expected = if page.name == "A" { 2 } else { 1 };
            assert_eq!(page.tags.len(), expected);
            assert!(page.tags.iter().all(|t| t.page_id == page.id));
        }
    }

    // ========================================================================
    // Update / delete
    // ========================================================================

    #[tokio::test]
    async fn test_update_replaces_fields_and_tags() {
        let (_pool, service) = setup_test_service().await;
        let page = service
            .create(Page::from_input(input("Old", &["a", "b"])))
            .await
            .unwrap();

        let mut new_input = input("New", &["b", "c"]);
        new_input.description = Some("desc".to_string());
        let updated = service.update(page.id, new_input).await.unwrap();

        assert_eq!(updated.name, "New");
        assert_eq!(updated.description.as_deref(), Some("desc"));
        let mut tags: Vec<_> = updated.tag_names().into_iter().map(String::from).collect();
        tags.sort();
        assert_eq!(tags, vec!["b", "c"]);
        assert_eq!(updated.created_at, page.created_at);
    }

    #[tokio::test]
    async fn test_update_with_no_tags_clears_them() {
        let (_pool, service) = setup_test_service().await;
        let page = service.create(Page::from_input(input("P", &["a"]))).await.unwrap();

        let updated = service.update(page.id, input("P", &[])).await.unwrap();
        assert!(updated.tags.is_empty());
        assert!(service.distinct_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (_pool, service) = setup_test_service().await;
        let result = service.update(Uuid::new_v4(), input("P", &[])).await;
        assert!(matches!(result, Err(ContentServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_icon_returns_previous() {
        let (_pool, service) = setup_test_service().await;
        let page = service.create(Page::from_input(input("P", &["keep"]))).await.unwrap();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let (_, previous) = service.set_icon(page.id, IconKind::Quad, Some(first)).await.unwrap();
        assert_eq!(previous, None);

        let (updated, previous) = service.set_icon(page.id, IconKind::Quad, Some(second)).await.unwrap();
        assert_eq!(previous, Some(first));
        assert_eq!(updated.quad_icon, Some(second));
        assert_eq!(updated.tag_names(), vec!["keep"]);
    }

    #[tokio::test]
    async fn test_delete_removes_page_and_tags() {
        let (pool, service) = setup_test_service().await;
        let page = service.create(Page::from_input(input("P", &["a", "b"]))).await.unwrap();

        service.delete(page.id).await.unwrap();

        assert!(!service.exists(page.id).await.unwrap());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM page_tags")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(matches!(
            service.delete(page.id).await,
            Err(ContentServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_distinct_tags_case_sensitive_and_sorted() {
        let (_pool, service) = setup_test_service().await;
        service.create(Page::from_input(input("A", &["rpg", "Zed"]))).await.unwrap();
        service.create(Page::from_input(input("B", &["RPG", "rpg"]))).await.unwrap();

        assert_eq!(service.distinct_tags().await.unwrap(), vec!["RPG", "Zed", "rpg"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Tags read back are exactly the normalised set that was written
        #[test]
        fn property_create_roundtrips_tag_set(tags in proptest::collection::vec("[a-zA-Z]{1,8}", 0..6)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (_pool, service) = setup_test_service().await;
                let page = service
                    .create(Page::from_input(PageInput {
                        name: "P".to_string(),
                        tags: tags.clone(),
                        ..Default::default()
                    }))
                    .await
                    .unwrap();

                let mut expected = normalize_tags(tags);
                expected.sort();
                let loaded = service.get_by_id(page.id).await.unwrap();
                let mut actual: Vec<_> = loaded.tag_names().into_iter().map(String::from).collect();
                actual.sort();
                assert_eq!(actual, expected);
            });
        }
    }
}
