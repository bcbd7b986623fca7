//! Catalog service
//!
//! Packs attached to pages, content makers and their teams, and
//! community addon pages.

use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repositories::{
    AddonPageRepository, PackRepository, PageRepository, TeamRepository, UserRepository,
};
use crate::models::{
    normalize_resolution, AddonPage, AddonPageInput, AddonStatus, ContentMaker, MemberPosition,
    Pack, PackInput, Team, TeamInput, TeamMember, TeamWithMembers, LONG_DESCRIPTION_MAX,
    MAX_RESOLUTION, PAGE_DESCRIPTION_MAX, PAGE_NAME_MAX,
};

#[derive(Debug, thiserror::Error)]
pub enum CatalogServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn not_found(entity: &str, id: Uuid) -> CatalogServiceError {
    CatalogServiceError::NotFound(format!("{} {}", entity, id))
}

pub struct CatalogService {
    pages: Arc<dyn PageRepository>,
    packs: Arc<dyn PackRepository>,
    teams: Arc<dyn TeamRepository>,
    addons: Arc<dyn AddonPageRepository>,
    users: Arc<dyn UserRepository>,
}

impl CatalogService {
    pub fn new(
        pages: Arc<dyn PageRepository>,
        packs: Arc<dyn PackRepository>,
        teams: Arc<dyn TeamRepository>,
        addons: Arc<dyn AddonPageRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            pages,
            packs,
            teams,
            addons,
            users,
        }
    }

    // ========================================================================
    // Packs
    // ========================================================================

    pub async fn create_pack(&self, page_id: Uuid, input: PackInput) -> Result<Pack, CatalogServiceError> {
        validate_name(&input.name)?;
        validate_description(input.description.as_deref(), PAGE_DESCRIPTION_MAX)?;

        if !self.pages.exists(page_id).await.context("Failed to check page")? {
            return Err(not_found("Page", page_id));
        }

        let pack = Pack {
            id: Uuid::new_v4(),
            page_id,
            name: input.name.trim().to_string(),
            description: input.description,
            pack_type: input.pack_type,
            created_at: Utc::now(),
        };
        let pack = self.packs.create(&pack).await.context("Failed to create pack")?;
        tracing::info!(pack_id = %pack.id, page_id = %page_id, "Pack created");
        Ok(pack)
    }

    pub async fn list_packs(&self, page_id: Uuid) -> Result<Vec<Pack>, CatalogServiceError> {
        Ok(self
            .packs
            .list_by_page(page_id)
            .await
            .context("Failed to list packs")?)
    }

    pub async fn delete_pack(&self, id: Uuid) -> Result<(), CatalogServiceError> {
        if !self.packs.delete(id).await.context("Failed to delete pack")? {
            return Err(not_found("Pack", id));
        }
        Ok(())
    }

    // ========================================================================
    // Content makers and teams
    // ========================================================================

    /// The maker row of a user, created on first use
    pub async fn ensure_content_maker(&self, user_id: Uuid) -> Result<ContentMaker, CatalogServiceError> {
        if let Some(maker) = self
            .teams
            .get_maker_by_user(user_id)
            .await
            .context("Failed to get content maker")?
        {
            return Ok(maker);
        }

        if self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .is_none()
        {
            return Err(not_found("User", user_id));
        }

        let maker = self
            .teams
            .create_maker(&ContentMaker::new(user_id))
            .await
            .context("Failed to create content maker")?;
        tracing::info!(maker_id = %maker.id, user_id = %user_id, "Content maker created");
        Ok(maker)
    }

    pub async fn create_team(&self, input: TeamInput) -> Result<Team, CatalogServiceError> {
        validate_name(&input.name)?;
        validate_description(input.description.as_deref(), LONG_DESCRIPTION_MAX)?;

        let team = Team {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            description: input.description,
            created_at: Utc::now(),
        };
        Ok(self.teams.create_team(&team).await.context("Failed to create team")?)
    }

    pub async fn get_team(&self, id: Uuid) -> Result<TeamWithMembers, CatalogServiceError> {
        let team = self
            .teams
            .get_team(id)
            .await
            .context("Failed to get team")?
            .ok_or_else(|| not_found("Team", id))?;
        let members = self
            .teams
            .list_members(id)
            .await
            .context("Failed to list team members")?;
        Ok(TeamWithMembers { team, members })
    }

    /// Put a user's maker into a team. A maker already in another team moves.
    pub async fn add_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
        position: MemberPosition,
    ) -> Result<TeamMember, CatalogServiceError> {
        if self.teams.get_team(team_id).await.context("Failed to get team")?.is_none() {
            return Err(not_found("Team", team_id));
        }
        let maker = self.ensure_content_maker(user_id).await?;

        let member = self
            .teams
            .upsert_member(team_id, maker.id, position)
            .await
            .context("Failed to add team member")?;
        tracing::info!(team_id = %team_id, maker_id = %maker.id, position = %position, "Team member set");
        Ok(member)
    }

    pub async fn remove_member(&self, team_id: Uuid, maker_id: Uuid) -> Result<(), CatalogServiceError> {
        if !self
            .teams
            .remove_member(team_id, maker_id)
            .await
            .context("Failed to remove team member")?
        {
            return Err(not_found("Team member", maker_id));
        }
        Ok(())
    }

    // ========================================================================
    // Addon pages
    // ========================================================================

    /// Create a draft addon page owned by `owner_user_id`'s maker row.
    pub async fn create_addon_page(
        &self,
        owner_user_id: Uuid,
        input: AddonPageInput,
    ) -> Result<AddonPage, CatalogServiceError> {
        validate_name(&input.name)?;
        validate_description(input.description.as_deref(), LONG_DESCRIPTION_MAX)?;
        validate_resolution(input.resolution)?;

        if let Some(team_id) = input.team_id {
            if self.teams.get_team(team_id).await.context("Failed to get team")?.is_none() {
                return Err(CatalogServiceError::Validation(format!("Unknown team {}", team_id)));
            }
        }
        let owner = self.ensure_content_maker(owner_user_id).await?;

        let now = Utc::now();
        let page = AddonPage {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            description: input.description,
            quad_icon: input.quad_icon,
            wide_icon: input.wide_icon,
            status: AddonStatus::Draft,
            team_id: input.team_id,
            owner_id: Some(owner.id),
            resolution: normalize_resolution(input.resolution),
            created_at: now,
            updated_at: now,
        };
        let page = self.addons.create(&page).await.context("Failed to create addon page")?;
        tracing::info!(addon_id = %page.id, owner_id = %owner.id, "Addon page created");
        Ok(page)
    }

    pub async fn get_addon_page(&self, id: Uuid) -> Result<AddonPage, CatalogServiceError> {
        self.addons
            .get_by_id(id)
            .await
            .context("Failed to get addon page")?
            .ok_or_else(|| not_found("Addon page", id))
    }

    pub async fn list_addon_pages(&self, status: Option<AddonStatus>) -> Result<Vec<AddonPage>, CatalogServiceError> {
        Ok(self.addons.list(status).await.context("Failed to list addon pages")?)
    }

    pub async fn set_addon_status(&self, id: Uuid, status: AddonStatus) -> Result<AddonPage, CatalogServiceError> {
        self.addons
            .set_status(id, status)
            .await
            .context("Failed to update addon status")?
            .ok_or_else(|| not_found("Addon page", id))
    }

    pub async fn delete_addon_page(&self, id: Uuid) -> Result<(), CatalogServiceError> {
        if !self.addons.delete(id).await.context("Failed to delete addon page")? {
            return Err(not_found("Addon page", id));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), CatalogServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogServiceError::Validation("Name is required".to_string()));
    }
    if name.chars().count() > PAGE_NAME_MAX {
        return Err(CatalogServiceError::Validation(format!(
            "Name must be at most {} characters",
            PAGE_NAME_MAX
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>, max: usize) -> Result<(), CatalogServiceError> {
    match description {
        Some(d) if d.chars().count() > max => Err(CatalogServiceError::Validation(format!(
            "Description must be at most {} characters",
            max
        ))),
        _ => Ok(()),
    }
}

fn validate_resolution(resolution: Option<u32>) -> Result<(), CatalogServiceError> {
    match resolution {
        Some(r) if r > MAX_RESOLUTION => Err(CatalogServiceError::Validation(format!(
            "Resolution must be at most {}",
            MAX_RESOLUTION
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAddonPageRepository, SqlxPackRepository, SqlxPageRepository, SqlxTeamRepository,
        SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{Page, PageInput, PackType, User};

    async fn setup_test_service() -> (DynDatabasePool, CatalogService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let service = CatalogService::new(
            SqlxPageRepository::boxed(pool.clone()),
            SqlxPackRepository::boxed(pool.clone()),
            SqlxTeamRepository::boxed(pool.clone()),
            SqlxAddonPageRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    async fn create_user(pool: &DynDatabasePool, name: &str) -> Uuid {
        let user = User::new(name.to_string(), format!("{}@example.com", name), "hash".to_string());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();
        user.id
    }

    async fn create_page(pool: &DynDatabasePool) -> Uuid {
        let mut page = Page::from_input(PageInput {
            name: "Page".to_string(),
            ..Default::default()
        });
        page.id = Uuid::new_v4();
        SqlxPageRepository::new(pool.clone()).create(&page).await.unwrap();
        page.id
    }

    fn pack(name: &str) -> PackInput {
        PackInput {
            name: name.to_string(),
            description: None,
            pack_type: PackType::Resources,
        }
    }

    fn addon(name: &str) -> AddonPageInput {
        AddonPageInput {
            name: name.to_string(),
            description: None,
            quad_icon: None,
            wide_icon: None,
            team_id: None,
            resolution: None,
        }
    }

    #[tokio::test]
    async fn test_pack_lifecycle() {
        let (pool, service) = setup_test_service().await;
        let page_id = create_page(&pool).await;

        let created = service.create_pack(page_id, pack("Textures")).await.unwrap();
        assert_eq!(created.pack_type, PackType::Resources);

        let packs = service.list_packs(page_id).await.unwrap();
        assert_eq!(packs.len(), 1);

        service.delete_pack(created.id).await.unwrap();
        assert!(service.list_packs(page_id).await.unwrap().is_empty());
        assert!(matches!(
            service.delete_pack(created.id).await,
            Err(CatalogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pack_for_missing_page_is_not_found() {
        let (_pool, service) = setup_test_service().await;
        let result = service.create_pack(Uuid::new_v4(), pack("Textures")).await;
        assert!(matches!(result, Err(CatalogServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ensure_content_maker_is_idempotent() {
        let (pool, service) = setup_test_service().await;
        let user_id = create_user(&pool, "maker").await;

        let first = service.ensure_content_maker(user_id).await.unwrap();
        let second = service.ensure_content_maker(user_id).await.unwrap();
        assert_eq!(first, second);

        assert!(matches!(
            service.ensure_content_maker(Uuid::new_v4()).await,
            Err(CatalogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_member_moves_between_teams() {
        let (pool, service) = setup_test_service().await;
        let user_id = create_user(&pool, "maker").await;
        let red = service
            .create_team(TeamInput { name: "Red".to_string(), description: None })
            .await
            .unwrap();
        let blue = service
            .create_team(TeamInput { name: "Blue".to_string(), description: None })
            .await
            .unwrap();

        service.add_member(red.id, user_id, MemberPosition::Owner).await.unwrap();
        let member = service.add_member(blue.id, user_id, MemberPosition::Member).await.unwrap();

        assert!(service.get_team(red.id).await.unwrap().members.is_empty());
        let blue_team = service.get_team(blue.id).await.unwrap();
        assert_eq!(blue_team.members.len(), 1);
        assert_eq!(blue_team.members[0].maker_id, member.maker_id);
        assert_eq!(blue_team.members[0].position, MemberPosition::Member);

        service.remove_member(blue.id, member.maker_id).await.unwrap();
        assert!(matches!(
            service.remove_member(blue.id, member.maker_id).await,
            Err(CatalogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_member_to_missing_team() {
        let (pool, service) = setup_test_service().await;
        let user_id = create_user(&pool, "maker").await;
        let result = service.add_member(Uuid::new_v4(), user_id, MemberPosition::Guest).await;
        assert!(matches!(result, Err(CatalogServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_team_validation() {
        let (_pool, service) = setup_test_service().await;
        let result = service
            .create_team(TeamInput {
                name: "T".to_string(),
                description: Some("d".repeat(1025)),
            })
            .await;
        assert!(matches!(result, Err(CatalogServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_addon_page_lifecycle() {
        let (pool, service) = setup_test_service().await;
        let user_id = create_user(&pool, "maker").await;

        let mut input = addon("Shaders");
        input.resolution = Some(100);
        let page = service.create_addon_page(user_id, input).await.unwrap();

        assert_eq!(page.status, AddonStatus::Draft);
        assert_eq!(page.resolution, Some(128));
        let maker = service.ensure_content_maker(user_id).await.unwrap();
        assert_eq!(page.owner_id, Some(maker.id));

        let published = service.set_addon_status(page.id, AddonStatus::Published).await.unwrap();
        assert_eq!(published.status, AddonStatus::Published);

        assert_eq!(service.list_addon_pages(Some(AddonStatus::Published)).await.unwrap().len(), 1);
        assert!(service.list_addon_pages(Some(AddonStatus::Draft)).await.unwrap().is_empty());
        assert_eq!(service.list_addon_pages(None).await.unwrap().len(), 1);

        service.delete_addon_page(page.id).await.unwrap();
        assert!(matches!(
            service.get_addon_page(page.id).await,
            Err(CatalogServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_addon_page_with_unknown_team_rejected() {
        let (pool, service) = setup_test_service().await;
        let user_id = create_user(&pool, "maker").await;
        let mut input = addon("Shaders");
        input.team_id = Some(Uuid::new_v4());

        let result = service.create_addon_page(user_id, input).await;
        assert!(matches!(result, Err(CatalogServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_addon_page_resolution_bounds() {
        let (pool, service) = setup_test_service().await;
        let user_id = create_user(&pool, "maker").await;

        let mut input = addon("Huge");
        input.resolution = Some(MAX_RESOLUTION);
        let page = service.create_addon_page(user_id, input).await.unwrap();
        assert_eq!(page.resolution, Some(MAX_RESOLUTION));

        for r in [MAX_RESOLUTION + 1, u32::MAX] {
            let mut input = addon("Too Huge");
            input.resolution = Some(r);
            let result = service.create_addon_page(user_id, input).await;
            assert!(matches!(result, Err(CatalogServiceError::Validation(_))), "{} accepted", r);
        }
        assert_eq!(service.list_addon_pages(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_status_of_missing_addon() {
        let (_pool, service) = setup_test_service().await;
        let result = service.set_addon_status(Uuid::new_v4(), AddonStatus::Published).await;
        assert!(matches!(result, Err(CatalogServiceError::NotFound(_))));
    }
}
