//! Team, membership and content maker repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ContentMaker, MemberPosition, Team, TeamMember};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::parse_uuid;

#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn create_team(&self, team: &Team) -> Result<Team>;
    async fn get_team(&self, id: Uuid) -> Result<Option<Team>>;
    async fn list_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>>;
    /// Put a maker in a team, moving it out of any previous one
    async fn upsert_member(&self, team_id: Uuid, maker_id: Uuid, position: MemberPosition) -> Result<TeamMember>;
    async fn remove_member(&self, team_id: Uuid, maker_id: Uuid) -> Result<bool>;
    async fn get_maker_by_user(&self, user_id: Uuid) -> Result<Option<ContentMaker>>;
    async fn create_maker(&self, maker: &ContentMaker) -> Result<ContentMaker>;
}

pub struct SqlxTeamRepository {
    pool: DynDatabasePool,
}

impl SqlxTeamRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TeamRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TeamRepository for SqlxTeamRepository {
    async fn create_team(&self, team: &Team) -> Result<Team> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_team_sqlite(self.pool.sqlite()?, team).await,
            DatabaseDriver::Mysql => create_team_mysql(self.pool.mysql()?, team).await,
        }
    }

    async fn get_team(&self, id: Uuid) -> Result<Option<Team>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_team_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_team_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_members_sqlite(self.pool.sqlite()?, team_id).await,
            DatabaseDriver::Mysql => list_members_mysql(self.pool.mysql()?, team_id).await,
        }
    }

    async fn upsert_member(&self, team_id: Uuid, maker_id: Uuid, position: MemberPosition) -> Result<TeamMember> {
        let member = TeamMember {
            maker_id,
            team_id,
            position,
            joined_at: Utc::now(),
        };
        match self.pool.driver() {
            DatabaseDriver::Sqlite => upsert_member_sqlite(self.pool.sqlite()?, &member).await?,
            DatabaseDriver::Mysql => upsert_member_mysql(self.pool.mysql()?, &member).await?,
        }
        Ok(member)
    }

    async fn remove_member(&self, team_id: Uuid, maker_id: Uuid) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => remove_member_sqlite(self.pool.sqlite()?, team_id, maker_id).await,
            DatabaseDriver::Mysql => remove_member_mysql(self.pool.mysql()?, team_id, maker_id).await,
        }
    }

    async fn get_maker_by_user(&self, user_id: Uuid) -> Result<Option<ContentMaker>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_maker_by_user_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => get_maker_by_user_mysql(self.pool.mysql()?, user_id).await,
        }
    }

    async fn create_maker(&self, maker: &ContentMaker) -> Result<ContentMaker> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_maker_sqlite(self.pool.sqlite()?, maker).await,
            DatabaseDriver::Mysql => create_maker_mysql(self.pool.mysql()?, maker).await,
        }
    }
}

// SQLite implementations
async fn create_team_sqlite(pool: &SqlitePool, team: &Team) -> Result<Team> {
    sqlx::query("INSERT INTO teams (id, name, description, created_at) VALUES (?, ?, ?, ?)")
        .bind(team.id.to_string())
        .bind(&team.name)
        .bind(&team.description)
        .bind(team.created_at)
        .execute(pool)
        .await
        .context("Failed to create team")?;
    Ok(team.clone())
}

async fn get_team_sqlite(pool: &SqlitePool, id: Uuid) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT id, name, description, created_at FROM teams WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get team")?;
    row.map(|r| row_to_team_sqlite(&r)).transpose()
}

async fn list_members_sqlite(pool: &SqlitePool, team_id: Uuid) -> Result<Vec<TeamMember>> {
    let rows = sqlx::query("SELECT maker_id, team_id, position, joined_at FROM team_members WHERE team_id = ? ORDER BY joined_at")
        .bind(team_id.to_string())
        .fetch_all(pool)
        .await
        .context("Failed to list team members")?;
    rows.iter().map(row_to_member_sqlite).collect()
}

async fn upsert_member_sqlite(pool: &SqlitePool, member: &TeamMember) -> Result<()> {
    sqlx::query(
        "INSERT INTO team_members (maker_id, team_id, position, joined_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(maker_id) DO UPDATE SET team_id = excluded.team_id, position = excluded.position, joined_at = excluded.joined_at",
    )
    .bind(member.maker_id.to_string())
    .bind(member.team_id.to_string())
    .bind(member.position.to_string())
    .bind(member.joined_at)
    .execute(pool)
    .await
    .context("Failed to add team member")?;
    Ok(())
}

async fn remove_member_sqlite(pool: &SqlitePool, team_id: Uuid, maker_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM team_members WHERE team_id = ? AND maker_id = ?")
        .bind(team_id.to_string())
        .bind(maker_id.to_string())
        .execute(pool)
        .await
        .context("Failed to remove team member")?;
    Ok(result.rows_affected() > 0)
}

async fn get_maker_by_user_sqlite(pool: &SqlitePool, user_id: Uuid) -> Result<Option<ContentMaker>> {
    let row = sqlx::query("SELECT id, user_id, created_at FROM content_makers WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get content maker")?;
    row.map(|r| row_to_maker_sqlite(&r)).transpose()
}

async fn create_maker_sqlite(pool: &SqlitePool, maker: &ContentMaker) -> Result<ContentMaker> {
    sqlx::query("INSERT INTO content_makers (id, user_id, created_at) VALUES (?, ?, ?)")
        .bind(maker.id.to_string())
        .bind(maker.user_id.to_string())
        .bind(maker.created_at)
        .execute(pool)
        .await
        .context("Failed to create content maker")?;
    Ok(maker.clone())
}

fn row_to_team_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Team> {
    let id: String = row.get("id");
    Ok(Team {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    })
}

fn row_to_member_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<TeamMember> {
    let maker_id: String = row.get("maker_id");
    let team_id: String = row.get("team_id");
    let position: String = row.get("position");
    Ok(TeamMember {
        maker_id: parse_uuid(&maker_id)?,
        team_id: parse_uuid(&team_id)?,
        position: MemberPosition::from_str(&position).unwrap_or_default(),
        joined_at: row.get("joined_at"),
    })
}

fn row_to_maker_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<ContentMaker> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    Ok(ContentMaker {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        created_at: row.get("created_at"),
    })
}

// MySQL implementations
async fn create_team_mysql(pool: &MySqlPool, team: &Team) -> Result<Team> {
    sqlx::query("INSERT INTO teams (id, name, description, created_at) VALUES (?, ?, ?, ?)")
        .bind(team.id.to_string())
        .bind(&team.name)
        .bind(&team.description)
        .bind(team.created_at)
        .execute(pool)
        .await
        .context("Failed to create team")?;
    Ok(team.clone())
}

async fn get_team_mysql(pool: &MySqlPool, id: Uuid) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT id, name, description, created_at FROM teams WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get team")?;
    row.map(|r| row_to_team_mysql(&r)).transpose()
}

async fn list_members_mysql(pool: &MySqlPool, team_id: Uuid) -> Result<Vec<TeamMember>> {
    let rows = sqlx::query("SELECT maker_id, team_id, position, joined_at FROM team_members WHERE team_id = ? ORDER BY joined_at")
        .bind(team_id.to_string())
        .fetch_all(pool)
        .await
        .context("Failed to list team members")?;
    rows.iter().map(row_to_member_mysql).collect()
}

async fn upsert_member_mysql(pool: &MySqlPool, member: &TeamMember) -> Result<()> {
    sqlx::query(
        "INSERT INTO team_members (maker_id, team_id, position, joined_at) VALUES (?, ?, ?, ?) \
         ON DUPLICATE KEY UPDATE team_id = VALUES(team_id), position = VALUES(position), joined_at = VALUES(joined_at)",
    )
    .bind(member.maker_id.to_string())
    .bind(member.team_id.to_string())
    .bind(member.position.to_string())
    .bind(member.joined_at)
    .execute(pool)
    .await
    .context("Failed to add team member")?;
    Ok(())
}

async fn remove_member_mysql(pool: &MySqlPool, team_id: Uuid, maker_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM team_members WHERE team_id = ? AND maker_id = ?")
        .bind(team_id.to_string())
        .bind(maker_id.to_string())
        .execute(pool)
        .await
        .context("Failed to remove team member")?;
    Ok(result.rows_affected() > 0)
}

async fn get_maker_by_user_mysql(pool: &MySqlPool, user_id: Uuid) -> Result<Option<ContentMaker>> {
    let row = sqlx::query("SELECT id, user_id, created_at FROM content_makers WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get content maker")?;
    row.map(|r| row_to_maker_mysql(&r)).transpose()
}

async fn create_maker_mysql(pool: &MySqlPool, maker: &ContentMaker) -> Result<ContentMaker> {
    sqlx::query("INSERT INTO content_makers (id, user_id, created_at) VALUES (?, ?, ?)")
        .bind(maker.id.to_string())
        .bind(maker.user_id.to_string())
        .bind(maker.created_at)
        .execute(pool)
        .await
        .context("Failed to create content maker")?;
    Ok(maker.clone())
}

fn row_to_team_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Team> {
    let id: String = row.get("id");
    Ok(Team {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    })
}

fn row_to_member_mysql(row: &sqlx::mysql::MySqlRow) -> Result<TeamMember> {
    let maker_id: String = row.get("maker_id");
    let team_id: String = row.get("team_id");
    let position: String = row.get("position");
    Ok(TeamMember {
        maker_id: parse_uuid(&maker_id)?,
        team_id: parse_uuid(&team_id)?,
        position: MemberPosition::from_str(&position).unwrap_or_default(),
        joined_at: row.get("joined_at"),
    })
}

fn row_to_maker_mysql(row: &sqlx::mysql::MySqlRow) -> Result<ContentMaker> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    Ok(ContentMaker {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        created_at: row.get("created_at"),
    })
}
