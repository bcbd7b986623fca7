//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity.
//! Identifiers are stored as hyphenated UUID strings.

pub mod addon_page;
pub mod file;
pub mod pack;
pub mod page;
pub mod team;
pub mod user;

pub use addon_page::{AddonPageRepository, SqlxAddonPageRepository};
pub use file::{FileRepository, SqlxFileRepository};
pub use pack::{PackRepository, SqlxPackRepository};
pub use page::{PageRepository, SqlxPageRepository};
pub use team::{SqlxTeamRepository, TeamRepository};
pub use user::{SqlxUserRepository, UserRepository};

use anyhow::{Context, Result};
use uuid::Uuid;

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid UUID stored in database: {}", raw))
}

pub(crate) fn parse_opt_uuid(raw: Option<String>) -> Result<Option<Uuid>> {
    raw.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn opt_uuid_str(id: Option<Uuid>) -> Option<String> {
    id.map(|id| id.to_string())
}

/// Whether any error in the chain is a UNIQUE constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map_or(false, |db| db.is_unique_violation())
    })
}
