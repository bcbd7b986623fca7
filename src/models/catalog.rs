//! Secondary catalog entities: packs, teams, content makers and addon pages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of a team or addon description
pub const LONG_DESCRIPTION_MAX: usize = 1024;
/// Smallest accepted resource resolution
pub const MIN_RESOLUTION: u32 = 8;

/// Largest power of two a `u32` resolution can hold
pub const MAX_RESOLUTION: u32 = 1 << 31;

/// Kind of content shipped in a pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackType {
    #[default]
    Addition,
    Data,
    Resources,
    Script,
}

impl fmt::Display for PackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addition => write!(f, "addition"),
            Self::Data => write!(f, "data"),
            Self::Resources => write!(f, "resources"),
            Self::Script => write!(f, "script"),
        }
    }
}

impl FromStr for PackType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "addition" => Ok(Self::Addition),
            "data" => Ok(Self::Data),
            "resources" => Ok(Self::Resources),
            "script" => Ok(Self::Script),
            _ => Err(anyhow::anyhow!("Invalid pack type: {}", s)),
        }
    }
}

/// Downloadable pack attached to a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub id: Uuid,
    pub page_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub pack_type: PackType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pack_type: PackType,
}

/// A user who publishes addon pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMaker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ContentMaker {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Role of a content maker inside a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberPosition {
    #[default]
    Guest,
    Member,
    Owner,
}

impl fmt::Display for MemberPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Member => write!(f, "member"),
            Self::Owner => write!(f, "owner"),
        }
    }
}

impl FromStr for MemberPosition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guest" => Ok(Self::Guest),
            "member" => Ok(Self::Member),
            "owner" => Ok(Self::Owner),
            _ => Err(anyhow::anyhow!("Invalid member position: {}", s)),
        }
    }
}

/// Membership row; a maker belongs to at most one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub maker_id: Uuid,
    pub team_id: Uuid,
    pub position: MemberPosition,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamWithMembers {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<TeamMember>,
}

/// Publication state of an addon page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddonStatus {
    #[default]
    Draft,
    Published,
}

impl fmt::Display for AddonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
        }
    }
}

impl FromStr for AddonStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            _ => Err(anyhow::anyhow!("Invalid addon status: {}", s)),
        }
    }
}

/// Community-authored addon listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonPage {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub quad_icon: Option<Uuid>,
    pub wide_icon: Option<Uuid>,
    pub status: AddonStatus,
    pub team_id: Option<Uuid>,
    /// Content maker who created the page
    pub owner_id: Option<Uuid>,
    /// Texture resolution for resource addons, always a power of two
    pub resolution: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddonPageInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quad_icon: Option<Uuid>,
    #[serde(default)]
    pub wide_icon: Option<Uuid>,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub resolution: Option<u32>,
}

/// Clamp to at least `MIN_RESOLUTION`, then round up to the next power of two.
///
/// Inputs above `MAX_RESOLUTION` have no power of two to round up to and
/// saturate at `MAX_RESOLUTION`; callers reject them beforehand.
pub fn normalize_resolution(resolution: Option<u32>) -> Option<u32> {
    resolution.map(|r| {
        r.max(MIN_RESOLUTION)
            .checked_next_power_of_two()
            .unwrap_or(MAX_RESOLUTION)
    })
}
