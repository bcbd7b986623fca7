//! Page model
//!
//! A page is a catalog listing with optional icons and an attached file,
//! plus a set of free-form tags owned by the page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a page name
pub const PAGE_NAME_MAX: usize = 32;
/// Maximum length of a page description
pub const PAGE_DESCRIPTION_MAX: usize = 256;
/// Maximum length of page content
pub const PAGE_CONTENT_MAX: usize = 2048;
/// Maximum length of a single tag name
pub const TAG_NAME_MAX: usize = 50;

/// Catalog page with its tags loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Nil until the page is stored
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub content: Option<String>,
    /// File id of the square icon
    pub quad_icon: Option<Uuid>,
    /// File id of the wide banner icon
    pub wide_icon: Option<Uuid>,
    /// File id of the downloadable payload
    pub file: Option<Uuid>,
    pub tags: Vec<PageTag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Association row between a page and one tag name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTag {
    pub id: Uuid,
    pub page_id: Uuid,
    pub tag_name: String,
}

impl PageTag {
    pub fn new(page_id: Uuid, tag_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_id,
            tag_name: tag_name.into(),
        }
    }
}

/// Editable fields of a page, shared by create and update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub quad_icon: Option<Uuid>,
    #[serde(default)]
    pub wide_icon: Option<Uuid>,
    #[serde(default)]
    pub file: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Page {
    /// Build an unsaved page (nil id) whose tag rows are not yet parented.
    pub fn from_input(input: PageInput) -> Self {
        let now = Utc::now();
        let tags = normalize_tags(input.tags)
            .into_iter()
            .map(|name| PageTag::new(Uuid::nil(), name))
            .collect();
        Self {
            id: Uuid::nil(),
            name: input.name,
            description: input.description,
            content: input.content,
            quad_icon: input.quad_icon,
            wide_icon: input.wide_icon,
            file: input.file,
            tags,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.tag_name.as_str()).collect()
    }

    /// Point every tag row at this page's id
    pub fn reparent_tags(&mut self) {
        for tag in &mut self.tags {
            tag.page_id = self.id;
        }
    }

    /// Every object id referenced by this page
    pub fn attachments(&self) -> Vec<Uuid> {
        [self.quad_icon, self.wide_icon, self.file]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Trim tag names, drop blanks, and collapse exact duplicates keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Which of a page's two icons an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconKind {
    Quad,
    Wide,
}

impl IconKind {
    pub fn get(self, page: &Page) -> Option<Uuid> {
        match self {
            Self::Quad => page.quad_icon,
            Self::Wide => page.wide_icon,
        }
    }

    pub fn set(self, page: &mut Page, file_id: Option<Uuid>) {
        match self {
            Self::Quad => page.quad_icon = file_id,
            Self::Wide => page.wide_icon = file_id,
        }
    }
}

impl std::str::FromStr for IconKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quad" => Ok(Self::Quad),
            "wide" => Ok(Self::Wide),
            _ => Err(anyhow::anyhow!("Invalid icon type: {}", s)),
        }
    }
}

/// Split a comma separated tag list as sent by multipart forms
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}

/// Optional name and tag filters for listing pages
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageFilter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl PageFilter {
    /// Both criteria unset (or blank)
    pub fn is_empty(&self) -> bool {
        blank(&self.name) && blank(&self.tag)
    }

    /// Case-insensitive substring match on the name and on any tag.
    /// When both criteria are given, both must match.
    pub fn matches(&self, page: &Page) -> bool {
        let name_ok = match self.name.as_deref().filter(|s| !s.is_empty()) {
            Some(needle) => contains_ignore_case(&page.name, needle),
            None => true,
        };
        let tag_ok = match self.tag.as_deref().filter(|s| !s.is_empty()) {
            Some(needle) => page
                .tags
                .iter()
                .any(|t| contains_ignore_case(&t.tag_name, needle)),
            None => true,
        };
        name_ok && tag_ok
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
