//! Data models
//!
//! Database entities and the inputs used to create or replace them.
//! Page and file response shapes live next to their handlers in `api`.

mod catalog;
mod file;
mod page;
mod user;

pub use catalog::{
    normalize_resolution, AddonPage, AddonPageInput, AddonStatus, ContentMaker, MemberPosition,
    Pack, PackInput, PackType, Team, TeamInput, TeamMember, TeamWithMembers,
    LONG_DESCRIPTION_MAX, MAX_RESOLUTION, MIN_RESOLUTION,
};
pub use file::{FileRecord, NewFile, StoredFile, DEFAULT_CONTENT_TYPE};
pub use page::{
    normalize_tags, parse_tag_list, IconKind, Page, PageFilter, PageInput, PageTag, PAGE_CONTENT_MAX,
    PAGE_DESCRIPTION_MAX, PAGE_NAME_MAX, TAG_NAME_MAX,
};
pub use user::User;
