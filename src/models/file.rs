//! Stored file metadata
//!
//! Each `FileRecord` pairs with exactly one object in storage under
//! `files/{id}`. The record carries no payload; see `StoredFile`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content type used when the uploader did not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata row of a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    /// MIME type as declared by the uploader
    pub content_type: Option<String>,
    /// Payload size in bytes
    pub size: i64,
    /// Uploading user, if known
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// Caller-supplied attributes of a file about to be stored
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub content_type: Option<String>,
    pub user_id: Option<Uuid>,
}

impl NewFile {
    pub fn new(content_type: Option<String>, user_id: Option<Uuid>) -> Self {
        Self {
            content_type: content_type.filter(|t| !t.trim().is_empty()),
            user_id,
        }
    }
}

/// A metadata record together with its payload
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub record: FileRecord,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_default() {
        let mut record = FileRecord {
            id: Uuid::new_v4(),
            content_type: None,
            size: 0,
            user_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(record.content_type_or_default(), DEFAULT_CONTENT_TYPE);

        record.content_type = Some("image/png".to_string());
        assert_eq!(record.content_type_or_default(), "image/png");
    }

    #[test]
    fn test_new_file_drops_blank_content_type() {
        assert_eq!(NewFile::new(Some("  ".to_string()), None).content_type, None);
        assert_eq!(
            NewFile::new(Some("text/plain".to_string()), None).content_type,
            Some("text/plain".to_string())
        );
    }
}
