//! Common API utilities and shared types
//!
//! Multipart forms are read fully into memory before a handler acts on
//! them; the request body limit bounds their size.

use axum::extract::Multipart;
use bytes::Bytes;
use std::collections::HashMap;

use crate::api::middleware::ApiError;
use crate::config::UploadConfig;

/// One file part of a multipart form
#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Text fields and file parts of a multipart form.
///
/// Field names are matched ignoring case, `_` and `-`, so `quad_icon`
/// and `QuadIcon` name the same field.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedPart>,
}

fn field_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
        {
            let key = field_key(field.name().unwrap_or(""));
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation_error(format!("Failed to read field: {}", e)))?;

            match file_name {
                // Browsers submit empty file inputs as nameless, empty parts
                Some(name) if name.is_empty() && data.is_empty() => {}
                Some(name) => {
                    form.files.insert(
                        key,
                        UploadedPart {
                            file_name: Some(name),
                            content_type,
                            data,
                        },
                    );
                }
                None => {
                    let text = String::from_utf8(data.to_vec()).map_err(|_| {
                        ApiError::validation_error(format!("Field '{}' is not valid UTF-8", key))
                    })?;
                    form.fields.insert(key, text);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(&field_key(name)).map(String::as_str)
    }

    /// Text field, with blank values treated as absent
    pub fn non_blank(&self, name: &str) -> Option<String> {
        self.text(name)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Checkbox-style flag: `true`, `1` or `on`
    pub fn flag(&self, name: &str) -> bool {
        matches!(
            self.text(name).map(|s| s.trim().to_lowercase()).as_deref(),
            Some("true" | "1" | "on")
        )
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedPart> {
        self.files.remove(&field_key(name))
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.contains_key(&field_key(name))
    }
}

/// Reject a part whose content type is not an accepted icon type.
/// The error lists the accepted types under `details.allowed_types`.
pub fn check_icon_type(part: &UploadedPart, config: &UploadConfig) -> Result<(), ApiError> {
    let content_type = part.content_type.as_deref().unwrap_or("");
    if config.is_icon_type_allowed(content_type) {
        return Ok(());
    }
    Err(ApiError::with_details(
        "VALIDATION_ERROR",
        format!(
            "Invalid image type: {}",
            if content_type.is_empty() { "none" } else { content_type }
        ),
        serde_json::json!({ "allowed_types": config.allowed_icon_types }),
    ))
}
