//! Input validation shared by the submission, moment and upload flows.
//!
//! Every check returns `DomainError::Validation` with a message that can be
//! shown to the caller as-is.

use domains::{Category, DomainError, Result};
use mime::Mime;
use serde::Deserialize;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;
pub const MAX_CREATOR_NAME_LENGTH: usize = 100;
pub const MAX_NOTE_LENGTH: usize = 1000;
pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_TAG_LENGTH: usize = 50;
pub const MAX_TAGS_COUNT: usize = 20;
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Content types accepted by both upload endpoints.
pub const ALLOWED_MEDIA_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "video/mp4",
    "video/webm",
];

/// Tags arrive either as a JSON array or as a comma-separated string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

impl TagsInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            TagsInput::List(tags) => tags,
            TagsInput::Csv(raw) => raw.split(',').map(str::to_string).collect(),
        }
    }
}

impl From<Vec<String>> for TagsInput {
    fn from(tags: Vec<String>) -> Self {
        TagsInput::List(tags)
    }
}

pub fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn required_url(value: Option<&str>, field: &str) -> Result<String> {
    let raw = blank_to_none(value)
        .ok_or_else(|| DomainError::Validation(format!("{field} is required")))?;
    check_url(raw, field)?;
    Ok(raw.to_string())
}

pub fn optional_url(value: Option<&str>, field: &str) -> Result<Option<String>> {
    match blank_to_none(value) {
        Some(raw) => {
            check_url(raw, field)?;
            Ok(Some(raw.to_string()))
        }
        None => Ok(None),
    }
}

fn check_url(raw: &str, field: &str) -> Result<()> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(DomainError::Validation(format!(
            "{field} must be under {MAX_URL_LENGTH} characters"
        )));
    }
    if !is_http_url(raw) {
        return Err(DomainError::Validation(format!(
            "invalid {field} format; an http or https URL is required"
        )));
    }
    Ok(())
}

pub fn required_text(value: Option<&str>, field: &str, max: usize) -> Result<String> {
    let text = blank_to_none(value)
        .ok_or_else(|| DomainError::Validation(format!("{field} is required")))?;
    check_length(text, field, max)?;
    Ok(text.to_string())
}

pub fn optional_text(value: Option<&str>, field: &str, max: usize) -> Result<Option<String>> {
    match blank_to_none(value) {
        Some(text) => {
            check_length(text, field, max)?;
            Ok(Some(text.to_string()))
        }
        None => Ok(None),
    }
}

fn check_length(text: &str, field: &str, max: usize) -> Result<()> {
    if text.chars().count() > max {
        return Err(DomainError::Validation(format!(
            "{field} must be under {max} characters"
        )));
    }
    Ok(())
}

pub fn required_category(value: Option<&str>) -> Result<Category> {
    blank_to_none(value)
        .ok_or_else(|| DomainError::Validation("category is required".into()))?
        .parse()
}

/// Trims, drops empties and duplicates (first occurrence wins), then enforces
/// the count and per-tag length limits.
pub fn normalize_tags(raw: Vec<String>) -> Result<Vec<String>> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if tag.is_empty() || tags.iter().any(|t| t == tag) {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(DomainError::Validation(format!(
                "each tag must be under {MAX_TAG_LENGTH} characters"
            )));
        }
        tags.push(tag.to_string());
    }
    if tags.len() > MAX_TAGS_COUNT {
        return Err(DomainError::Validation(format!(
            "maximum {MAX_TAGS_COUNT} tags allowed"
        )));
    }
    Ok(tags)
}

pub fn validate_year(year: Option<i32>) -> Result<Option<i32>> {
    match year {
        Some(y) if !(1..=9999).contains(&y) => Err(DomainError::Validation(
            "year must be between 1 and 9999".into(),
        )),
        other => Ok(other),
    }
}

/// Checks an upload's declared type and size before it reaches the media store.
pub fn validate_upload(content_type: Option<&str>, size: usize, max_bytes: usize) -> Result<Mime> {
    let mime: Mime = content_type
        .and_then(|ct| ct.parse().ok())
        .filter(|m: &Mime| ALLOWED_MEDIA_TYPES.contains(&m.essence_str()))
        .ok_or_else(|| {
            DomainError::Validation(format!(
                "invalid file type; allowed: {}",
                ALLOWED_MEDIA_TYPES.join(", ")
            ))
        })?;

    if size == 0 {
        return Err(DomainError::Validation("no file provided".into()));
    }
    if size > max_bytes {
        return Err(DomainError::Validation(format!(
            "file too large; maximum size: {}MB",
            max_bytes / 1024 / 1024
        )));
    }
    Ok(mime)
}
