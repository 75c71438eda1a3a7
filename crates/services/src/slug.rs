//! Slug derivation and collision handling.

use domains::{DomainError, MomentRepository, Result};

/// Used when a title contains nothing slug-worthy.
pub const FALLBACK_SLUG: &str = "moment";

/// Highest numeric suffix tried before giving up.
pub const MAX_SLUG_SUFFIX: u32 = 100;

/// Lowercases, drops everything outside `[a-z0-9]`, whitespace and `-`, then
/// turns each whitespace/dash run into a single `-` with no leading or
/// trailing dash.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

pub fn with_suffix(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{base}-{n}")
    }
}

/// First free slug among `base`, `base-1`, `base-2`, ... up to
/// [`MAX_SLUG_SUFFIX`]. The repository's unique constraint still has the last
/// word; callers must handle `SlugTaken` from the insert.
pub async fn unique_slug(repo: &dyn MomentRepository, title: &str) -> Result<String> {
    let base = generate_slug(title);
    for n in 0..=MAX_SLUG_SUFFIX {
        let candidate = with_suffix(&base, n);
        if !repo.slug_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(DomainError::Validation(format!(
        "could not find a free slug for '{base}'; choose a different title"
    )))
}
