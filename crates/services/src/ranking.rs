//! Related-content scoring.
//!
//! A candidate earns two points per tag it shares with the source Moment and
//! one point for sharing its category. Ties go to the more recently published
//! candidate. The source itself is never returned.

use domains::{Category, Moment};
use uuid::Uuid;

pub const DEFAULT_RELATED_LIMIT: usize = 3;
/// Newest same-category Moments considered.
pub const SAME_CATEGORY_POOL: u32 = 50;
/// Newest other-category Moments considered when the same-category pool is short.
pub const CROSS_CATEGORY_POOL: u32 = 20;

pub const SHARED_TAG_WEIGHT: u32 = 2;
pub const SAME_CATEGORY_WEIGHT: u32 = 1;

/// The parts of a Moment the ranker compares against.
#[derive(Debug, Clone, Copy)]
pub struct RelatedSource<'a> {
    pub id: Uuid,
    pub category: Category,
    pub tags: &'a [String],
}

impl<'a> From<&'a Moment> for RelatedSource<'a> {
    fn from(moment: &'a Moment) -> Self {
        Self {
            id: moment.id,
            category: moment.category,
            tags: &moment.tags,
        }
    }
}

pub fn score(source: &RelatedSource<'_>, candidate: &Moment) -> u32 {
    let shared = candidate
        .tags
        .iter()
        .filter(|tag| source.tags.contains(tag))
        .count() as u32;
    let same_category = u32::from(candidate.category == source.category);
    SHARED_TAG_WEIGHT * shared + SAME_CATEGORY_WEIGHT * same_category
}

/// Whether the other-category pool should be fetched at all.
pub fn needs_cross_category(same_category_found: usize, limit: usize) -> bool {
    same_category_found < limit
}

/// Top `limit` candidates by score, newest first within equal scores.
pub fn rank_related(source: &RelatedSource<'_>, candidates: Vec<Moment>, limit: usize) -> Vec<Moment> {
    let mut scored: Vec<(u32, Moment)> = candidates
        .into_iter()
        .filter(|m| m.id != source.id)
        .map(|m| (score(source, &m), m))
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| b.published_at.cmp(&a.published_at)));
    scored.into_iter().take(limit).map(|(_, m)| m).collect()
}
