//! # Moment service
//!
//! Curator CRUD over published Moments plus the read paths the gallery
//! needs: filtered listing, related content and chronological neighbours.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, instrument};

use domains::{
    Adjacent, Category, ColorExtractor, DomainError, Moment, MomentRepository, MomentUpdate,
    NewMoment, Result,
};

use crate::color::text_color_for;
use crate::ranking::{
    needs_cross_category, rank_related, RelatedSource, CROSS_CATEGORY_POOL, DEFAULT_RELATED_LIMIT,
    SAME_CATEGORY_POOL,
};
use crate::slug::generate_slug;
use crate::validation::{
    normalize_tags, optional_text, optional_url, required_category, required_text, required_url,
    validate_year, TagsInput, MAX_CREATOR_NAME_LENGTH, MAX_DESCRIPTION_LENGTH, MAX_TITLE_LENGTH,
};

/// Category value that means "no filter".
pub const ALL_CATEGORIES: &str = "All";

/// Gallery listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MomentQuery {
    pub category: Option<String>,
    /// Case-insensitive match against title, description and tags.
    #[serde(alias = "q")]
    pub search: Option<String>,
}

/// Curator form for a new Moment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentInput {
    pub title: Option<String>,
    /// Derived from the title when absent.
    pub slug: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "imageUrl")]
    pub media_url: Option<String>,
    pub source_url: Option<String>,
    pub creator_name: Option<String>,
    pub creator_url: Option<String>,
    pub tags: Option<TagsInput>,
    pub year: Option<i32>,
    #[serde(default)]
    pub year_approximate: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// Partial edit. For nullable fields an explicit JSON `null` clears the value
/// while an absent key leaves it untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentPatch {
    pub title: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "imageUrl")]
    pub media_url: Option<String>,
    pub source_url: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub creator_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub creator_url: Option<Option<String>>,
    pub tags: Option<TagsInput>,
    #[serde(default, deserialize_with = "nullable")]
    pub year: Option<Option<i32>>,
    pub year_approximate: Option<bool>,
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Everything the detail page renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentDetail {
    pub moment: Moment,
    pub display_year: Option<String>,
    pub text_color: &'static str,
    pub related: Vec<Moment>,
    pub adjacent: Adjacent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInfo {
    pub name: Category,
    pub description: &'static str,
    pub suggested_tags: &'static [&'static str],
}

pub struct MomentService {
    moments: Arc<dyn MomentRepository>,
    colors: Arc<dyn ColorExtractor>,
}

impl MomentService {
    pub fn new(moments: Arc<dyn MomentRepository>, colors: Arc<dyn ColorExtractor>) -> Self {
        Self { moments, colors }
    }

    pub async fn list(&self, query: MomentQuery) -> Result<Vec<Moment>> {
        let category = match query.category.as_deref().map(str::trim) {
            None | Some("") | Some(ALL_CATEGORIES) => None,
            Some(name) => Some(name.parse::<Category>()?),
        };
        let moments = self.moments.list(category).await?;

        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        Ok(match needle {
            Some(needle) => moments.into_iter().filter(|m| matches_search(m, &needle)).collect(),
            None => moments,
        })
    }

    pub async fn get(&self, slug: &str) -> Result<Moment> {
        self.moments
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::not_found("moment", slug))
    }

    pub async fn detail(&self, slug: &str) -> Result<MomentDetail> {
        let moment = self.get(slug).await?;
        let related = self.related(&moment, DEFAULT_RELATED_LIMIT).await?;
        let adjacent = self.adjacent(&moment).await?;
        Ok(MomentDetail {
            display_year: moment.display_year(),
            text_color: text_color_for(moment.dominant_color.as_deref()),
            moment,
            related,
            adjacent,
        })
    }

    /// Up to `limit` Moments similar to `moment`. Other categories are only
    /// consulted when its own category cannot fill the list.
    pub async fn related(&self, moment: &Moment, limit: usize) -> Result<Vec<Moment>> {
        let mut candidates = self
            .moments
            .recent_in_category(moment.category, moment.id, SAME_CATEGORY_POOL)
            .await?;
        if needs_cross_category(candidates.len(), limit) {
            candidates.extend(
                self.moments
                    .recent_outside_category(moment.category, moment.id, CROSS_CATEGORY_POOL)
                    .await?,
            );
        }
        Ok(rank_related(&RelatedSource::from(moment), candidates, limit))
    }

    /// Previous is the latest Moment published strictly earlier; next is the
    /// earliest published strictly later. Equal timestamps fall back to id order.
    pub async fn adjacent(&self, moment: &Moment) -> Result<Adjacent> {
        self.moments.adjacent(moment.published_at, moment.id).await
    }

    #[instrument(skip(self, input), fields(title = input.title.as_deref().unwrap_or("")))]
    pub async fn create(&self, input: MomentInput) -> Result<Moment> {
        let title = required_text(input.title.as_deref(), "title", MAX_TITLE_LENGTH)?;
        let category = required_category(input.category.as_deref())?;
        let description = required_text(
            input.description.as_deref(),
            "description",
            MAX_DESCRIPTION_LENGTH,
        )?;
        let media_url = required_url(input.media_url.as_deref(), "media URL")?;
        let source_url = required_url(input.source_url.as_deref(), "source URL")?;
        let creator_name = optional_text(
            input.creator_name.as_deref(),
            "creator name",
            MAX_CREATOR_NAME_LENGTH,
        )?;
        let creator_url = optional_url(input.creator_url.as_deref(), "creator URL")?;
        let tags = normalize_tags(input.tags.map(TagsInput::into_vec).unwrap_or_default())?;
        let year = validate_year(input.year)?;

        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(requested) => generate_slug(requested),
            None => generate_slug(&title),
        };
        if self.moments.slug_exists(&slug).await? {
            return Err(DomainError::SlugTaken(slug));
        }

        let dominant_color = self.colors.extract(&media_url).await;
        let moment = self
            .moments
            .create(NewMoment {
                slug,
                title,
                category,
                description,
                creator_name,
                creator_url,
                source_url,
                media_url,
                tags,
                dominant_color: Some(dominant_color),
                year,
                year_approximate: input.year_approximate,
                published_at: input.published_at.unwrap_or_else(Utc::now),
            })
            .await?;
        info!(slug = %moment.slug, "moment created");
        Ok(moment)
    }

    /// Applies a partial edit. The slug never changes; a new media URL
    /// refreshes the dominant colour.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, slug: &str, patch: MomentPatch) -> Result<Moment> {
        let mut changes = MomentUpdate {
            title: patch
                .title
                .as_deref()
                .map(|t| required_text(Some(t), "title", MAX_TITLE_LENGTH))
                .transpose()?,
            category: patch
                .category
                .as_deref()
                .map(|c| required_category(Some(c)))
                .transpose()?,
            description: patch
                .description
                .as_deref()
                .map(|d| required_text(Some(d), "description", MAX_DESCRIPTION_LENGTH))
                .transpose()?,
            media_url: patch
                .media_url
                .as_deref()
                .map(|u| required_url(Some(u), "media URL"))
                .transpose()?,
            source_url: patch
                .source_url
                .as_deref()
                .map(|u| required_url(Some(u), "source URL"))
                .transpose()?,
            creator_name: patch
                .creator_name
                .map(|n| optional_text(n.as_deref(), "creator name", MAX_CREATOR_NAME_LENGTH))
                .transpose()?,
            creator_url: patch
                .creator_url
                .map(|u| optional_url(u.as_deref(), "creator URL"))
                .transpose()?,
            tags: patch
                .tags
                .map(|t| normalize_tags(t.into_vec()))
                .transpose()?,
            dominant_color: None,
            year: patch.year.map(validate_year).transpose()?,
            year_approximate: patch.year_approximate,
        };

        if changes.is_empty() {
            return self.get(slug).await;
        }
        if let Some(media_url) = changes.media_url.as_deref() {
            changes.dominant_color = Some(Some(self.colors.extract(media_url).await));
        }

        let moment = self
            .moments
            .update(slug, changes)
            .await?
            .ok_or_else(|| DomainError::not_found("moment", slug))?;
        info!(slug = %moment.slug, "moment updated");
        Ok(moment)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, slug: &str) -> Result<()> {
        if !self.moments.delete(slug).await? {
            return Err(DomainError::not_found("moment", slug));
        }
        info!(slug, "moment deleted");
        Ok(())
    }

    /// Bulk delete; unknown slugs are skipped. Returns how many were removed.
    #[instrument(skip(self, slugs), fields(requested = slugs.len()))]
    pub async fn delete_many(&self, slugs: &[String]) -> Result<u64> {
        if slugs.is_empty() {
            return Err(DomainError::Validation("no slugs provided".into()));
        }
        let deleted = self.moments.delete_many(slugs).await?;
        info!(deleted, "moments deleted");
        Ok(deleted)
    }

    pub fn categories(&self) -> Vec<CategoryInfo> {
        Category::ALL
            .into_iter()
            .map(|category| CategoryInfo {
                name: category,
                description: category.description(),
                suggested_tags: category.tag_suggestions(),
            })
            .collect()
    }
}

fn matches_search(moment: &Moment, needle: &str) -> bool {
    moment.title.to_lowercase().contains(needle)
        || moment.description.to_lowercase().contains(needle)
        || moment.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domains::{MockColorExtractor, MockMomentRepository, MomentNav};
    use mockall::predicate::{always, eq};
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, day, 9, 0, 0).unwrap()
    }

    fn moment(slug: &str, category: Category, tags: &[&str], day: u32) -> Moment {
        Moment {
            id: Uuid::now_v7(),
            slug: slug.into(),
            title: slug.replace('-', " "),
            category,
            description: format!("About {slug}"),
            creator_name: None,
            creator_url: None,
            source_url: "https://example.com".into(),
            media_url: "https://example.com/m.png".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            dominant_color: Some("#ffffff".into()),
            year: None,
            year_approximate: false,
            published_at: at(day),
            created_at: at(day),
            updated_at: at(day),
        }
    }

    fn service(repo: MockMomentRepository, colors: MockColorExtractor) -> MomentService {
        MomentService::new(Arc::new(repo), Arc::new(colors))
    }

    #[tokio::test]
    async fn list_treats_all_as_no_filter_and_searches_tags() {
        let mut repo = MockMomentRepository::new();
        repo.expect_list().with(eq(None)).returning(|_| {
            Ok(vec![
                moment("braun-t3", Category::Objects, &["Industrial"], 3),
                moment("stripe-press", Category::Branding, &["books"], 2),
            ])
        });
        let svc = service(repo, MockColorExtractor::new());

        let found = assert_ok!(
            svc.list(MomentQuery {
                category: Some("All".into()),
                search: Some("industrial".into()),
            })
            .await
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "braun-t3");
    }

    #[tokio::test]
    async fn list_rejects_unknown_category() {
        let svc = service(MockMomentRepository::new(), MockColorExtractor::new());
        let err = assert_err!(
            svc.list(MomentQuery {
                category: Some("Photos".into()),
                search: None,
            })
            .await
        );
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn related_skips_cross_category_pool_when_same_category_suffices() {
        let source = moment("source", Category::Branding, &["logo"], 10);
        let mut repo = MockMomentRepository::new();
        repo.expect_recent_in_category()
            .with(eq(Category::Branding), eq(source.id), eq(SAME_CATEGORY_POOL))
            .returning(|_, _, _| {
                Ok(vec![
                    moment("a", Category::Branding, &[], 9),
                    moment("b", Category::Branding, &["logo"], 8),
                    moment("c", Category::Branding, &[], 7),
                ])
            });
        repo.expect_recent_outside_category().never();
        let svc = service(repo, MockColorExtractor::new());

        let related = assert_ok!(svc.related(&source, 3).await);
        let slugs: Vec<_> = related.iter().map(|m| m.slug.as_str()).collect();
        assert_eq!(slugs, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn related_widens_to_other_categories_when_short() {
        let source = moment("source", Category::Spaces, &["interior", "retail"], 10);
        let mut repo = MockMomentRepository::new();
        repo.expect_recent_in_category()
            .returning(|_, _, _| Ok(vec![moment("lobby", Category::Spaces, &[], 4)]));
        repo.expect_recent_outside_category()
            .with(eq(Category::Spaces), always(), eq(CROSS_CATEGORY_POOL))
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    moment("shopfront", Category::Branding, &["retail", "interior"], 2),
                    moment("poster", Category::Images, &[], 9),
                ])
            });
        let svc = service(repo, MockColorExtractor::new());

        let related = assert_ok!(svc.related(&source, 3).await);
        let slugs: Vec<_> = related.iter().map(|m| m.slug.as_str()).collect();
        // shopfront: 4, lobby: 1, poster: 0
        assert_eq!(slugs, vec!["shopfront", "lobby", "poster"]);
    }

    #[tokio::test]
    async fn detail_bundles_related_adjacent_and_text_color() {
        let mut repo = MockMomentRepository::new();
        repo.expect_find_by_slug()
            .with(eq("middle"))
            .returning(|_| Ok(Some(moment("middle", Category::Interfaces, &[], 15))));
        repo.expect_recent_in_category().returning(|_, _, _| Ok(vec![]));
        repo.expect_recent_outside_category().returning(|_, _, _| Ok(vec![]));
        repo.expect_adjacent().withf(|published, _| *published == at(15)).returning(|_, _| {
            Ok(Adjacent {
                prev: Some(MomentNav {
                    slug: "earlier".into(),
                    title: "Earlier".into(),
                }),
                next: None,
            })
        });
        let svc = service(repo, MockColorExtractor::new());

        let detail = assert_ok!(svc.detail("middle").await);
        assert_eq!(detail.adjacent.prev.unwrap().slug, "earlier");
        assert!(detail.adjacent.next.is_none());
        assert!(detail.related.is_empty());
        assert_eq!(detail.text_color, "#1a1a1a");
    }

    #[tokio::test]
    async fn detail_of_unknown_slug_is_not_found() {
        let mut repo = MockMomentRepository::new();
        repo.expect_find_by_slug().returning(|_| Ok(None));
        let svc = service(repo, MockColorExtractor::new());
        let err = assert_err!(svc.detail("missing").await);
        assert_eq!(err.to_string(), "moment not found: missing");
    }

    fn create_input() -> MomentInput {
        MomentInput {
            title: Some("Braun T3".into()),
            category: Some("Objects".into()),
            description: Some("Pocket radio.".into()),
            media_url: Some("https://example.com/t3.jpg".into()),
            source_url: Some("https://example.com/t3".into()),
            tags: Some(vec!["radio".to_string(), "radio".to_string()].into()),
            year: Some(1958),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_derives_slug_and_colour() {
        let mut repo = MockMomentRepository::new();
        repo.expect_slug_exists().with(eq("braun-t3")).returning(|_| Ok(false));
        repo.expect_create()
            .withf(|m| m.slug == "braun-t3" && m.tags == vec!["radio"] && m.dominant_color.as_deref() == Some("#d4d0c8"))
            .times(1)
            .returning(|m| {
                let mut stored = moment(&m.slug, m.category, &[], 1);
                stored.tags = m.tags;
                Ok(stored)
            });
        let mut colors = MockColorExtractor::new();
        colors.expect_extract().with(eq("https://example.com/t3.jpg")).returning(|_| "#d4d0c8".into());

        let created = assert_ok!(service(repo, colors).create(create_input()).await);
        assert_eq!(created.slug, "braun-t3");
    }

    #[tokio::test]
    async fn create_refuses_existing_slug() {
        let mut repo = MockMomentRepository::new();
        repo.expect_slug_exists().returning(|_| Ok(true));
        repo.expect_create().never();

        let err = assert_err!(service(repo, MockColorExtractor::new()).create(create_input()).await);
        assert!(matches!(err, DomainError::SlugTaken(slug) if slug == "braun-t3"));
    }

    #[tokio::test]
    async fn update_refreshes_colour_when_media_changes() {
        let mut repo = MockMomentRepository::new();
        repo.expect_update()
            .withf(|slug, c| {
                slug == "braun-t3"
                    && c.dominant_color == Some(Some("#000000".into()))
                    && c.creator_name == Some(None)
                    && c.title.is_none()
            })
            .times(1)
            .returning(|slug, _| Ok(Some(moment(slug, Category::Objects, &[], 1))));
        let mut colors = MockColorExtractor::new();
        colors.expect_extract().returning(|_| "#000000".into());

        let patch: MomentPatch = serde_json::from_str(
            r#"{"mediaUrl": "https://example.com/new.jpg", "creatorName": null}"#,
        )
        .unwrap();
        assert_ok!(service(repo, colors).update("braun-t3", patch).await);
    }

    #[tokio::test]
    async fn update_of_unknown_slug_is_not_found() {
        let mut repo = MockMomentRepository::new();
        repo.expect_update().returning(|_, _| Ok(None));
        let patch = MomentPatch {
            title: Some("New".into()),
            ..Default::default()
        };
        let err = assert_err!(service(repo, MockColorExtractor::new()).update("gone", patch).await);
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: MomentPatch = serde_json::from_str(r#"{"year": null}"#).unwrap();
        assert_eq!(patch.year, Some(None));
        assert_eq!(patch.creator_url, None);
    }

    #[tokio::test]
    async fn delete_reports_missing() {
        let mut repo = MockMomentRepository::new();
        repo.expect_delete().returning(|_| Ok(false));
        let err = assert_err!(service(repo, MockColorExtractor::new()).delete("nope").await);
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[test]
    fn categories_cover_every_variant() {
        let svc = service(MockMomentRepository::new(), MockColorExtractor::new());
        assert_eq!(svc.categories().len(), Category::ALL.len());
    }
}
