//! # Domain Models
//!
//! Published Moments, visitor Submissions and the closed category set.
//! Ids are UUID v7, so sorting by id follows creation time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Display colour used whenever the dominant colour of a media file cannot be derived.
pub const FALLBACK_DOMINANT_COLOR: &str = "#1a1a1a";

/// The fixed set of archive categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Branding,
    Images,
    Interfaces,
    Objects,
    Spaces,
    Typography,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Branding,
        Category::Images,
        Category::Interfaces,
        Category::Objects,
        Category::Spaces,
        Category::Typography,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Branding => "Branding",
            Category::Images => "Images",
            Category::Interfaces => "Interfaces",
            Category::Objects => "Objects",
            Category::Spaces => "Spaces",
            Category::Typography => "Typography",
        }
    }

    /// Short curator-facing description of what belongs in the category.
    pub fn description(&self) -> &'static str {
        match self {
            Category::Branding => "logos, identity systems, brand guidelines",
            Category::Images => "photography, illustration, posters, visual art",
            Category::Interfaces => "web design, apps, product UI, dashboards",
            Category::Objects => "physical products, hardware, packaging",
            Category::Spaces => "architecture, interiors, retail environments",
            Category::Typography => "typefaces, lettering, type systems",
        }
    }

    /// Starter tags offered to curators when filing a moment under this category.
    pub fn tag_suggestions(&self) -> &'static [&'static str] {
        match self {
            Category::Branding => &["logo", "identity", "guidelines", "rebrand", "wordmark", "visual-identity"],
            Category::Images => &["photography", "illustration", "poster", "print", "editorial", "visual"],
            Category::Interfaces => &["web", "app", "ui", "dashboard", "saas", "mobile", "product"],
            Category::Objects => &["hardware", "packaging", "product", "industrial", "physical"],
            Category::Spaces => &["architecture", "interior", "retail", "exhibition", "environment"],
            Category::Typography => &["typeface", "lettering", "variable", "specimen", "font", "type"],
        }
    }

    fn valid_names() -> String {
        Self::ALL.iter().map(Category::as_str).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "invalid category; must be one of: {}",
                    Self::valid_names()
                ))
            })
    }
}

/// A single published archive entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moment {
    pub id: Uuid,
    /// URL-safe identifier derived from the title; immutable once created
    pub slug: String,
    pub title: String,
    pub category: Category,
    /// Curator's editorial text
    pub description: String,
    pub creator_name: Option<String>,
    pub creator_url: Option<String>,
    pub source_url: String,
    /// Image, gif or video
    pub media_url: String,
    pub tags: Vec<String>,
    /// Hex colour derived from the media, used as a display hint
    pub dominant_color: Option<String>,
    pub year: Option<i32>,
    pub year_approximate: bool,
    /// Drives gallery ordering and adjacency
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Moment {
    /// "2024" for an exact year, "1990s" for an approximate one.
    pub fn display_year(&self) -> Option<String> {
        self.year.map(|year| {
            if self.year_approximate {
                format!("{year}s")
            } else {
                year.to_string()
            }
        })
    }

    pub fn nav(&self) -> MomentNav {
        MomentNav {
            slug: self.slug.clone(),
            title: self.title.clone(),
        }
    }
}

/// Everything needed to insert a Moment; ids and audit timestamps are assigned by the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMoment {
    pub slug: String,
    pub title: String,
    pub category: Category,
    pub description: String,
    pub creator_name: Option<String>,
    pub creator_url: Option<String>,
    pub source_url: String,
    pub media_url: String,
    pub tags: Vec<String>,
    pub dominant_color: Option<String>,
    pub year: Option<i32>,
    pub year_approximate: bool,
    pub published_at: DateTime<Utc>,
}

/// Partial curator edit. `None` leaves a field untouched; for nullable
/// columns `Some(None)` clears the value. The slug is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MomentUpdate {
    pub title: Option<String>,
    pub category: Option<Category>,
    pub description: Option<String>,
    pub creator_name: Option<Option<String>>,
    pub creator_url: Option<Option<String>>,
    pub source_url: Option<String>,
    pub media_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub dominant_color: Option<Option<String>>,
    pub year: Option<Option<i32>>,
    pub year_approximate: Option<bool>,
}

impl MomentUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Minimal reference used by the gallery walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentNav {
    pub slug: String,
    pub title: String,
}

/// Immediate chronological neighbours of a publish timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjacent {
    /// Latest entry published strictly before
    pub prev: Option<MomentNav>,
    /// Earliest entry published strictly after
    pub next: Option<MomentNav>,
}

/// Review state of a submission. Transitions only ever leave `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "PENDING",
            SubmissionStatus::Approved => "APPROVED",
            SubmissionStatus::Rejected => "REJECTED",
        }
    }

    /// Lowercase form used in "already approved" style messages.
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(SubmissionStatus::Pending),
            "APPROVED" => Ok(SubmissionStatus::Approved),
            "REJECTED" => Ok(SubmissionStatus::Rejected),
            other => Err(DomainError::Validation(format!(
                "invalid status '{other}'; must be one of: PENDING, APPROVED, REJECTED"
            ))),
        }
    }
}

/// A visitor-nominated candidate awaiting curator review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub media_url: String,
    pub source_url: String,
    pub creator_name: String,
    pub creator_url: Option<String>,
    /// Suggested by the submitter; the curator supplies the final title on approval
    pub title: Option<String>,
    pub description: Option<String>,
    pub submitter_note: Option<String>,
    /// Stored for abuse tracking
    pub submitter_ip: String,
    pub status: SubmissionStatus,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
    /// Set on approval, links to the resulting Moment
    pub moment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A validated submission ready to be persisted as `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub media_url: String,
    pub source_url: String,
    pub creator_name: String,
    pub creator_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub submitter_note: Option<String>,
    pub submitter_ip: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moment(year: Option<i32>, approximate: bool) -> Moment {
        let now = Utc::now();
        Moment {
            id: Uuid::now_v7(),
            slug: "stripe-press".into(),
            title: "Stripe Press".into(),
            category: Category::Branding,
            description: "Covers".into(),
            creator_name: None,
            creator_url: None,
            source_url: "https://press.stripe.com".into(),
            media_url: "https://example.com/a.jpg".into(),
            tags: vec![],
            dominant_color: None,
            year,
            year_approximate: approximate,
            published_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn category_parses_exact_names_only() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        let err = "branding".parse::<Category>().unwrap_err();
        assert!(err.to_string().contains("Typography"));
        assert!("Photos".parse::<Category>().is_err());
    }

    #[test]
    fn every_category_has_description_and_suggestions() {
        for category in Category::ALL {
            assert!(!category.description().is_empty());
            assert!(!category.tag_suggestions().is_empty());
        }
    }

    #[test]
    fn display_year_marks_approximate_decades() {
        assert_eq!(moment(Some(2024), false).display_year().as_deref(), Some("2024"));
        assert_eq!(moment(Some(1990), true).display_year().as_deref(), Some("1990s"));
        assert_eq!(moment(None, true).display_year(), None);
    }

    #[test]
    fn submission_status_round_trips_through_wire_names() {
        assert_eq!(
            serde_json::to_string(&SubmissionStatus::Approved).unwrap(),
            "\"APPROVED\""
        );
        assert_eq!("pending".parse::<SubmissionStatus>().unwrap(), SubmissionStatus::Pending);
        assert!("archived".parse::<SubmissionStatus>().is_err());
        assert!(SubmissionStatus::Rejected.is_terminal());
        assert!(!SubmissionStatus::Pending.is_terminal());
    }

    #[test]
    fn moment_serializes_camel_case() {
        let json = serde_json::to_value(moment(None, false)).unwrap();
        assert!(json.get("mediaUrl").is_some());
        assert!(json.get("publishedAt").is_some());
        assert_eq!(json["category"], "Branding");
    }
}
