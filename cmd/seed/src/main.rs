//! # seed
//!
//! Loads a starter set of moments into the configured database. Existing
//! slugs are updated in place, so the tool can be run repeatedly.

use std::time::Duration;

use anyhow::Context;
use chrono::{Duration as Days, Utc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use configs::Settings;
use domains::{Category, ColorExtractor, MomentRepository, MomentUpdate, NewMoment};
use storage_adapters::{DominantColorExtractor, SqliteArchive};

struct SeedMoment {
    slug: &'static str,
    title: &'static str,
    category: Category,
    creator_name: &'static str,
    creator_url: Option<&'static str>,
    source_url: &'static str,
    media_url: &'static str,
    description: &'static str,
    tags: &'static [&'static str],
}

const MOMENTS: &[SeedMoment] = &[
    SeedMoment {
        slug: "linear-2024-release-page",
        title: "Linear 2024 Release Page",
        category: Category::Interfaces,
        creator_name: "Linear",
        creator_url: Some("https://linear.app"),
        source_url: "https://linear.app/releases/2024-01",
        media_url: "https://images.unsplash.com/photo-1618005182384-a83a8bd57fbe?w=800&q=80",
        description: "Linear's release pages are a masterclass in restraint. Massive release numbers, tight spacing and just enough colour to guide the eye.",
        tags: &["product", "typography", "dark-mode", "saas"],
    },
    SeedMoment {
        slug: "stripe-press-books",
        title: "Stripe Press Book Covers",
        category: Category::Branding,
        creator_name: "Stripe Press",
        creator_url: Some("https://press.stripe.com"),
        source_url: "https://press.stripe.com",
        media_url: "https://images.unsplash.com/photo-1544716278-ca5e3f4abd8c?w=800&q=80",
        description: "Every Stripe Press cover follows the same grid but feels entirely unique. The constraint breeds creativity.",
        tags: &["books", "editorial", "geometric", "color"],
    },
    SeedMoment {
        slug: "teenage-engineering-op-1",
        title: "Teenage Engineering OP-1 Field",
        category: Category::Objects,
        creator_name: "Teenage Engineering",
        creator_url: Some("https://teenage.engineering"),
        source_url: "https://teenage.engineering/products/op-1-field",
        media_url: "https://images.unsplash.com/photo-1558618666-fcd25c85cd64?w=800&q=80",
        description: "Chunky knobs, a screen that shows only what matters, and a product page that lets the object speak for itself.",
        tags: &["hardware", "minimal", "interface", "music"],
    },
    SeedMoment {
        slug: "monocle-magazine-covers",
        title: "Monocle Magazine Covers",
        category: Category::Images,
        creator_name: "Monocle",
        creator_url: Some("https://monocle.com"),
        source_url: "https://monocle.com/magazine/",
        media_url: "https://images.unsplash.com/photo-1586075010923-2dd4570fb338?w=800&q=80",
        description: "The masthead never moves and the photography is always singular. A magazine that knows exactly what it is.",
        tags: &["editorial", "photography", "magazine", "print"],
    },
    SeedMoment {
        slug: "muji-product-photography",
        title: "MUJI Product Photography",
        category: Category::Images,
        creator_name: "MUJI",
        creator_url: Some("https://muji.com"),
        source_url: "https://www.muji.com/us/",
        media_url: "https://images.unsplash.com/photo-1600585154340-be6161a56a0c?w=800&q=80",
        description: "Soft shadows, neutral backgrounds and compositions that put utility ahead of desire.",
        tags: &["retail", "minimal", "japanese", "lifestyle"],
    },
    SeedMoment {
        slug: "apple-typography-system",
        title: "Apple's San Francisco Type System",
        category: Category::Typography,
        creator_name: "Apple",
        creator_url: Some("https://apple.com"),
        source_url: "https://developer.apple.com/fonts/",
        media_url: "https://images.unsplash.com/photo-1611532736597-de2d4265fba3?w=800&q=80",
        description: "Optical sizes and variable weights that scale from watch to billboard. Typography that serves rather than performs.",
        tags: &["typeface", "system", "variable-font", "tech"],
    },
    SeedMoment {
        slug: "arc-browser-spaces",
        title: "Arc Browser Spaces",
        category: Category::Interfaces,
        creator_name: "The Browser Company",
        creator_url: Some("https://arc.net"),
        source_url: "https://arc.net",
        media_url: "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=800&q=80",
        description: "Browser chrome reimagined as a living sidebar. Spaces give you context without complexity.",
        tags: &["browser", "productivity", "interface", "color"],
    },
    SeedMoment {
        slug: "notion-empty-states",
        title: "Notion's Empty States",
        category: Category::Images,
        creator_name: "Notion",
        creator_url: Some("https://notion.so"),
        source_url: "https://notion.so",
        media_url: "https://images.unsplash.com/photo-1618556450994-a163b1f2575f?w=800&q=80",
        description: "Empty states as invitations rather than dead ends. Illustrations with personality that never feel precious.",
        tags: &["illustration", "onboarding", "character", "saas"],
    },
    SeedMoment {
        slug: "aesop-store-interiors",
        title: "Aesop Store Interiors",
        category: Category::Spaces,
        creator_name: "Aesop",
        creator_url: Some("https://aesop.com"),
        source_url: "https://www.aesop.com/us/r/aesop-spaces",
        media_url: "https://images.unsplash.com/photo-1600585154526-990dced4db0d?w=800&q=80",
        description: "Local materials and local architects, yet every store is unmistakably Aesop. Retail as slow experience.",
        tags: &["retail", "architecture", "experiential", "luxury"],
    },
    SeedMoment {
        slug: "vercel-ship-conference",
        title: "Vercel Ship 2024",
        category: Category::Spaces,
        creator_name: "Vercel",
        creator_url: Some("https://vercel.com"),
        source_url: "https://vercel.com/ship",
        media_url: "https://images.unsplash.com/photo-1540575467063-178a50c2df87?w=800&q=80",
        description: "Conference branding that does not look like every other tech conference. Bold identity, theatrical stage.",
        tags: &["conference", "web", "identity", "tech"],
    },
    SeedMoment {
        slug: "dieter-rams-ten-principles",
        title: "Dieter Rams: Ten Principles",
        category: Category::Objects,
        creator_name: "Dieter Rams",
        creator_url: None,
        source_url: "https://www.vitsoe.com/us/about/good-design",
        media_url: "https://images.unsplash.com/photo-1558618047-3c8c76ca7d13?w=800&q=80",
        description: "Good design is as little design as possible. Ten principles that are less rules than a way of seeing.",
        tags: &["principles", "industrial-design", "classic", "philosophy"],
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load().context("failed to load settings")?;
    let archive = SqliteArchive::connect(&settings.database.url, 1).await?;
    archive.migrate().await?;
    let colors = DominantColorExtractor::new(Duration::from_secs(settings.color.fetch_timeout_secs))?;

    // Oldest first, one day apart, so the gallery walk has a stable order.
    let newest = Utc::now();
    let total = MOMENTS.len() as i64;
    let (mut created, mut updated) = (0, 0);

    for (index, seed) in MOMENTS.iter().enumerate() {
        let color = colors.extract(seed.media_url).await;
        info!(slug = seed.slug, %color, "extracted dominant colour");
        let tags: Vec<String> = seed.tags.iter().map(|t| t.to_string()).collect();

        if archive.slug_exists(seed.slug).await? {
            let changes = MomentUpdate {
                title: Some(seed.title.into()),
                category: Some(seed.category),
                description: Some(seed.description.into()),
                creator_name: Some(Some(seed.creator_name.into())),
                creator_url: Some(seed.creator_url.map(str::to_string)),
                source_url: Some(seed.source_url.into()),
                media_url: Some(seed.media_url.into()),
                tags: Some(tags),
                dominant_color: Some(Some(color)),
                ..MomentUpdate::default()
            };
            archive.update(seed.slug, changes).await?;
            updated += 1;
            continue;
        }

        archive
            .create(NewMoment {
                slug: seed.slug.into(),
                title: seed.title.into(),
                category: seed.category,
                description: seed.description.into(),
                creator_name: Some(seed.creator_name.into()),
                creator_url: seed.creator_url.map(str::to_string),
                source_url: seed.source_url.into(),
                media_url: seed.media_url.into(),
                tags,
                dominant_color: Some(color),
                year: None,
                year_approximate: false,
                published_at: newest - Days::days(total - 1 - index as i64),
            })
            .await?;
        created += 1;
    }

    info!(created, updated, "seeding complete");
    Ok(())
}
