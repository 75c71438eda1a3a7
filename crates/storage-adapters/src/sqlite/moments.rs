use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use domains::{
    Adjacent, Category, DomainError, Moment, MomentNav, MomentRepository, MomentUpdate, NewMoment,
    Result,
};

use super::{
    blob_to_uuid, db_err, decode_tags, decode_ts, encode_tags, encode_ts, get, is_unique_violation,
    now, uuid_to_blob, SqliteArchive,
};

const MOMENT_COLUMNS: &str = "id, slug, title, category, description, creator_name, creator_url, \
    source_url, media_url, tags, dominant_color, year, year_approximate, published_at, created_at, updated_at";

pub(super) fn moment_from_row(row: &SqliteRow) -> Result<Moment> {
    Ok(Moment {
        id: blob_to_uuid(&get::<Vec<u8>>(row, "id")?)?,
        slug: get(row, "slug")?,
        title: get(row, "title")?,
        category: get::<String>(row, "category")?.parse()?,
        description: get(row, "description")?,
        creator_name: get(row, "creator_name")?,
        creator_url: get(row, "creator_url")?,
        source_url: get(row, "source_url")?,
        media_url: get(row, "media_url")?,
        tags: decode_tags(&get::<String>(row, "tags")?),
        dominant_color: get(row, "dominant_color")?,
        year: get(row, "year")?,
        year_approximate: get(row, "year_approximate")?,
        published_at: decode_ts(&get::<String>(row, "published_at")?)?,
        created_at: decode_ts(&get::<String>(row, "created_at")?)?,
        updated_at: decode_ts(&get::<String>(row, "updated_at")?)?,
    })
}

fn nav_from_row(row: &SqliteRow) -> Result<MomentNav> {
    Ok(MomentNav {
        slug: get(row, "slug")?,
        title: get(row, "title")?,
    })
}

/// Inserts a Moment on a plain connection or inside a transaction. A slug
/// collision surfaces as `SlugTaken`.
pub(super) async fn insert_moment(conn: &mut SqliteConnection, new: NewMoment) -> Result<Moment> {
    let now = now();
    let moment = Moment {
        id: Uuid::now_v7(),
        slug: new.slug,
        title: new.title,
        category: new.category,
        description: new.description,
        creator_name: new.creator_name,
        creator_url: new.creator_url,
        source_url: new.source_url,
        media_url: new.media_url,
        tags: new.tags,
        dominant_color: new.dominant_color,
        year: new.year,
        year_approximate: new.year_approximate,
        published_at: new.published_at.trunc_subsecs(6),
        created_at: now,
        updated_at: now,
    };

    let sql = format!(
        "INSERT INTO moments ({MOMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    sqlx::query(&sql)
        .bind(uuid_to_blob(moment.id))
        .bind(&moment.slug)
        .bind(&moment.title)
        .bind(moment.category.as_str())
        .bind(&moment.description)
        .bind(&moment.creator_name)
        .bind(&moment.creator_url)
        .bind(&moment.source_url)
        .bind(&moment.media_url)
        .bind(encode_tags(&moment.tags)?)
        .bind(&moment.dominant_color)
        .bind(moment.year)
        .bind(moment.year_approximate)
        .bind(encode_ts(moment.published_at))
        .bind(encode_ts(moment.created_at))
        .bind(encode_ts(moment.updated_at))
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                DomainError::SlugTaken(moment.slug.clone())
            } else {
                DomainError::data("failed to insert moment", err)
            }
        })?;

    Ok(moment)
}

fn apply_update(moment: &mut Moment, changes: MomentUpdate) {
    if let Some(title) = changes.title {
        moment.title = title;
    }
    if let Some(category) = changes.category {
        moment.category = category;
    }
    if let Some(description) = changes.description {
        moment.description = description;
    }
    if let Some(creator_name) = changes.creator_name {
        moment.creator_name = creator_name;
    }
    if let Some(creator_url) = changes.creator_url {
        moment.creator_url = creator_url;
    }
    if let Some(source_url) = changes.source_url {
        moment.source_url = source_url;
    }
    if let Some(media_url) = changes.media_url {
        moment.media_url = media_url;
    }
    if let Some(tags) = changes.tags {
        moment.tags = tags;
    }
    if let Some(dominant_color) = changes.dominant_color {
        moment.dominant_color = dominant_color;
    }
    if let Some(year) = changes.year {
        moment.year = year;
    }
    if let Some(year_approximate) = changes.year_approximate {
        moment.year_approximate = year_approximate;
    }
}

impl SqliteArchive {
    async fn pool_for_category(
        &self,
        comparison: &str,
        category: Category,
        exclude: Uuid,
        limit: u32,
    ) -> Result<Vec<Moment>> {
        let sql = format!(
            "SELECT {MOMENT_COLUMNS} FROM moments WHERE category {comparison} ? AND id != ? \
             ORDER BY published_at DESC, id DESC LIMIT ?"
        );
        sqlx::query(&sql)
            .bind(category.as_str())
            .bind(uuid_to_blob(exclude))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("failed to load related candidates"))?
            .iter()
            .map(moment_from_row)
            .collect()
    }

    async fn neighbour(&self, sql: &str, published_at: DateTime<Utc>, id: Uuid) -> Result<Option<MomentNav>> {
        let at = encode_ts(published_at);
        sqlx::query(sql)
            .bind(&at)
            .bind(&at)
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("failed to load adjacent moment"))?
            .as_ref()
            .map(nav_from_row)
            .transpose()
    }
}

#[async_trait]
impl MomentRepository for SqliteArchive {
    async fn create(&self, moment: NewMoment) -> Result<Moment> {
        let mut conn = self.pool.acquire().await.map_err(db_err("failed to acquire connection"))?;
        insert_moment(&mut conn, moment).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Moment>> {
        let sql = format!("SELECT {MOMENT_COLUMNS} FROM moments WHERE slug = ?");
        sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("failed to load moment"))?
            .as_ref()
            .map(moment_from_row)
            .transpose()
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM moments WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("failed to check slug"))?;
        Ok(count > 0)
    }

    async fn list(&self, category: Option<Category>) -> Result<Vec<Moment>> {
        let rows = match category {
            Some(category) => {
                let sql = format!(
                    "SELECT {MOMENT_COLUMNS} FROM moments WHERE category = ? ORDER BY published_at DESC, id DESC"
                );
                sqlx::query(&sql)
                    .bind(category.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!("SELECT {MOMENT_COLUMNS} FROM moments ORDER BY published_at DESC, id DESC");
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(db_err("failed to list moments"))?;

        rows.iter().map(moment_from_row).collect()
    }

    async fn update(&self, slug: &str, changes: MomentUpdate) -> Result<Option<Moment>> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to begin transaction"))?;

        let sql = format!("SELECT {MOMENT_COLUMNS} FROM moments WHERE slug = ?");
        let Some(row) = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("failed to load moment"))?
        else {
            return Ok(None);
        };

        let mut moment = moment_from_row(&row)?;
        apply_update(&mut moment, changes);
        moment.updated_at = now();

        sqlx::query(
            "UPDATE moments SET title = ?, category = ?, description = ?, creator_name = ?, \
             creator_url = ?, source_url = ?, media_url = ?, tags = ?, dominant_color = ?, \
             year = ?, year_approximate = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&moment.title)
        .bind(moment.category.as_str())
        .bind(&moment.description)
        .bind(&moment.creator_name)
        .bind(&moment.creator_url)
        .bind(&moment.source_url)
        .bind(&moment.media_url)
        .bind(encode_tags(&moment.tags)?)
        .bind(&moment.dominant_color)
        .bind(moment.year)
        .bind(moment.year_approximate)
        .bind(encode_ts(moment.updated_at))
        .bind(uuid_to_blob(moment.id))
        .execute(&mut *tx)
        .await
        .map_err(db_err("failed to update moment"))?;

        tx.commit().await.map_err(db_err("failed to commit moment update"))?;
        Ok(Some(moment))
    }

    async fn delete(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM moments WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await
            .map_err(db_err("failed to delete moment"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, slugs: &[String]) -> Result<u64> {
        if slugs.is_empty() {
            return Ok(0);
        }
        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new("DELETE FROM moments WHERE slug IN (");
        let mut separated = query.separated(", ");
        for slug in slugs {
            separated.push_bind(slug);
        }
        separated.push_unseparated(")");

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_err("failed to delete moments"))?;
        Ok(result.rows_affected())
    }

    async fn recent_in_category(&self, category: Category, exclude: Uuid, limit: u32) -> Result<Vec<Moment>> {
        self.pool_for_category("=", category, exclude, limit).await
    }

    async fn recent_outside_category(&self, category: Category, exclude: Uuid, limit: u32) -> Result<Vec<Moment>> {
        self.pool_for_category("!=", category, exclude, limit).await
    }

    async fn adjacent(&self, published_at: DateTime<Utc>, id: Uuid) -> Result<Adjacent> {
        // (published_at, id) is a total order; v7 ids sort by creation time
        let (prev, next) = tokio::try_join!(
            self.neighbour(
                "SELECT slug, title FROM moments \
                 WHERE published_at < ? OR (published_at = ? AND id < ?) \
                 ORDER BY published_at DESC, id DESC LIMIT 1",
                published_at,
                id,
            ),
            self.neighbour(
                "SELECT slug, title FROM moments \
                 WHERE published_at > ? OR (published_at = ? AND id > ?) \
                 ORDER BY published_at ASC, id ASC LIMIT 1",
                published_at,
                id,
            ),
        )?;
        Ok(Adjacent { prev, next })
    }
}
