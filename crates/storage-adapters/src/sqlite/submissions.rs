use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use uuid::Uuid;

use domains::{
    DomainError, Moment, NewMoment, NewSubmission, Result, Submission, SubmissionRepository,
    SubmissionStatus,
};

use super::moments::insert_moment;
use super::{blob_to_uuid, db_err, decode_ts, encode_ts, get, now, uuid_to_blob, SqliteArchive};

const SUBMISSION_COLUMNS: &str = "id, media_url, source_url, creator_name, creator_url, title, \
    description, submitter_note, submitter_ip, status, reviewed_at, review_note, moment_id, created_at";

fn submission_from_row(row: &SqliteRow) -> Result<Submission> {
    Ok(Submission {
        id: blob_to_uuid(&get::<Vec<u8>>(row, "id")?)?,
        media_url: get(row, "media_url")?,
        source_url: get(row, "source_url")?,
        creator_name: get(row, "creator_name")?,
        creator_url: get(row, "creator_url")?,
        title: get(row, "title")?,
        description: get(row, "description")?,
        submitter_note: get(row, "submitter_note")?,
        submitter_ip: get(row, "submitter_ip")?,
        status: get::<String>(row, "status")?.parse()?,
        reviewed_at: get::<Option<String>>(row, "reviewed_at")?
            .as_deref()
            .map(decode_ts)
            .transpose()?,
        review_note: get(row, "review_note")?,
        moment_id: get::<Option<Vec<u8>>>(row, "moment_id")?
            .as_deref()
            .map(blob_to_uuid)
            .transpose()?,
        created_at: decode_ts(&get::<String>(row, "created_at")?)?,
    })
}

async fn load(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Submission>> {
    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?");
    sqlx::query(&sql)
        .bind(uuid_to_blob(id))
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err("failed to load submission"))?
        .as_ref()
        .map(submission_from_row)
        .transpose()
}

/// Loads a submission that must still be pending.
async fn load_pending(conn: &mut SqliteConnection, id: Uuid) -> Result<Submission> {
    let submission = load(conn, id)
        .await?
        .ok_or_else(|| DomainError::not_found("submission", id))?;
    if submission.status.is_terminal() {
        return Err(DomainError::AlreadyReviewed(submission.status));
    }
    Ok(submission)
}

#[async_trait]
impl SubmissionRepository for SqliteArchive {
    async fn create(&self, new: NewSubmission) -> Result<Submission> {
        let submission = Submission {
            id: Uuid::now_v7(),
            media_url: new.media_url,
            source_url: new.source_url,
            creator_name: new.creator_name,
            creator_url: new.creator_url,
            title: new.title,
            description: new.description,
            submitter_note: new.submitter_note,
            submitter_ip: new.submitter_ip,
            status: SubmissionStatus::Pending,
            reviewed_at: None,
            review_note: None,
            moment_id: None,
            created_at: now(),
        };

        let sql = format!(
            "INSERT INTO submissions ({SUBMISSION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL, ?)"
        );
        sqlx::query(&sql)
            .bind(uuid_to_blob(submission.id))
            .bind(&submission.media_url)
            .bind(&submission.source_url)
            .bind(&submission.creator_name)
            .bind(&submission.creator_url)
            .bind(&submission.title)
            .bind(&submission.description)
            .bind(&submission.submitter_note)
            .bind(&submission.submitter_ip)
            .bind(submission.status.as_str())
            .bind(encode_ts(submission.created_at))
            .execute(&self.pool)
            .await
            .map_err(db_err("failed to insert submission"))?;

        Ok(submission)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Submission>> {
        let mut conn = self.pool.acquire().await.map_err(db_err("failed to acquire connection"))?;
        load(&mut conn, id).await
    }

    async fn list(&self, status: Option<SubmissionStatus>) -> Result<Vec<Submission>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE status = ? ORDER BY created_at DESC, id DESC"
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions ORDER BY created_at DESC, id DESC");
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(db_err("failed to list submissions"))?;

        rows.iter().map(submission_from_row).collect()
    }

    async fn count_by_status(&self, status: SubmissionStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM submissions WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("failed to count submissions"))?;
        Ok(count.max(0) as u64)
    }

    /// Atomic operation to publish a Moment and close its submission.
    ///
    /// Both writes share one transaction; returning early drops it, which
    /// rolls back the Moment insert.
    async fn approve(&self, id: Uuid, moment: NewMoment) -> Result<(Submission, Moment)> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to begin transaction"))?;

        load_pending(&mut tx, id).await?;
        let moment = insert_moment(&mut tx, moment).await?;

        let result = sqlx::query(
            "UPDATE submissions SET status = ?, reviewed_at = ?, moment_id = ? WHERE id = ? AND status = ?",
        )
        .bind(SubmissionStatus::Approved.as_str())
        .bind(encode_ts(now()))
        .bind(uuid_to_blob(moment.id))
        .bind(uuid_to_blob(id))
        .bind(SubmissionStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err("failed to mark submission approved"))?;

        if result.rows_affected() == 0 {
            // lost a race with another reviewer
            let current = load(&mut tx, id).await?.map(|s| s.status);
            return Err(match current {
                Some(status) => DomainError::AlreadyReviewed(status),
                None => DomainError::not_found("submission", id),
            });
        }

        let submission = load(&mut tx, id)
            .await?
            .ok_or_else(|| DomainError::not_found("submission", id))?;
        tx.commit().await.map_err(db_err("failed to commit approval"))?;
        Ok((submission, moment))
    }

    async fn mark_rejected(&self, id: Uuid, review_note: Option<String>) -> Result<Submission> {
        let mut tx = self.pool.begin().await.map_err(db_err("failed to begin transaction"))?;

        let mut submission = load_pending(&mut tx, id).await?;
        let reviewed_at = now();

        sqlx::query("UPDATE submissions SET status = ?, reviewed_at = ?, review_note = ? WHERE id = ?")
            .bind(SubmissionStatus::Rejected.as_str())
            .bind(encode_ts(reviewed_at))
            .bind(&review_note)
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await
            .map_err(db_err("failed to mark submission rejected"))?;

        tx.commit().await.map_err(db_err("failed to commit rejection"))?;

        submission.status = SubmissionStatus::Rejected;
        submission.reviewed_at = Some(reviewed_at);
        submission.review_note = review_note;
        Ok(submission)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(db_err("failed to delete submission"))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("submission", id));
        }
        Ok(())
    }
}
