//! Duplicate-link repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cinelog_core::{Duplicate, DuplicateReason, DuplicateRepository, Error, NewDuplicate, Result};

/// PostgreSQL implementation of DuplicateRepository.
#[derive(Clone)]
pub struct PgDuplicateRepository {
    pool: Pool<Postgres>,
}

impl PgDuplicateRepository {
    /// Create a new PgDuplicateRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_duplicate_row(row: sqlx::postgres::PgRow) -> Duplicate {
        let reason: String = row.get("reason");
        Duplicate {
            video_id: row.get("video_id"),
            duplicate_video_id: row.get("duplicate_video_id"),
            score: row.get("score"),
            reason: DuplicateReason::parse(&reason).unwrap_or(DuplicateReason::ExactHash),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl DuplicateRepository for PgDuplicateRepository {
    async fn upsert(&self, dup: &NewDuplicate) -> Result<()> {
        // Re-detection must be a no-op on the row count; the latest score
        // and reason win.
        sqlx::query(
            "INSERT INTO duplicates (video_id, duplicate_video_id, score, reason, created_at)
             VALUES ($1, $2, $3, $4::duplicate_reason, $5)
             ON CONFLICT (video_id, duplicate_video_id)
             DO UPDATE SET score = EXCLUDED.score, reason = EXCLUDED.reason",
        )
        .bind(dup.video_id)
        .bind(dup.duplicate_video_id)
        .bind(dup.score)
        .bind(dup.reason.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn list_for_video(&self, video_id: Uuid) -> Result<Vec<Duplicate>> {
        let rows = sqlx::query(
            "SELECT video_id, duplicate_video_id, score, reason::text, created_at
             FROM duplicates
             WHERE video_id = $1 OR duplicate_video_id = $1
             ORDER BY score DESC, created_at ASC",
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_duplicate_row).collect())
    }
}
