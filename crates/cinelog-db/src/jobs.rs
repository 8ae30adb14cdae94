//! Job queue repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cinelog_core::{new_v7, Error, Job, JobRepository, JobStatus, JobType, QueueStats, Result};

const JOB_COLUMNS: &str = "id, video_id, job_type::text, status::text, payload, result, error, \
                           retry_count, max_retries, created_at, started_at, completed_at";

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        let job_type: String = row.get("job_type");
        let status: String = row.get("status");
        Job {
            id: row.get("id"),
            video_id: row.get("video_id"),
            // Unknown enum text cannot come back from a CHECK'd enum column.
            job_type: JobType::parse(&job_type).unwrap_or(JobType::Process),
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
            payload: row.get("payload"),
            result: row.get("result"),
            error: row.get("error"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn enqueue(
        &self,
        video_id: Option<Uuid>,
        job_type: JobType,
        payload: Option<JsonValue>,
        max_retries: i32,
    ) -> Result<Uuid> {
        let job_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO jobs (id, video_id, job_type, status, payload, max_retries, created_at)
             VALUES ($1, $2, $3::job_type, 'pending'::job_status, $4, $5, $6)",
        )
        .bind(job_id)
        .bind(video_id)
        .bind(job_type.as_str())
        .bind(&payload)
        .bind(max_retries)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(job_id)
    }

    async fn claim_next_for_types(&self, types: &[JobType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let type_strings: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();

        // Claim-then-work with FOR UPDATE SKIP LOCKED: safe under multiple
        // workers even though one is the normal deployment. Filter by type
        // before locking; empty array = claim any type.
        let row = sqlx::query(&format!(
            "UPDATE jobs
             SET status = 'running'::job_status, started_at = $1
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'pending'::job_status
                   AND (cardinality($2::text[]) = 0 OR job_type::text = ANY($2))
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(&type_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let now = Utc::now();

        // done is only reachable from running; a pending job must be
        // claimed first.
        let updated = sqlx::query(
            "UPDATE jobs
             SET status = 'done'::job_status, completed_at = $1, result = $2
             WHERE id = $3 AND status = 'running'::job_status",
        )
        .bind(now)
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            return Err(Error::Job(format!(
                "job {job_id} is not running, refusing to complete"
            )));
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (status, retry_count, max_retries): (String, i32, i32) = sqlx::query_as(
            "SELECT status::text, retry_count, max_retries FROM jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        // failed is only reachable from running, same as done.
        if status != "running" {
            return Err(Error::Job(format!(
                "job {job_id} is {status}, refusing to fail"
            )));
        }

        if retry_count < max_retries {
            // Retry: reset to pending with incremented retry count
            sqlx::query(
                "UPDATE jobs
                 SET status = 'pending'::job_status, retry_count = $1, error = $2,
                     started_at = NULL
                 WHERE id = $3",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            sqlx::query(
                "UPDATE jobs
                 SET status = 'failed'::job_status, completed_at = $1, error = $2
                 WHERE id = $3",
            )
            .bind(now)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn list_for_video(&self, video_id: Uuid) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE video_id = $1 ORDER BY created_at DESC"
        ))
        .bind(video_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'running') AS running,
                COUNT(*) FILTER (WHERE status = 'done') AS done,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
             FROM jobs",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            running: row.get::<i64, _>("running"),
            done: row.get::<i64, _>("done"),
            failed: row.get::<i64, _>("failed"),
        })
    }

    async fn requeue_stale_running(&self, older_than_secs: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'pending'::job_status, started_at = NULL
             WHERE status = 'running'::job_status
               AND started_at < now() - ($1::bigint * interval '1 second')",
        )
        .bind(older_than_secs)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
