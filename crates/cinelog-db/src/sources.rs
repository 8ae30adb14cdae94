//! Watched-source repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cinelog_core::{new_v7, normalize_path, Error, Result, Source, SourceRepository};

const SOURCE_COLUMNS: &str = "id, provider_folder_id, path, cursor, created_at, updated_at";

/// PostgreSQL implementation of SourceRepository.
#[derive(Clone)]
pub struct PgSourceRepository {
    pool: Pool<Postgres>,
}

impl PgSourceRepository {
    /// Create a new PgSourceRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_source_row(row: sqlx::postgres::PgRow) -> Source {
        Source {
            id: row.get("id"),
            provider_folder_id: row.get("provider_folder_id"),
            path: row.get("path"),
            cursor: row.get("cursor"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl SourceRepository for PgSourceRepository {
    async fn create(&self, provider_folder_id: &str, path: &str) -> Result<Source> {
        let id = new_v7();
        let now = Utc::now();
        let normalized = normalize_path(path);

        let row = sqlx::query(&format!(
            "INSERT INTO sources (id, provider_folder_id, path, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING {SOURCE_COLUMNS}"
        ))
        .bind(id)
        .bind(provider_folder_id)
        .bind(&normalized)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_source_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Source>> {
        let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_source_row))
    }

    async fn list(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources ORDER BY path ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_source_row).collect())
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<Source>> {
        let normalized = normalize_path(path);
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE lower(path) = lower($1)"
        ))
        .bind(&normalized)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_source_row))
    }

    async fn update_cursor(&self, id: Uuid, cursor: &str) -> Result<()> {
        sqlx::query("UPDATE sources SET cursor = $1, updated_at = $2 WHERE id = $3")
            .bind(cursor)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
