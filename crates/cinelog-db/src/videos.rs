//! Video catalog repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cinelog_core::{
    new_v7, Error, NewVideo, Result, TranscriptSegment, Video, VideoEnrichment, VideoRepository,
    VideoStatus,
};

const VIDEO_COLUMNS: &str = "id, source_id, provider_file_id, path, filename, status::text, \
    file_sha256, file_size, duration_sec, fps, resolution, codec, \
    transcript_text, transcript_segments, keyframe_urls, phash_keyframes, audio_fingerprint, \
    summary, suggested_title, suggested_description, genre, styles, tags, \
    youtube_id, vimeo_id, youtube_published_at, vimeo_published_at, \
    created_at, updated_at";

/// PostgreSQL implementation of VideoRepository.
#[derive(Clone)]
pub struct PgVideoRepository {
    pool: Pool<Postgres>,
}

impl PgVideoRepository {
    /// Create a new PgVideoRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn json_string_list(value: Option<JsonValue>) -> Vec<String> {
        value
            .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
            .unwrap_or_default()
    }

    fn parse_video_row(row: sqlx::postgres::PgRow) -> Video {
        let status: String = row.get("status");
        let segments: Option<JsonValue> = row.get("transcript_segments");
        Video {
            id: row.get("id"),
            source_id: row.get("source_id"),
            provider_file_id: row.get("provider_file_id"),
            path: row.get("path"),
            filename: row.get("filename"),
            status: VideoStatus::parse(&status).unwrap_or(VideoStatus::PendingIngest),
            file_sha256: row.get("file_sha256"),
            file_size: row.get("file_size"),
            duration_sec: row.get("duration_sec"),
            fps: row.get("fps"),
            resolution: row.get("resolution"),
            codec: row.get("codec"),
            transcript_text: row.get("transcript_text"),
            transcript_segments: segments
                .and_then(|v| serde_json::from_value::<Vec<TranscriptSegment>>(v).ok())
                .unwrap_or_default(),
            keyframe_urls: Self::json_string_list(row.get("keyframe_urls")),
            phash_keyframes: Self::json_string_list(row.get("phash_keyframes")),
            audio_fingerprint: row.get("audio_fingerprint"),
            summary: row.get("summary"),
            suggested_title: row.get("suggested_title"),
            suggested_description: row.get("suggested_description"),
            genre: row.get("genre"),
            styles: Self::json_string_list(row.get("styles")),
            tags: Self::json_string_list(row.get("tags")),
            youtube_id: row.get("youtube_id"),
            vimeo_id: row.get("vimeo_id"),
            youtube_published_at: row.get("youtube_published_at"),
            vimeo_published_at: row.get("vimeo_published_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn insert_discovered(&self, new: &NewVideo) -> Result<Uuid> {
        let video_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO videos (id, source_id, provider_file_id, path, filename, status,
                                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 'pending_ingest'::video_status, $6, $6)",
        )
        .bind(video_id)
        .bind(new.source_id)
        .bind(&new.provider_file_id)
        .bind(&new.path)
        .bind(&new.filename)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(video_id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Video>> {
        let row = sqlx::query(&format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_video_row))
    }

    async fn find_by_provider_file_id(&self, provider_file_id: &str) -> Result<Option<Uuid>> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM videos WHERE provider_file_id = $1")
                .bind(provider_file_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(id)
    }

    async fn find_by_sha256(&self, sha256: &str, exclude: Uuid) -> Result<Option<Uuid>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM videos WHERE file_sha256 = $1 AND id <> $2 LIMIT 1",
        )
        .bind(sha256)
        .bind(exclude)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: VideoStatus,
        to: VideoStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidInput(format!(
                "illegal video status transition {from} -> {to}"
            )));
        }

        let result = sqlx::query(
            "UPDATE videos SET status = $1::video_status, updated_at = $2
             WHERE id = $3 AND status = $4::video_status",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn apply_enrichment(&self, id: Uuid, enrichment: &VideoEnrichment) -> Result<()> {
        let segments = serde_json::to_value(&enrichment.transcript_segments)?;
        let keyframes = serde_json::to_value(&enrichment.keyframe_urls)?;
        let styles = serde_json::to_value(&enrichment.styles)?;
        let tags = serde_json::to_value(&enrichment.tags)?;

        sqlx::query(
            "UPDATE videos SET
                file_sha256 = $1,
                file_size = $2,
                duration_sec = $3,
                fps = $4,
                resolution = $5,
                codec = $6,
                transcript_text = $7,
                transcript_segments = $8,
                keyframe_urls = $9,
                summary = $10,
                suggested_title = $11,
                suggested_description = $12,
                genre = $13,
                styles = $14,
                tags = $15,
                updated_at = $16
             WHERE id = $17",
        )
        .bind(&enrichment.file_sha256)
        .bind(enrichment.file_size)
        .bind(enrichment.duration_sec)
        .bind(enrichment.fps)
        .bind(&enrichment.resolution)
        .bind(&enrichment.codec)
        .bind(&enrichment.transcript_text)
        .bind(segments)
        .bind(keyframes)
        .bind(&enrichment.summary)
        .bind(&enrichment.suggested_title)
        .bind(&enrichment.suggested_description)
        .bind(&enrichment.genre)
        .bind(styles)
        .bind(tags)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}
