//! In-memory repository implementations for tests.
//!
//! Mirror the Postgres repositories' observable semantics (claim ordering,
//! retry budgets, CAS status transitions) so sync and pipeline logic can be
//! exercised without a database. Always compiled so integration tests under
//! `tests/` can use them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use cinelog_core::{
    normalize_path, paths_equal, Duplicate, DuplicateRepository, Error, Job, JobRepository,
    JobStatus, JobType, NewDuplicate, NewVideo, QueueStats, Result, Source, SourceRepository,
    Video, VideoEnrichment, VideoRepository, VideoStatus,
};

/// In-memory `SourceRepository`.
#[derive(Default)]
pub struct MemorySourceRepository {
    sources: Mutex<Vec<Source>>,
}

impl MemorySourceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceRepository for MemorySourceRepository {
    async fn create(&self, provider_folder_id: &str, path: &str) -> Result<Source> {
        let path = normalize_path(path);
        let mut sources = self.sources.lock().unwrap();
        if sources.iter().any(|s| paths_equal(&s.path, &path)) {
            return Err(Error::InvalidInput(format!(
                "source already exists for {path}"
            )));
        }
        let now = Utc::now();
        let source = Source {
            id: cinelog_core::new_v7(),
            provider_folder_id: provider_folder_id.to_string(),
            path,
            cursor: None,
            created_at: now,
            updated_at: now,
        };
        sources.push(source.clone());
        Ok(source)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Source>> {
        Ok(self
            .sources
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Source>> {
        Ok(self.sources.lock().unwrap().clone())
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<Source>> {
        let path = normalize_path(path);
        Ok(self
            .sources
            .lock()
            .unwrap()
            .iter()
            .find(|s| paths_equal(&s.path, &path))
            .cloned())
    }

    async fn update_cursor(&self, id: Uuid, cursor: &str) -> Result<()> {
        let mut sources = self.sources.lock().unwrap();
        let source = sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("source {id}")))?;
        source.cursor = Some(cursor.to_string());
        source.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut sources = self.sources.lock().unwrap();
        let before = sources.len();
        sources.retain(|s| s.id != id);
        Ok(sources.len() < before)
    }
}

/// In-memory `VideoRepository`.
#[derive(Default)]
pub struct MemoryVideoRepository {
    videos: Mutex<HashMap<Uuid, Video>>,
}

impl MemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored videos, for assertions.
    pub fn all(&self) -> Vec<Video> {
        self.videos.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn insert_discovered(&self, new: &NewVideo) -> Result<Uuid> {
        let mut videos = self.videos.lock().unwrap();
        if videos
            .values()
            .any(|v| v.provider_file_id == new.provider_file_id)
        {
            return Err(Error::InvalidInput(format!(
                "video already exists for provider file {}",
                new.provider_file_id
            )));
        }
        let id = cinelog_core::new_v7();
        let now = Utc::now();
        videos.insert(
            id,
            Video {
                id,
                source_id: new.source_id,
                provider_file_id: new.provider_file_id.clone(),
                path: new.path.clone(),
                filename: new.filename.clone(),
                status: VideoStatus::PendingIngest,
                file_sha256: None,
                file_size: None,
                duration_sec: None,
                fps: None,
                resolution: None,
                codec: None,
                transcript_text: None,
                transcript_segments: Vec::new(),
                keyframe_urls: Vec::new(),
                phash_keyframes: Vec::new(),
                audio_fingerprint: None,
                summary: None,
                suggested_title: None,
                suggested_description: None,
                genre: None,
                styles: Vec::new(),
                tags: Vec::new(),
                youtube_id: None,
                vimeo_id: None,
                youtube_published_at: None,
                vimeo_published_at: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Video>> {
        Ok(self.videos.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_provider_file_id(&self, provider_file_id: &str) -> Result<Option<Uuid>> {
        Ok(self
            .videos
            .lock()
            .unwrap()
            .values()
            .find(|v| v.provider_file_id == provider_file_id)
            .map(|v| v.id))
    }

    async fn find_by_sha256(&self, sha256: &str, exclude: Uuid) -> Result<Option<Uuid>> {
        Ok(self
            .videos
            .lock()
            .unwrap()
            .values()
            .find(|v| v.id != exclude && v.file_sha256.as_deref() == Some(sha256))
            .map(|v| v.id))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: VideoStatus,
        to: VideoStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidInput(format!(
                "illegal status transition {from} -> {to}"
            )));
        }
        let mut videos = self.videos.lock().unwrap();
        let video = videos.get_mut(&id).ok_or(Error::VideoNotFound(id))?;
        if video.status != from {
            return Ok(false);
        }
        video.status = to;
        video.updated_at = Utc::now();
        Ok(true)
    }

    async fn apply_enrichment(&self, id: Uuid, enrichment: &VideoEnrichment) -> Result<()> {
        let mut videos = self.videos.lock().unwrap();
        let video = videos.get_mut(&id).ok_or(Error::VideoNotFound(id))?;
        video.file_sha256 = enrichment.file_sha256.clone();
        video.file_size = enrichment.file_size;
        video.duration_sec = enrichment.duration_sec;
        video.fps = enrichment.fps;
        video.resolution = enrichment.resolution.clone();
        video.codec = enrichment.codec.clone();
        video.transcript_text = enrichment.transcript_text.clone();
        video.transcript_segments = enrichment.transcript_segments.clone();
        video.keyframe_urls = enrichment.keyframe_urls.clone();
        video.summary = enrichment.summary.clone();
        video.suggested_title = enrichment.suggested_title.clone();
        video.suggested_description = enrichment.suggested_description.clone();
        video.genre = enrichment.genre.clone();
        video.styles = enrichment.styles.clone();
        video.tags = enrichment.tags.clone();
        video.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory `JobRepository`.
#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored jobs, for assertions.
    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn enqueue(
        &self,
        video_id: Option<Uuid>,
        job_type: JobType,
        payload: Option<JsonValue>,
        max_retries: i32,
    ) -> Result<Uuid> {
        let id = cinelog_core::new_v7();
        self.jobs.lock().unwrap().push(Job {
            id,
            video_id,
            job_type,
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        });
        Ok(id)
    }

    async fn claim_next_for_types(&self, types: &[JobType]) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().unwrap();
        // First occurrence wins created_at ties, matching insertion order.
        let next = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending && types.contains(&j.job_type))
            .min_by_key(|j| j.created_at);
        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(Error::JobNotFound(job_id))?;
        if job.status != JobStatus::Running {
            return Err(Error::Job(format!(
                "job {job_id} is not running, refusing to complete"
            )));
        }
        job.status = JobStatus::Done;
        job.result = result;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(Error::JobNotFound(job_id))?;
        if job.status != JobStatus::Running {
            return Err(Error::Job(format!(
                "job {} is {}, refusing to fail",
                job_id,
                job.status.as_str()
            )));
        }
        if job.retry_count < job.max_retries {
            job.status = JobStatus::Pending;
            job.retry_count += 1;
            job.error = Some(error.to_string());
            job.started_at = None;
        } else {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .cloned())
    }

    async fn list_for_video(&self, video_id: Uuid) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.video_id == Some(video_id))
            .cloned()
            .collect())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let jobs = self.jobs.lock().unwrap();
        let mut stats = QueueStats::default();
        for job in jobs.iter() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn requeue_stale_running(&self, older_than_secs: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::seconds(older_than_secs);
        let mut jobs = self.jobs.lock().unwrap();
        let mut count = 0;
        for job in jobs.iter_mut() {
            if job.status == JobStatus::Running
                && job.started_at.map(|t| t < cutoff).unwrap_or(false)
            {
                job.status = JobStatus::Pending;
                job.started_at = None;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// In-memory `DuplicateRepository`.
#[derive(Default)]
pub struct MemoryDuplicateRepository {
    links: Mutex<HashMap<(Uuid, Uuid), Duplicate>>,
}

impl MemoryDuplicateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored links, for assertions.
    pub fn all(&self) -> Vec<Duplicate> {
        self.links.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl DuplicateRepository for MemoryDuplicateRepository {
    async fn upsert(&self, dup: &NewDuplicate) -> Result<()> {
        let mut links = self.links.lock().unwrap();
        let key = (dup.video_id, dup.duplicate_video_id);
        match links.get_mut(&key) {
            Some(existing) => {
                existing.score = dup.score;
                existing.reason = dup.reason;
            }
            None => {
                links.insert(
                    key,
                    Duplicate {
                        video_id: dup.video_id,
                        duplicate_video_id: dup.duplicate_video_id,
                        score: dup.score,
                        reason: dup.reason,
                        created_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn list_for_video(&self, video_id: Uuid) -> Result<Vec<Duplicate>> {
        Ok(self
            .links
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.video_id == video_id || d.duplicate_video_id == video_id)
            .cloned()
            .collect())
    }
}
