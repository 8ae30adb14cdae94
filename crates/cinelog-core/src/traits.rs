//! Repository and external-service trait definitions.
//!
//! Each trait is object-safe and implemented by a concrete backend
//! (Postgres repositories in `cinelog-db`, HTTP clients in
//! `cinelog-provider`), plus in-memory mocks for tests.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Duplicate, FolderEntry, Job, JobType, ListPage, NewDuplicate, NewVideo, QueueStats, Source,
    Video, VideoEnrichment, VideoStatus,
};

/// Watched-folder persistence.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Register a folder to watch. The stored path is normalized.
    async fn create(&self, provider_folder_id: &str, path: &str) -> Result<Source>;

    async fn get(&self, id: Uuid) -> Result<Option<Source>>;

    async fn list(&self) -> Result<Vec<Source>>;

    /// Look up a source by normalized path (case-insensitive compare).
    async fn find_by_path(&self, path: &str) -> Result<Option<Source>>;

    /// Persist the delta cursor after a completed listing page.
    ///
    /// Not guarded against concurrent scans of the same source: the last
    /// write wins, which at worst re-lists entries the discovery dedup
    /// barrier then drops.
    async fn update_cursor(&self, id: Uuid, cursor: &str) -> Result<()>;

    /// Remove a watched folder. Returns false when the id was unknown.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Video catalog persistence.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Insert a newly discovered video in `pending_ingest`.
    async fn insert_discovered(&self, new: &NewVideo) -> Result<Uuid>;

    async fn get(&self, id: Uuid) -> Result<Option<Video>>;

    /// Discovery dedup barrier: does this provider file already exist?
    async fn find_by_provider_file_id(&self, provider_file_id: &str) -> Result<Option<Uuid>>;

    /// Find another video with the same content hash, excluding `exclude`.
    async fn find_by_sha256(&self, sha256: &str, exclude: Uuid) -> Result<Option<Uuid>>;

    /// Compare-and-set status update. Returns false when the video was not
    /// in `from` (someone else moved it), true when the transition applied.
    async fn transition_status(&self, id: Uuid, from: VideoStatus, to: VideoStatus)
        -> Result<bool>;

    /// Persist a full pipeline pass in one update.
    async fn apply_enrichment(&self, id: Uuid, enrichment: &VideoEnrichment) -> Result<()>;
}

/// Durable job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a pending job. `max_retries` comes from worker configuration.
    async fn enqueue(
        &self,
        video_id: Option<Uuid>,
        job_type: JobType,
        payload: Option<JsonValue>,
        max_retries: i32,
    ) -> Result<Uuid>;

    /// Atomically claim the oldest pending job of one of the given types,
    /// marking it running. Returns None when the queue is empty.
    async fn claim_next_for_types(&self, types: &[JobType]) -> Result<Option<Job>>;

    /// Mark a running job done, storing its result.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Mark a running job failed, or requeue it while retries remain.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    async fn list_for_video(&self, video_id: Uuid) -> Result<Vec<Job>>;

    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Requeue `running` jobs whose claim is older than `older_than_secs`.
    /// Crash recovery: returns how many jobs were reset to pending.
    async fn requeue_stale_running(&self, older_than_secs: i64) -> Result<u64>;
}

/// Duplicate-link persistence. Upsert-only; re-detection must be a no-op.
#[async_trait]
pub trait DuplicateRepository: Send + Sync {
    async fn upsert(&self, dup: &NewDuplicate) -> Result<()>;

    /// Links where the video appears on either side of the pair.
    async fn list_for_video(&self, video_id: Uuid) -> Result<Vec<Duplicate>>;
}

/// Cloud storage provider: folder listing, delta continuation, downloads.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Full recursive listing of a folder (first page).
    async fn list_folder(&self, path: &str) -> Result<ListPage>;

    /// Continue a listing or poll for changes from a saved cursor.
    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage>;

    /// Short-lived direct download URL for a file path.
    async fn temporary_link(&self, path: &str) -> Result<String>;
}

/// Object storage for derived artifacts (keyframe images).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload (upsert) bytes under a key; returns the public URL.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Convenience: filter a listing page down to file entries.
pub fn file_entries(entries: &[FolderEntry]) -> impl Iterator<Item = (&str, &str)> {
    entries.iter().filter_map(|e| match e {
        FolderEntry::File { id, path } => Some((id.as_str(), path.as_str())),
        FolderEntry::Folder { .. } => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_entries_skips_folders() {
        let entries = vec![
            FolderEntry::Folder {
                path: "/a".into(),
            },
            FolderEntry::File {
                id: "id:1".into(),
                path: "/a/x.mp4".into(),
            },
        ];
        let files: Vec<_> = file_entries(&entries).collect();
        assert_eq!(files, vec![("id:1", "/a/x.mp4")]);
    }
}
