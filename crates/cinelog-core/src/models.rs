//! Core data models for cinelog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Lifecycle status of a cataloged video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    PendingIngest,
    Processing,
    PendingReview,
    Approved,
    Rejected,
    NeedsFix,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::PendingIngest => "pending_ingest",
            VideoStatus::Processing => "processing",
            VideoStatus::PendingReview => "pending_review",
            VideoStatus::Approved => "approved",
            VideoStatus::Rejected => "rejected",
            VideoStatus::NeedsFix => "needs_fix",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_ingest" => Some(VideoStatus::PendingIngest),
            "processing" => Some(VideoStatus::Processing),
            "pending_review" => Some(VideoStatus::PendingReview),
            "approved" => Some(VideoStatus::Approved),
            "rejected" => Some(VideoStatus::Rejected),
            "needs_fix" => Some(VideoStatus::NeedsFix),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// The pipeline drives `pending_ingest → processing → pending_review`;
    /// a fatal pipeline failure rolls `processing` back to `pending_ingest`.
    /// Review decisions move `pending_review` onward, and `needs_fix` may
    /// be sent back through the pipeline.
    pub fn can_transition_to(&self, to: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (self, to),
            (PendingIngest, Processing)
                | (Processing, PendingReview)
                | (Processing, PendingIngest)
                | (PendingReview, Approved)
                | (PendingReview, Rejected)
                | (PendingReview, NeedsFix)
                | (PendingReview, Processing)
                | (NeedsFix, Processing)
        )
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work carried by a queue entry.
///
/// `PublishYoutube`/`PublishVimeo` exist in the schema for external
/// publishing tooling; the worker has no handler for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Ingest,
    Process,
    Scan,
    PublishYoutube,
    PublishVimeo,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Ingest => "ingest",
            JobType::Process => "process",
            JobType::Scan => "scan",
            JobType::PublishYoutube => "publish_youtube",
            JobType::PublishVimeo => "publish_vimeo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ingest" => Some(JobType::Ingest),
            "process" => Some(JobType::Process),
            "scan" => Some(JobType::Scan),
            "publish_youtube" => Some(JobType::PublishYoutube),
            "publish_vimeo" => Some(JobType::PublishVimeo),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why two videos were linked as duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    ExactHash,
    VisualPhash,
    AudioFp,
    Semantic,
}

impl DuplicateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateReason::ExactHash => "exact_hash",
            DuplicateReason::VisualPhash => "visual_phash",
            DuplicateReason::AudioFp => "audio_fp",
            DuplicateReason::Semantic => "semantic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact_hash" => Some(DuplicateReason::ExactHash),
            "visual_phash" => Some(DuplicateReason::VisualPhash),
            "audio_fp" => Some(DuplicateReason::AudioFp),
            "semantic" => Some(DuplicateReason::Semantic),
            _ => None,
        }
    }
}

/// A watched provider folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    /// Provider-side folder identity (path or opaque id, provider-defined).
    pub provider_folder_id: String,
    /// Normalized folder path.
    pub path: String,
    /// Opaque delta cursor from the last completed listing page, if any.
    pub cursor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One timed span of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A cataloged video file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub source_id: Option<Uuid>,
    /// Provider-side file identity; the discovery dedup barrier.
    pub provider_file_id: String,
    pub path: String,
    pub filename: String,
    pub status: VideoStatus,

    pub file_sha256: Option<String>,
    pub file_size: Option<i64>,
    pub duration_sec: Option<f64>,
    pub fps: Option<f64>,
    pub resolution: Option<String>,
    pub codec: Option<String>,

    pub transcript_text: Option<String>,
    pub transcript_segments: Vec<TranscriptSegment>,

    pub keyframe_urls: Vec<String>,
    pub phash_keyframes: Vec<String>,
    pub audio_fingerprint: Option<String>,

    pub summary: Option<String>,
    pub suggested_title: Option<String>,
    pub suggested_description: Option<String>,
    pub genre: Option<String>,
    pub styles: Vec<String>,
    pub tags: Vec<String>,

    pub youtube_id: Option<String>,
    pub vimeo_id: Option<String>,
    pub youtube_published_at: Option<DateTime<Utc>>,
    pub vimeo_published_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A newly discovered video, before any enrichment.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub source_id: Option<Uuid>,
    pub provider_file_id: String,
    pub path: String,
    pub filename: String,
}

/// Everything the pipeline learned about a video, persisted in one update.
///
/// `None`/empty fields mean the corresponding stage was skipped or produced
/// nothing; existing column values are overwritten either way so a re-run
/// reflects the latest pass.
#[derive(Debug, Clone, Default)]
pub struct VideoEnrichment {
    pub file_sha256: Option<String>,
    pub file_size: Option<i64>,
    pub duration_sec: Option<f64>,
    pub fps: Option<f64>,
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_segments: Vec<TranscriptSegment>,
    pub keyframe_urls: Vec<String>,
    pub summary: Option<String>,
    pub suggested_title: Option<String>,
    pub suggested_description: Option<String>,
    pub genre: Option<String>,
    pub styles: Vec<String>,
    pub tags: Vec<String>,
}

/// A durable unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub video_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A stored duplicate link between two videos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Duplicate {
    pub video_id: Uuid,
    pub duplicate_video_id: Uuid,
    /// Similarity in [0.0, 1.0]; 1.0 for byte-identical content.
    pub score: f64,
    pub reason: DuplicateReason,
    pub created_at: DateTime<Utc>,
}

/// A duplicate link to upsert.
#[derive(Debug, Clone)]
pub struct NewDuplicate {
    pub video_id: Uuid,
    pub duplicate_video_id: Uuid,
    pub score: f64,
    pub reason: DuplicateReason,
}

/// Outcome of a non-fatal pipeline stage.
///
/// Distinguishes "ran and produced this" from "did not run", so persisted
/// records and job results can report which enrichments are genuinely
/// absent versus merely unattempted.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Done(T),
    Skipped(String),
}

impl<T> StageOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, StageOutcome::Skipped(_))
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            StageOutcome::Skipped(reason) => Some(reason),
            StageOutcome::Done(_) => None,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            StageOutcome::Done(v) => Some(v),
            StageOutcome::Skipped(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            StageOutcome::Done(v) => Some(v),
            StageOutcome::Skipped(_) => None,
        }
    }
}

/// One page of a provider folder listing.
#[derive(Debug, Clone)]
pub struct ListPage {
    pub entries: Vec<FolderEntry>,
    /// Cursor to resume from after this page. Always present; the provider
    /// returns one even on the final page so the next delta poll is cheap.
    pub cursor: String,
    pub has_more: bool,
}

/// A provider listing entry the synchronizer understands.
///
/// Closed on purpose: deletions and unknown entry kinds are dropped at the
/// provider boundary, and only file creations are ever actioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FolderEntry {
    File { id: String, path: String },
    Folder { path: String },
}

/// Counts per job status, for operator visibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_status_roundtrip() {
        for status in [
            VideoStatus::PendingIngest,
            VideoStatus::Processing,
            VideoStatus::PendingReview,
            VideoStatus::Approved,
            VideoStatus::Rejected,
            VideoStatus::NeedsFix,
        ] {
            assert_eq!(VideoStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(VideoStatus::parse("bogus"), None);
    }

    #[test]
    fn job_type_roundtrip() {
        for job_type in [
            JobType::Ingest,
            JobType::Process,
            JobType::Scan,
            JobType::PublishYoutube,
            JobType::PublishVimeo,
        ] {
            assert_eq!(JobType::parse(job_type.as_str()), Some(job_type));
        }
        assert_eq!(JobType::parse(""), None);
    }

    #[test]
    fn pipeline_transitions_allowed() {
        assert!(VideoStatus::PendingIngest.can_transition_to(VideoStatus::Processing));
        assert!(VideoStatus::Processing.can_transition_to(VideoStatus::PendingReview));
        // Fatal-failure rollback.
        assert!(VideoStatus::Processing.can_transition_to(VideoStatus::PendingIngest));
    }

    #[test]
    fn review_transitions_allowed() {
        assert!(VideoStatus::PendingReview.can_transition_to(VideoStatus::Approved));
        assert!(VideoStatus::PendingReview.can_transition_to(VideoStatus::Rejected));
        assert!(VideoStatus::PendingReview.can_transition_to(VideoStatus::NeedsFix));
        assert!(VideoStatus::NeedsFix.can_transition_to(VideoStatus::Processing));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!VideoStatus::PendingIngest.can_transition_to(VideoStatus::PendingReview));
        assert!(!VideoStatus::Approved.can_transition_to(VideoStatus::Processing));
        assert!(!VideoStatus::Rejected.can_transition_to(VideoStatus::PendingIngest));
        assert!(!VideoStatus::PendingIngest.can_transition_to(VideoStatus::PendingIngest));
    }

    #[test]
    fn stage_outcome_accessors() {
        let done: StageOutcome<u32> = StageOutcome::Done(7);
        assert!(!done.is_skipped());
        assert_eq!(done.value(), Some(&7));
        assert_eq!(done.skip_reason(), None);

        let skipped: StageOutcome<u32> = StageOutcome::Skipped("no backend".into());
        assert!(skipped.is_skipped());
        assert_eq!(skipped.value(), None);
        assert_eq!(skipped.skip_reason(), Some("no backend"));
        assert_eq!(skipped.into_value(), None);
    }

    #[test]
    fn folder_entry_serde_tagged() {
        let entry = FolderEntry::File {
            id: "id:abc".into(),
            path: "/footage/a.mp4".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "file");
        let back: FolderEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn job_status_serde_snake_case() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
