//! Duplicate detection.
//!
//! The built-in check is exact content identity via SHA-256. Perceptual
//! checks (visual phash, audio fingerprint, semantic) plug in as
//! [`SimilarityScorer`]s and share the same threshold and persistence path.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use cinelog_core::defaults::DUPLICATE_SIMILARITY_THRESHOLD;
use cinelog_core::{
    DuplicateReason, DuplicateRepository, NewDuplicate, Result, Video, VideoRepository,
};

/// A pluggable similarity check against the existing catalog.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    /// The reason recorded for links this scorer produces.
    fn reason(&self) -> DuplicateReason;

    /// Candidate matches for the video, with similarity scores in [0, 1].
    /// Scores below the detector threshold are discarded by the caller.
    async fn candidates(&self, video: &Video) -> Result<Vec<(Uuid, f64)>>;
}

/// Finds and records duplicate links for a freshly hashed video.
pub struct DuplicateDetector {
    videos: Arc<dyn VideoRepository>,
    duplicates: Arc<dyn DuplicateRepository>,
    threshold: f64,
    scorers: Vec<Arc<dyn SimilarityScorer>>,
}

impl DuplicateDetector {
    pub fn new(videos: Arc<dyn VideoRepository>, duplicates: Arc<dyn DuplicateRepository>) -> Self {
        Self {
            videos,
            duplicates,
            threshold: DUPLICATE_SIMILARITY_THRESHOLD,
            scorers: Vec::new(),
        }
    }

    /// Wire against a connected database's repositories.
    pub fn from_database(db: &cinelog_db::Database) -> Self {
        Self::new(Arc::new(db.videos.clone()), Arc::new(db.duplicates.clone()))
    }

    /// Set the minimum score a perceptual match must reach to be recorded.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Add a perceptual similarity scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    /// Detect duplicates of `video` given its content hash, recording each
    /// link. Upsert semantics make re-detection idempotent.
    pub async fn detect(&self, video: &Video, sha256: &str) -> Result<Vec<NewDuplicate>> {
        let mut found = Vec::new();

        if let Some(other) = self.videos.find_by_sha256(sha256, video.id).await? {
            let link = NewDuplicate {
                video_id: video.id,
                duplicate_video_id: other,
                score: 1.0,
                reason: DuplicateReason::ExactHash,
            };
            self.duplicates.upsert(&link).await?;
            info!(
                subsystem = "jobs",
                component = "dedup",
                video_id = %video.id,
                duplicate_of = %other,
                reason = %DuplicateReason::ExactHash.as_str(),
                "Duplicate detected"
            );
            found.push(link);
        }

        for scorer in &self.scorers {
            for (other, score) in scorer.candidates(video).await? {
                if other == video.id || score < self.threshold {
                    continue;
                }
                let link = NewDuplicate {
                    video_id: video.id,
                    duplicate_video_id: other,
                    score,
                    reason: scorer.reason(),
                };
                self.duplicates.upsert(&link).await?;
                info!(
                    subsystem = "jobs",
                    component = "dedup",
                    video_id = %video.id,
                    duplicate_of = %other,
                    score,
                    reason = %link.reason.as_str(),
                    "Duplicate detected"
                );
                found.push(link);
            }
        }

        Ok(found)
    }
}
