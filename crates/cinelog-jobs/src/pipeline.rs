//! Per-video processing pipeline.
//!
//! Stages run in a fixed order inside one job execution:
//! acquire, hash, probe, audio, keyframes, transcription, metadata, dedup,
//! persist. Acquire/hash/probe failures are fatal and roll the video back
//! to `pending_ingest`; the middle stages soft-skip, so a video with a
//! broken audio track still lands in review with whatever was learned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use cinelog_core::defaults::{FALLBACK_DURATION_SECS, KEYFRAME_COUNT, TRANSCRIPT_EXCERPT_CHARS};
use cinelog_core::{
    truncate_chars, BlobStore, Error, JobType, Result, StageOutcome, StorageProvider,
    TranscriptSegment, Video, VideoEnrichment, VideoRepository, VideoStatus,
};
use cinelog_inference::{MetadataBackend, Transcription, TranscriptionBackend};

use crate::dedup::DuplicateDetector;
use crate::handler::{JobContext, JobHandler, JobResult};
use crate::media::{self, ProbeData};

/// Handler that runs the full enrichment pipeline for one video.
///
/// Registered for both `ingest` (first pass after discovery) and `process`
/// (operator-driven re-run); the stages are identical, only the job type
/// differs.
pub struct PipelineHandler {
    job_type: JobType,
    videos: Arc<dyn VideoRepository>,
    provider: Arc<dyn StorageProvider>,
    detector: Arc<DuplicateDetector>,
    blob: Option<Arc<dyn BlobStore>>,
    transcription: Option<Arc<dyn TranscriptionBackend>>,
    metadata: Option<Arc<dyn MetadataBackend>>,
    http: reqwest::Client,
    keyframe_count: usize,
}

impl PipelineHandler {
    pub fn new(
        job_type: JobType,
        videos: Arc<dyn VideoRepository>,
        provider: Arc<dyn StorageProvider>,
        detector: Arc<DuplicateDetector>,
    ) -> Self {
        Self {
            job_type,
            videos,
            provider,
            detector,
            blob: None,
            transcription: None,
            metadata: None,
            http: reqwest::Client::new(),
            keyframe_count: KEYFRAME_COUNT,
        }
    }

    /// Enable keyframe extraction, storing frames in the given blob store.
    pub fn with_blob_store(mut self, blob: Arc<dyn BlobStore>) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Enable the transcription stage.
    pub fn with_transcription(mut self, backend: Arc<dyn TranscriptionBackend>) -> Self {
        self.transcription = Some(backend);
        self
    }

    /// Enable the metadata drafting stage.
    pub fn with_metadata(mut self, backend: Arc<dyn MetadataBackend>) -> Self {
        self.metadata = Some(backend);
        self
    }

    /// Number of keyframes to extract per video.
    pub fn with_keyframe_count(mut self, count: usize) -> Self {
        self.keyframe_count = count;
        self
    }

    /// Stream the file at `url` to `dest`, returning the byte count.
    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("download request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "download returned {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut total: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| Error::Provider(format!("download stream failed: {e}")))?;
            total += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(total)
    }

    async fn extract_keyframes(
        &self,
        blob: &Arc<dyn BlobStore>,
        video: &Video,
        local: &Path,
        workdir: &Path,
        duration_sec: f64,
    ) -> Result<Vec<String>> {
        let timestamps = media::keyframe_timestamps(duration_sec, self.keyframe_count);
        let mut urls = Vec::with_capacity(timestamps.len());

        for (i, ts) in timestamps.iter().enumerate() {
            let frame_path = workdir.join(format!("frame_{i}.jpg"));
            if let Err(e) = media::extract_keyframe(local, *ts, &frame_path).await {
                // One unreadable region should not cost the whole strip.
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    video_id = %video.id,
                    stage = "keyframes",
                    error = %e,
                    "Keyframe extraction failed, skipping frame"
                );
                continue;
            }
            let bytes = tokio::fs::read(&frame_path).await?;
            let key = format!("{}/frame_{i}.jpg", video.id);
            let url = blob.upload(&key, bytes, "image/jpeg").await?;
            urls.push(url);
        }

        Ok(urls)
    }

    async fn run_transcription(
        &self,
        video: &Video,
        audio: &StageOutcome<PathBuf>,
    ) -> StageOutcome<Transcription> {
        let Some(backend) = &self.transcription else {
            return StageOutcome::Skipped("transcription backend not configured".to_string());
        };
        let StageOutcome::Done(audio_path) = audio else {
            return StageOutcome::Skipped("no audio track extracted".to_string());
        };

        let bytes = match tokio::fs::read(audio_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return StageOutcome::Skipped(format!("failed to read extracted audio: {e}"));
            }
        };
        match backend.transcribe(&bytes).await {
            Ok(transcription) => StageOutcome::Done(transcription),
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    video_id = %video.id,
                    stage = "transcription",
                    error = %e,
                    "Transcription failed, continuing without transcript"
                );
                StageOutcome::Skipped(format!("transcription failed: {e}"))
            }
        }
    }

    async fn run_metadata(
        &self,
        video: &Video,
        transcription: &StageOutcome<Transcription>,
    ) -> StageOutcome<cinelog_inference::MetadataDraft> {
        let Some(backend) = &self.metadata else {
            return StageOutcome::Skipped("metadata backend not configured".to_string());
        };

        // Metadata drafting runs even without a transcript; the model can
        // still work from the filename.
        let transcript_text = transcription
            .value()
            .map(|t| t.text.as_str())
            .unwrap_or("");
        let excerpt = truncate_chars(transcript_text, TRANSCRIPT_EXCERPT_CHARS);

        match backend.generate(excerpt, &video.filename).await {
            Ok(draft) => StageOutcome::Done(draft),
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    video_id = %video.id,
                    stage = "metadata",
                    error = %e,
                    "Metadata drafting failed, continuing without draft"
                );
                StageOutcome::Skipped(format!("metadata drafting failed: {e}"))
            }
        }
    }

    /// Run every stage against a downloaded working copy, persist the
    /// enrichment, and move the video to `pending_review`.
    async fn run(&self, video: &Video, ctx: &JobContext) -> Result<JsonValue> {
        let workdir = tempfile::tempdir()?;
        let local = workdir.path().join("input");

        // Acquire: fatal on failure.
        let link = self.provider.temporary_link(&video.path).await?;
        let downloaded = self.download_to(&link, &local).await?;
        info!(
            subsystem = "jobs",
            component = "pipeline",
            video_id = %video.id,
            stage = "acquire",
            size = downloaded,
            "Downloaded working copy"
        );
        ctx.report_progress(10, Some("downloaded"));

        // Hash and probe: fatal on failure.
        let sha256 = media::sha256_file(&local).await?;
        let probe = media::probe_media(&local).await?;
        ctx.report_progress(25, Some("probed"));

        // Audio extraction: soft.
        let audio = self.extract_audio(video, &local, workdir.path()).await;
        ctx.report_progress(40, Some("audio"));

        // Keyframes: soft, requires a blob store.
        let keyframes = self
            .keyframe_stage(video, &local, workdir.path(), &probe)
            .await;
        ctx.report_progress(55, Some("keyframes"));

        // Transcription: soft, requires audio and a backend.
        let transcription = self.run_transcription(video, &audio).await;
        ctx.report_progress(70, Some("transcription"));

        // Metadata drafting: soft, requires a backend.
        let metadata = self.run_metadata(video, &transcription).await;
        ctx.report_progress(80, Some("metadata"));

        // Dedup: soft; a detector error never blocks review.
        let duplicates = match self.detector.detect(video, &sha256).await {
            Ok(links) => StageOutcome::Done(links.len()),
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    video_id = %video.id,
                    stage = "dedup",
                    error = %e,
                    "Duplicate detection failed"
                );
                StageOutcome::Skipped(format!("duplicate detection failed: {e}"))
            }
        };
        ctx.report_progress(90, Some("dedup"));

        // Persist everything in one update: fatal on failure.
        let enrichment = build_enrichment(
            sha256,
            downloaded,
            &probe,
            &transcription,
            &keyframes,
            &metadata,
        );
        self.videos.apply_enrichment(video.id, &enrichment).await?;

        let moved = self
            .videos
            .transition_status(video.id, VideoStatus::Processing, VideoStatus::PendingReview)
            .await?;
        if !moved {
            warn!(
                subsystem = "jobs",
                component = "pipeline",
                video_id = %video.id,
                "Video left processing externally before completion"
            );
        }
        ctx.report_progress(100, Some("done"));

        let skipped: Vec<&str> = [
            audio.skip_reason(),
            keyframes.skip_reason(),
            transcription.skip_reason(),
            metadata.skip_reason(),
            duplicates.skip_reason(),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(serde_json::json!({
            "sha256": enrichment.file_sha256,
            "keyframes": keyframes.value().map(|urls| urls.len()).unwrap_or(0),
            "duplicates": duplicates.value().copied().unwrap_or(0),
            "skipped": skipped,
        }))
    }

    async fn extract_audio(
        &self,
        video: &Video,
        local: &Path,
        workdir: &Path,
    ) -> StageOutcome<PathBuf> {
        let audio_path = workdir.join("audio.wav");
        match media::extract_audio_wav(local, &audio_path).await {
            Ok(()) => StageOutcome::Done(audio_path),
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    video_id = %video.id,
                    stage = "audio",
                    error = %e,
                    "Audio extraction failed, continuing without audio"
                );
                StageOutcome::Skipped(format!("audio extraction failed: {e}"))
            }
        }
    }

    async fn keyframe_stage(
        &self,
        video: &Video,
        local: &Path,
        workdir: &Path,
        probe: &ProbeData,
    ) -> StageOutcome<Vec<String>> {
        let Some(blob) = &self.blob else {
            return StageOutcome::Skipped("no blob store configured".to_string());
        };

        let duration = probe
            .duration_sec
            .filter(|d| *d > 0.0)
            .unwrap_or(FALLBACK_DURATION_SECS);

        match self
            .extract_keyframes(blob, video, local, workdir, duration)
            .await
        {
            Ok(urls) => {
                info!(
                    subsystem = "jobs",
                    component = "pipeline",
                    video_id = %video.id,
                    stage = "keyframes",
                    keyframe_count = urls.len(),
                    "Keyframes stored"
                );
                StageOutcome::Done(urls)
            }
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    video_id = %video.id,
                    stage = "keyframes",
                    error = %e,
                    "Keyframe stage failed, continuing without keyframes"
                );
                StageOutcome::Skipped(format!("keyframe extraction failed: {e}"))
            }
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn build_enrichment(
    sha256: String,
    downloaded: u64,
    probe: &ProbeData,
    transcription: &StageOutcome<Transcription>,
    keyframes: &StageOutcome<Vec<String>>,
    metadata: &StageOutcome<cinelog_inference::MetadataDraft>,
) -> VideoEnrichment {
    let transcript_text = transcription.value().map(|t| t.text.clone());
    let transcript_segments: Vec<TranscriptSegment> = transcription
        .value()
        .map(|t| t.segments.clone())
        .unwrap_or_default();
    let draft = metadata.value();

    VideoEnrichment {
        file_sha256: Some(sha256),
        file_size: probe.file_size.or(Some(downloaded as i64)),
        duration_sec: probe.duration_sec,
        fps: probe.fps,
        resolution: probe.resolution.clone(),
        codec: probe.codec.clone(),
        transcript_text,
        transcript_segments,
        keyframe_urls: keyframes.value().cloned().unwrap_or_default(),
        summary: draft.and_then(|d| non_empty(d.summary.clone())),
        suggested_title: draft.and_then(|d| non_empty(d.suggested_title.clone())),
        suggested_description: draft.and_then(|d| non_empty(d.suggested_description.clone())),
        genre: draft.and_then(|d| non_empty(d.genre.clone())),
        styles: draft.map(|d| d.styles.clone().into_vec()).unwrap_or_default(),
        tags: draft.map(|d| d.tags.clone().into_vec()).unwrap_or_default(),
    }
}

#[async_trait]
impl JobHandler for PipelineHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(video_id) = ctx.video_id() else {
            return JobResult::Failed("job has no video".to_string());
        };
        let video = match self.videos.get(video_id).await {
            Ok(Some(video)) => video,
            Ok(None) => return JobResult::Failed(format!("video not found: {video_id}")),
            Err(e) => return JobResult::Failed(e.to_string()),
        };

        // First runs enter from pending_ingest, re-runs from pending_review
        // or needs_fix; any other status has no edge into processing.
        match self
            .videos
            .transition_status(video_id, video.status, VideoStatus::Processing)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return JobResult::Failed(format!(
                    "video {video_id} left {} before processing started",
                    video.status
                ));
            }
            Err(e) => return JobResult::Failed(e.to_string()),
        }

        match self.run(&video, &ctx).await {
            Ok(result) => JobResult::Success(Some(result)),
            Err(e) => {
                // Fatal failure: hand the video back to pending_ingest so a
                // later scan or manual retry can pick it up again.
                match self
                    .videos
                    .transition_status(video_id, VideoStatus::Processing, VideoStatus::PendingIngest)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(
                            subsystem = "jobs",
                            component = "pipeline",
                            video_id = %video_id,
                            "Skipped rollback, video already moved externally"
                        );
                    }
                    Err(rollback_err) => {
                        error!(
                            subsystem = "jobs",
                            component = "pipeline",
                            video_id = %video_id,
                            error = %rollback_err,
                            "Failed to roll back video status after fatal error"
                        );
                    }
                }
                JobResult::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryDuplicateRepository, MemoryVideoRepository};
    use cinelog_core::NewVideo;
    use cinelog_inference::MetadataDraft;

    struct FailingMetadata;

    #[async_trait]
    impl MetadataBackend for FailingMetadata {
        async fn generate(&self, _excerpt: &str, _filename: &str) -> Result<MetadataDraft> {
            Err(Error::Inference("model unavailable".into()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct EchoTranscription;

    #[async_trait]
    impl TranscriptionBackend for EchoTranscription {
        async fn transcribe(&self, _audio: &[u8]) -> Result<Transcription> {
            Ok(Transcription {
                text: "spoken words".into(),
                segments: vec![TranscriptSegment {
                    start: 0.0,
                    end: 1.5,
                    text: "spoken words".into(),
                }],
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    async fn handler_with(
        transcription: Option<Arc<dyn TranscriptionBackend>>,
        metadata: Option<Arc<dyn MetadataBackend>>,
    ) -> (PipelineHandler, Video) {
        let videos = Arc::new(MemoryVideoRepository::new());
        let duplicates = Arc::new(MemoryDuplicateRepository::new());
        let id = videos
            .insert_discovered(&NewVideo {
                source_id: None,
                provider_file_id: "id:a".into(),
                path: "/footage/a.mp4".into(),
                filename: "a.mp4".into(),
            })
            .await
            .unwrap();
        let video = videos.get(id).await.unwrap().unwrap();

        let detector = Arc::new(DuplicateDetector::new(videos.clone(), duplicates));
        let provider = Arc::new(cinelog_provider::MockProvider::new());
        let mut handler = PipelineHandler::new(JobType::Ingest, videos, provider, detector);
        if let Some(backend) = transcription {
            handler = handler.with_transcription(backend);
        }
        if let Some(backend) = metadata {
            handler = handler.with_metadata(backend);
        }
        (handler, video)
    }

    #[tokio::test]
    async fn job_for_reviewed_video_fails_before_processing() {
        let videos = Arc::new(MemoryVideoRepository::new());
        let duplicates = Arc::new(MemoryDuplicateRepository::new());
        let id = videos
            .insert_discovered(&NewVideo {
                source_id: None,
                provider_file_id: "id:a".into(),
                path: "/footage/a.mp4".into(),
                filename: "a.mp4".into(),
            })
            .await
            .unwrap();
        // Walk the video to approved through its legal edges.
        for (from, to) in [
            (VideoStatus::PendingIngest, VideoStatus::Processing),
            (VideoStatus::Processing, VideoStatus::PendingReview),
            (VideoStatus::PendingReview, VideoStatus::Approved),
        ] {
            assert!(videos.transition_status(id, from, to).await.unwrap());
        }

        let detector = Arc::new(DuplicateDetector::new(videos.clone(), duplicates));
        let provider = Arc::new(cinelog_provider::MockProvider::new());
        let handler = PipelineHandler::new(JobType::Process, videos.clone(), provider, detector);

        let job = cinelog_core::Job {
            id: cinelog_core::new_v7(),
            video_id: Some(id),
            job_type: JobType::Process,
            status: cinelog_core::JobStatus::Running,
            payload: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: 0,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
        };

        match handler.execute(JobContext::new(job)).await {
            JobResult::Failed(msg) => assert!(msg.contains("approved")),
            other => panic!("expected failure, got {other:?}"),
        }
        let video = videos.get(id).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Approved);
    }

    #[tokio::test]
    async fn metadata_failure_is_soft_and_keeps_transcript() {
        let (handler, video) =
            handler_with(Some(Arc::new(EchoTranscription)), Some(Arc::new(FailingMetadata))).await;

        let transcription = StageOutcome::Done(Transcription {
            text: "spoken words".into(),
            segments: Vec::new(),
        });
        let metadata = handler.run_metadata(&video, &transcription).await;
        assert!(metadata.is_skipped());
        assert!(metadata.skip_reason().unwrap().contains("model unavailable"));

        let enrichment = build_enrichment(
            "abc".into(),
            100,
            &ProbeData::default(),
            &transcription,
            &StageOutcome::Skipped("no blob store configured".into()),
            &metadata,
        );
        assert_eq!(enrichment.transcript_text.as_deref(), Some("spoken words"));
        assert!(enrichment.summary.is_none());
        assert!(enrichment.styles.is_empty());
        assert_eq!(enrichment.file_sha256.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn transcription_skipped_without_backend() {
        let (handler, video) = handler_with(None, None).await;
        let audio = StageOutcome::Done(PathBuf::from("/tmp/audio.wav"));
        let outcome = handler.run_transcription(&video, &audio).await;
        assert!(outcome.is_skipped());
    }

    #[tokio::test]
    async fn transcription_skipped_when_audio_missing() {
        let (handler, video) =
            handler_with(Some(Arc::new(EchoTranscription)), None).await;
        let audio: StageOutcome<PathBuf> =
            StageOutcome::Skipped("audio extraction failed".into());
        let outcome = handler.run_transcription(&video, &audio).await;
        assert!(outcome.is_skipped());
    }

    #[test]
    fn enrichment_drops_blank_draft_fields() {
        let draft = MetadataDraft {
            summary: "  ".into(),
            suggested_title: "Coastal Reel".into(),
            ..Default::default()
        };
        let enrichment = build_enrichment(
            "abc".into(),
            0,
            &ProbeData::default(),
            &StageOutcome::Skipped("no backend".into()),
            &StageOutcome::Skipped("no blob store".into()),
            &StageOutcome::Done(draft),
        );
        assert!(enrichment.summary.is_none());
        assert_eq!(enrichment.suggested_title.as_deref(), Some("Coastal Reel"));
        assert_eq!(enrichment.file_size, Some(0));
    }
}
