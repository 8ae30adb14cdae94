//! Folder synchronization: provider listings to cataloged videos.
//!
//! Discovery is idempotent. The provider file id is the dedup barrier, so
//! re-listing a folder (fresh or from a stale cursor) never produces a
//! second video row or a second ingest job for the same file.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use cinelog_core::defaults::JOB_MAX_RETRIES;
use cinelog_core::{
    file_entries, filename_from_path, is_video_path, FolderEntry, JobRepository, JobType, NewVideo,
    Result, Source, SourceRepository, StorageProvider, VideoRepository,
};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Result of syncing one source.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncOutcome {
    /// Videos newly cataloged.
    pub added: u64,
    /// Listing pages consumed.
    pub pages: u32,
}

/// Result of a scan across several sources.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScanSummary {
    /// Sources scanned (including failed ones).
    pub folders: usize,
    /// Videos newly cataloged across all sources.
    pub added: u64,
    /// Sources whose sync failed.
    pub failed: usize,
}

/// Progress events emitted while scanning, one folder at a time.
///
/// These serialize straight onto the streaming scan boundary, tagged
/// `progress`, `error`, or `done`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// One folder finished syncing.
    Progress {
        folder: String,
        index: usize,
        total: usize,
        added: u64,
    },
    /// One folder failed; the remaining folders are still scanned.
    #[serde(rename = "error")]
    FolderError {
        folder: String,
        index: usize,
        total: usize,
        error: String,
    },
    /// The whole scan finished.
    Done {
        folders: usize,
        added: u64,
        failed: usize,
    },
}

/// Drives provider folder listings into the video catalog and job queue.
pub struct FolderSynchronizer {
    sources: Arc<dyn SourceRepository>,
    videos: Arc<dyn VideoRepository>,
    jobs: Arc<dyn JobRepository>,
    provider: Arc<dyn StorageProvider>,
    max_retries: i32,
}

impl FolderSynchronizer {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        videos: Arc<dyn VideoRepository>,
        jobs: Arc<dyn JobRepository>,
        provider: Arc<dyn StorageProvider>,
    ) -> Self {
        Self {
            sources,
            videos,
            jobs,
            provider,
            max_retries: JOB_MAX_RETRIES,
        }
    }

    /// Wire against a connected database's repositories.
    pub fn from_database(db: &cinelog_db::Database, provider: Arc<dyn StorageProvider>) -> Self {
        Self::new(
            Arc::new(db.sources.clone()),
            Arc::new(db.videos.clone()),
            Arc::new(db.jobs.clone()),
            provider,
        )
    }

    /// Set the retry budget for enqueued ingest jobs.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sync one source: list (or delta-poll) its folder and catalog every
    /// new video file, enqueueing an ingest job per discovery.
    ///
    /// The cursor is persisted after each fully ingested page, so a crash
    /// mid-sync resumes from the last completed page rather than the start.
    pub async fn sync_source(&self, source: &Source) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();

        // Initial listings go by the provider's folder id, which survives
        // folder renames; the stored path is for display and matching.
        let mut page = match &source.cursor {
            Some(cursor) => self.provider.list_folder_continue(cursor).await?,
            None => self.provider.list_folder(&source.provider_folder_id).await?,
        };

        loop {
            outcome.pages += 1;
            outcome.added += self.ingest_entries(source, &page.entries).await?;
            self.sources.update_cursor(source.id, &page.cursor).await?;

            if !page.has_more {
                break;
            }
            page = self.provider.list_folder_continue(&page.cursor).await?;
        }

        info!(
            subsystem = "jobs",
            component = "sync",
            source_id = %source.id,
            folder = %source.path,
            added = outcome.added,
            page_count = outcome.pages,
            "Source synced"
        );
        Ok(outcome)
    }

    async fn ingest_entries(&self, source: &Source, entries: &[FolderEntry]) -> Result<u64> {
        let mut added = 0;

        for (file_id, path) in file_entries(entries) {
            if !is_video_path(path) {
                continue;
            }
            if self.videos.find_by_provider_file_id(file_id).await?.is_some() {
                continue;
            }

            let video_id = self
                .videos
                .insert_discovered(&NewVideo {
                    source_id: Some(source.id),
                    provider_file_id: file_id.to_string(),
                    path: path.to_string(),
                    filename: filename_from_path(path).to_string(),
                })
                .await?;
            added += 1;

            info!(
                subsystem = "jobs",
                component = "sync",
                video_id = %video_id,
                folder = %source.path,
                "Discovered video"
            );

            // The video row is already committed; a failed enqueue leaves it
            // pending_ingest for an operator to re-drive, not half-removed.
            if let Err(e) = self
                .jobs
                .enqueue(Some(video_id), JobType::Ingest, None, self.max_retries)
                .await
            {
                warn!(
                    subsystem = "jobs",
                    component = "sync",
                    video_id = %video_id,
                    error = %e,
                    "Failed to enqueue ingest job for discovered video"
                );
            }
        }

        Ok(added)
    }

    /// Scan the given sources one at a time, emitting progress events.
    ///
    /// A failing source is reported and skipped; the remaining sources
    /// still get scanned.
    pub async fn scan_sources<F>(&self, sources: &[Source], mut on_event: F) -> ScanSummary
    where
        F: FnMut(ScanEvent),
    {
        let total = sources.len();
        let mut summary = ScanSummary {
            folders: total,
            ..Default::default()
        };

        for (index, source) in sources.iter().enumerate() {
            match self.sync_source(source).await {
                Ok(outcome) => {
                    summary.added += outcome.added;
                    on_event(ScanEvent::Progress {
                        folder: source.path.clone(),
                        index,
                        total,
                        added: outcome.added,
                    });
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        subsystem = "jobs",
                        component = "sync",
                        source_id = %source.id,
                        folder = %source.path,
                        error = %e,
                        "Source sync failed"
                    );
                    on_event(ScanEvent::FolderError {
                        folder: source.path.clone(),
                        index,
                        total,
                        error: e.to_string(),
                    });
                }
            }
        }

        on_event(ScanEvent::Done {
            folders: summary.folders,
            added: summary.added,
            failed: summary.failed,
        });
        summary
    }

    /// Resolve folder paths to registered sources. Returns the matched
    /// sources and the paths that matched nothing.
    pub async fn resolve_paths(&self, paths: &[String]) -> Result<(Vec<Source>, Vec<String>)> {
        let mut matched = Vec::new();
        let mut unmatched = Vec::new();
        for path in paths {
            match self.sources.find_by_path(path).await? {
                Some(source) => matched.push(source),
                None => unmatched.push(path.clone()),
            }
        }
        Ok((matched, unmatched))
    }
}

/// Handler for queued scan jobs. The payload names the folder paths to
/// scan; paths that match no registered source are reported as failures.
pub struct ScanHandler {
    synchronizer: Arc<FolderSynchronizer>,
}

impl ScanHandler {
    pub fn new(synchronizer: Arc<FolderSynchronizer>) -> Self {
        Self { synchronizer }
    }
}

#[async_trait::async_trait]
impl JobHandler for ScanHandler {
    fn job_type(&self) -> JobType {
        JobType::Scan
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let paths: Vec<String> = match ctx.payload().and_then(|p| p.get("paths")) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(paths) => paths,
                Err(e) => return JobResult::Failed(format!("invalid scan payload: {e}")),
            },
            None => return JobResult::Failed("scan job payload missing paths".to_string()),
        };
        if paths.is_empty() {
            return JobResult::Failed("scan job has no paths".to_string());
        }

        let (sources, unmatched) = match self.synchronizer.resolve_paths(&paths).await {
            Ok(resolved) => resolved,
            Err(e) => return JobResult::Failed(e.to_string()),
        };
        for path in &unmatched {
            warn!(
                subsystem = "jobs",
                component = "sync",
                folder = %path,
                "Scan requested for unregistered folder"
            );
        }
        if sources.is_empty() {
            return JobResult::Failed("no matching folders".to_string());
        }

        let total = sources.len();
        let summary = self
            .synchronizer
            .scan_sources(&sources, |event| {
                if let ScanEvent::Progress { folder, index, .. } = &event {
                    let percent = (((index + 1) * 100) / total) as i32;
                    ctx.report_progress(percent, Some(folder));
                }
            })
            .await;

        JobResult::Success(Some(serde_json::json!({
            "folders": summary.folders,
            "added": summary.added,
            "failed": summary.failed,
            "unmatched": unmatched,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryJobRepository, MemorySourceRepository, MemoryVideoRepository};
    use cinelog_core::{JobStatus, ListPage, VideoStatus};
    use cinelog_provider::MockProvider;

    fn page(cursor: &str, has_more: bool, files: &[(&str, &str)]) -> ListPage {
        ListPage {
            entries: files
                .iter()
                .map(|(id, path)| FolderEntry::File {
                    id: (*id).to_string(),
                    path: (*path).to_string(),
                })
                .collect(),
            cursor: cursor.to_string(),
            has_more,
        }
    }

    struct Fixture {
        sources: Arc<MemorySourceRepository>,
        videos: Arc<MemoryVideoRepository>,
        jobs: Arc<MemoryJobRepository>,
        provider: Arc<MockProvider>,
        sync: FolderSynchronizer,
    }

    fn fixture() -> Fixture {
        let sources = Arc::new(MemorySourceRepository::new());
        let videos = Arc::new(MemoryVideoRepository::new());
        let jobs = Arc::new(MemoryJobRepository::new());
        let provider = Arc::new(MockProvider::new());
        let sync = FolderSynchronizer::new(
            sources.clone(),
            videos.clone(),
            jobs.clone(),
            provider.clone(),
        );
        Fixture {
            sources,
            videos,
            jobs,
            provider,
            sync,
        }
    }

    #[tokio::test]
    async fn discovery_catalogs_videos_and_enqueues_ingest() {
        let f = fixture();
        let source = f.sources.create("/footage", "/footage").await.unwrap();
        f.provider.script_folder(
            "/footage",
            vec![page(
                "c1",
                false,
                &[("id:a", "/footage/a.mp4"), ("id:b", "/footage/b.mov")],
            )],
        );

        let outcome = f.sync.sync_source(&source).await.unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.pages, 1);

        let videos = f.videos.all();
        assert_eq!(videos.len(), 2);
        assert!(videos.iter().all(|v| v.status == VideoStatus::PendingIngest));
        assert!(videos.iter().all(|v| v.source_id == Some(source.id)));

        let jobs = f.jobs.all();
        assert_eq!(jobs.len(), 2);
        assert!(jobs
            .iter()
            .all(|j| j.job_type == JobType::Ingest && j.status == JobStatus::Pending));
    }

    #[tokio::test]
    async fn non_video_files_are_ignored() {
        let f = fixture();
        let source = f.sources.create("/footage", "/footage").await.unwrap();
        f.provider.script_folder(
            "/footage",
            vec![page(
                "c1",
                false,
                &[
                    ("id:a", "/footage/a.mp4"),
                    ("id:b", "/footage/notes.txt"),
                    ("id:c", "/footage/poster.jpg"),
                ],
            )],
        );

        let outcome = f.sync.sync_source(&source).await.unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(f.videos.all().len(), 1);
    }

    #[tokio::test]
    async fn rescan_is_idempotent() {
        let f = fixture();
        let source = f.sources.create("/footage", "/footage").await.unwrap();
        f.provider.script_folder(
            "/footage",
            vec![page("c1", false, &[("id:a", "/footage/a.mp4")])],
        );

        f.sync.sync_source(&source).await.unwrap();
        // Second full listing of the same folder (fresh source, no cursor).
        let outcome = f.sync.sync_source(&source).await.unwrap();

        assert_eq!(outcome.added, 0);
        assert_eq!(f.videos.all().len(), 1);
        assert_eq!(f.jobs.all().len(), 1);
    }

    #[tokio::test]
    async fn cursor_advances_per_page_and_resumes_delta() {
        let f = fixture();
        let source = f.sources.create("/footage", "/footage").await.unwrap();
        f.provider.script_folder(
            "/footage",
            vec![
                page("c1", true, &[("id:a", "/footage/a.mp4")]),
                page("c2", false, &[("id:b", "/footage/b.mp4")]),
            ],
        );

        let outcome = f.sync.sync_source(&source).await.unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.pages, 2);

        let stored = f.sources.get(source.id).await.unwrap().unwrap();
        assert_eq!(stored.cursor.as_deref(), Some("c2"));

        // Next sync starts from the saved cursor: a quiet delta poll.
        let outcome = f.sync.sync_source(&stored).await.unwrap();
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.pages, 1);
        let stored = f.sources.get(source.id).await.unwrap().unwrap();
        assert_eq!(stored.cursor.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn initial_listing_goes_by_provider_folder_id() {
        let f = fixture();
        // Registered with a provider folder id distinct from the display path.
        let source = f.sources.create("id:folder123", "/footage").await.unwrap();
        f.provider.script_folder(
            "id:folder123",
            vec![page("c1", false, &[("id:a", "/footage/a.mp4")])],
        );

        let outcome = f.sync.sync_source(&source).await.unwrap();
        assert_eq!(outcome.added, 1);
        let stored = f.sources.get(source.id).await.unwrap().unwrap();
        assert_eq!(stored.cursor.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn same_provider_file_across_sources_catalogs_once() {
        let f = fixture();
        let first = f.sources.create("/footage", "/footage").await.unwrap();
        let second = f.sources.create("/shared", "/shared").await.unwrap();
        // The provider reports the same file id from both folders (shared
        // folder mounted in two places).
        f.provider.script_folder(
            "/footage",
            vec![page("c1", false, &[("id:shared", "/footage/a.mp4")])],
        );
        f.provider.script_folder(
            "/shared",
            vec![page("c2", false, &[("id:shared", "/shared/a.mp4")])],
        );

        f.sync.sync_source(&first).await.unwrap();
        let outcome = f.sync.sync_source(&second).await.unwrap();

        assert_eq!(outcome.added, 0);
        assert_eq!(f.videos.all().len(), 1);
        assert_eq!(f.videos.all()[0].source_id, Some(first.id));
    }

    #[tokio::test]
    async fn failing_folder_does_not_stop_scan() {
        let f = fixture();
        let good = f.sources.create("/good", "/good").await.unwrap();
        let bad = f.sources.create("/bad", "/bad").await.unwrap();
        f.provider.script_folder(
            "/good",
            vec![page("c1", false, &[("id:a", "/good/a.mp4")])],
        );
        f.provider.fail_folder("/bad", "folder access revoked");

        let mut events = Vec::new();
        let summary = f
            .sync
            .scan_sources(&[bad, good], |e| events.push(e))
            .await;

        assert_eq!(summary.folders, 2);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.failed, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, ScanEvent::FolderError { folder, .. } if folder == "/bad")));
        assert!(matches!(events.last(), Some(ScanEvent::Done { .. })));
    }

    #[test]
    fn scan_events_serialize_with_wire_tags() {
        let progress = ScanEvent::Progress {
            folder: "/footage".into(),
            index: 0,
            total: 1,
            added: 2,
        };
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["folder"], "/footage");
        assert_eq!(value["index"], 0);
        assert_eq!(value["total"], 1);
        assert_eq!(value["added"], 2);

        let error = ScanEvent::FolderError {
            folder: "/bad".into(),
            index: 1,
            total: 2,
            error: "folder access revoked".into(),
        };
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"], "folder access revoked");

        let done = ScanEvent::Done {
            folders: 2,
            added: 2,
            failed: 1,
        };
        assert_eq!(serde_json::to_value(&done).unwrap()["type"], "done");
    }

    #[tokio::test]
    async fn resolve_paths_splits_matched_and_unmatched() {
        let f = fixture();
        f.sources.create("/footage", "/footage").await.unwrap();

        let (matched, unmatched) = f
            .sync
            .resolve_paths(&["/Footage".to_string(), "/other".to_string()])
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].path, "/footage");
        assert_eq!(unmatched, vec!["/other"]);
    }

    #[tokio::test]
    async fn scan_handler_fails_without_matching_folders() {
        let f = fixture();
        let handler = ScanHandler::new(Arc::new(f.sync));

        let job_id = f
            .jobs
            .enqueue(
                None,
                JobType::Scan,
                Some(serde_json::json!({"paths": ["/nowhere"]})),
                0,
            )
            .await
            .unwrap();
        let job = f.jobs.get(job_id).await.unwrap().unwrap();

        let result = handler.execute(JobContext::new(job)).await;
        match result {
            JobResult::Failed(msg) => assert_eq!(msg, "no matching folders"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scan_handler_scans_matched_folders() {
        let f = fixture();
        let source = f.sources.create("/footage", "/footage").await.unwrap();
        f.provider.script_folder(
            "/footage",
            vec![page("c1", false, &[("id:a", "/footage/a.mp4")])],
        );
        let jobs = f.jobs.clone();
        let handler = ScanHandler::new(Arc::new(f.sync));

        let job_id = jobs
            .enqueue(
                None,
                JobType::Scan,
                Some(serde_json::json!({"paths": [source.path, "/missing"]})),
                0,
            )
            .await
            .unwrap();
        let job = jobs.get(job_id).await.unwrap().unwrap();

        match handler.execute(JobContext::new(job)).await {
            JobResult::Success(Some(result)) => {
                assert_eq!(result["added"], 1);
                assert_eq!(result["failed"], 0);
                assert_eq!(result["unmatched"][0], "/missing");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
