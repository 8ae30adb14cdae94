//! Job handler trait and execution context.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use cinelog_core::{Job, JobType};

/// Progress callback type for job handlers.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    /// Progress callback for surfacing progress events.
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }

    /// Get the video ID for this job, if any.
    pub fn video_id(&self) -> Option<Uuid> {
        self.job.video_id
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed with an error message. Whether it terminates or requeues
    /// is decided by the job's retry budget in the repository.
    Failed(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(100, Some("Done"));
        JobResult::Success(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinelog_core::JobStatus;

    fn test_job(job_type: JobType, video_id: Option<Uuid>) -> Job {
        Job {
            id: Uuid::new_v4(),
            video_id,
            job_type,
            status: JobStatus::Pending,
            payload: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: 0,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_job_context_video_id() {
        let video_id = Uuid::new_v4();
        let ctx = JobContext::new(test_job(JobType::Ingest, Some(video_id)));
        assert_eq!(ctx.video_id(), Some(video_id));

        let ctx = JobContext::new(test_job(JobType::Scan, None));
        assert!(ctx.video_id().is_none());
    }

    #[test]
    fn test_job_context_payload() {
        let mut job = test_job(JobType::Scan, None);
        job.payload = Some(serde_json::json!({"paths": ["/a"]}));
        let ctx = JobContext::new(job);
        assert_eq!(ctx.payload().unwrap()["paths"][0], "/a");
    }

    #[test]
    fn test_progress_callback_invoked() {
        use std::sync::{Arc, Mutex};

        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();

        let ctx = JobContext::new(test_job(JobType::Ingest, None)).with_progress_callback(
            move |percent, message| {
                log_clone
                    .lock()
                    .unwrap()
                    .push((percent, message.map(String::from)));
            },
        );

        ctx.report_progress(25, Some("downloading"));
        ctx.report_progress(100, None);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], (25, Some("downloading".to_string())));
        assert_eq!(log[1], (100, None));
    }

    #[test]
    fn test_progress_without_callback_does_not_panic() {
        let ctx = JobContext::new(test_job(JobType::Ingest, None));
        ctx.report_progress(50, Some("ok"));
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpHandler::new(JobType::Ingest);
        assert_eq!(handler.job_type(), JobType::Ingest);

        let result = handler
            .execute(JobContext::new(test_job(JobType::Ingest, None)))
            .await;
        assert!(matches!(result, JobResult::Success(None)));
    }
}
