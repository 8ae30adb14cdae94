//! Background job worker.
//!
//! Polls the queue on an interval, claims one pending job at a time, and
//! dispatches it to the registered handler for its type. Worker lifecycle
//! and per-job outcomes are broadcast as [`WorkerEvent`]s so API layers can
//! stream progress without coupling to the loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cinelog_core::defaults::{EVENT_BUS_CAPACITY, JOB_POLL_INTERVAL_MS, STALE_RUNNING_SECS};
use cinelog_core::{Job, JobRepository, JobType};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Age in seconds after which a `running` job is presumed orphaned by a
    /// crashed worker and requeued at startup.
    pub stale_running_secs: i64,
    /// Whether the worker is enabled.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: JOB_POLL_INTERVAL_MS,
            stale_running_secs: STALE_RUNNING_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(JOB_POLL_INTERVAL_MS);

        let stale_running_secs = std::env::var("JOB_STALE_RUNNING_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(STALE_RUNNING_SECS);

        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            poll_interval_ms,
            stale_running_secs,
            enabled,
        }
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the stale-running threshold.
    pub fn with_stale_running_secs(mut self, secs: i64) -> Self {
        self.stale_running_secs = secs;
        self
    }

    /// Enable or disable the worker.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Events emitted by the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job has started processing.
    JobStarted { job_id: Uuid, job_type: JobType },
    /// A job reported progress.
    JobProgress {
        job_id: Uuid,
        percent: i32,
        message: Option<String>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: Uuid,
        result: Option<JsonValue>,
    },
    /// A job failed.
    JobFailed { job_id: Uuid, error: String },
    /// The worker has started.
    WorkerStarted,
    /// The worker has stopped.
    WorkerStopped,
}

/// Handle for a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl WorkerHandle {
    /// Request worker shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// The background job worker.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(jobs: Arc<dyn JobRepository>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            jobs,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Register a job handler for its declared job type.
    pub async fn register_handler(&self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        self.handlers.write().await.insert(job_type, handler);
        debug!(
            subsystem = "jobs",
            component = "worker",
            job_type = %job_type,
            "Registered job handler"
        );
    }

    /// Subscribe to worker events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker, returning a handle for shutdown and events.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        WorkerHandle { shutdown_tx }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(
                subsystem = "jobs",
                component = "worker",
                "Job worker disabled, not starting"
            );
            return;
        }

        info!(
            subsystem = "jobs",
            component = "worker",
            poll_interval_ms = self.config.poll_interval_ms,
            "Job worker starting"
        );

        self.recover_stale_jobs().await;
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            if let Some(job) = self.claim_job().await {
                self.execute_job(job).await;
            }

            // One claim per tick; sleep before looking again so a burst of
            // jobs drains at the polling cadence rather than all at once.
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!(
            subsystem = "jobs",
            component = "worker",
            "Job worker stopped"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
    }

    /// Requeue jobs left `running` by a previous process that died mid-job.
    async fn recover_stale_jobs(&self) {
        match self
            .jobs
            .requeue_stale_running(self.config.stale_running_secs)
            .await
        {
            Ok(0) => {}
            Ok(count) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    recovered = count,
                    "Requeued stale running jobs from previous run"
                );
            }
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    error = %e,
                    "Failed to requeue stale running jobs"
                );
            }
        }
    }

    async fn claim_job(&self) -> Option<Job> {
        let types: Vec<JobType> = {
            let handlers = self.handlers.read().await;
            handlers.keys().copied().collect()
        };

        if types.is_empty() {
            return None;
        }

        match self.jobs.claim_next_for_types(&types).await {
            Ok(job) => job,
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    error = %e,
                    "Failed to claim job"
                );
                None
            }
        }
    }

    async fn execute_job(&self, job: Job) {
        let job_id = job.id;
        let job_type = job.job_type;

        info!(
            subsystem = "jobs",
            component = "worker",
            job_id = %job_id,
            job_type = %job_type,
            "Processing job"
        );
        let _ = self
            .event_tx
            .send(WorkerEvent::JobStarted { job_id, job_type });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job_type).cloned()
        };

        let Some(handler) = handler else {
            // Claimed a type we no longer handle; fail it so it does not
            // stay running forever.
            let msg = format!("no handler registered for job type {job_type}");
            error!(
                subsystem = "jobs",
                component = "worker",
                job_id = %job_id,
                error = %msg,
                "Job failed"
            );
            if let Err(e) = self.jobs.fail(job_id, &msg).await {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    job_id = %job_id,
                    error = %e,
                    "Failed to mark job as failed"
                );
            }
            let _ = self
                .event_tx
                .send(WorkerEvent::JobFailed { job_id, error: msg });
            return;
        };

        let progress_tx = self.event_tx.clone();
        let ctx = JobContext::new(job).with_progress_callback(move |percent, message| {
            let _ = progress_tx.send(WorkerEvent::JobProgress {
                job_id,
                percent,
                message: message.map(String::from),
            });
        });

        let started = std::time::Instant::now();
        match handler.execute(ctx).await {
            JobResult::Success(result) => {
                info!(
                    subsystem = "jobs",
                    component = "worker",
                    job_id = %job_id,
                    job_type = %job_type,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                if let Err(e) = self.jobs.complete(job_id, result.clone()).await {
                    error!(
                        subsystem = "jobs",
                        component = "worker",
                        job_id = %job_id,
                        error = %e,
                        "Failed to mark job as complete"
                    );
                }
                let _ = self
                    .event_tx
                    .send(WorkerEvent::JobCompleted { job_id, result });
            }
            JobResult::Failed(error) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    job_id = %job_id,
                    job_type = %job_type,
                    duration_ms = started.elapsed().as_millis() as u64,
                    error = %error,
                    "Job failed"
                );
                if let Err(e) = self.jobs.fail(job_id, &error).await {
                    error!(
                        subsystem = "jobs",
                        component = "worker",
                        job_id = %job_id,
                        error = %e,
                        "Failed to mark job as failed"
                    );
                }
                let _ = self
                    .event_tx
                    .send(WorkerEvent::JobFailed { job_id, error });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, JOB_POLL_INTERVAL_MS);
        assert_eq!(config.stale_running_secs, STALE_RUNNING_SECS);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builders() {
        let config = WorkerConfig::default()
            .with_poll_interval(50)
            .with_stale_running_secs(120)
            .with_enabled(false);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.stale_running_secs, 120);
        assert!(!config.enabled);
    }
}
