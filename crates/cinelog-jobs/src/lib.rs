//! # cinelog-jobs
//!
//! Background processing for cinelog: the durable job worker, folder
//! synchronization against the storage provider, the per-video enrichment
//! pipeline, and duplicate detection.

pub mod dedup;
pub mod handler;
pub mod media;
pub mod pipeline;
pub mod sync;
pub mod testing;
pub mod worker;

pub use dedup::{DuplicateDetector, SimilarityScorer};
pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use pipeline::PipelineHandler;
pub use sync::{FolderSynchronizer, ScanEvent, ScanHandler, ScanSummary, SyncOutcome};
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
