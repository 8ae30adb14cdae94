//! Structured logging field name constants for cinelog.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, soft-failed stage, automatic fallback |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration (listing entries, keyframes) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "db", "provider", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "worker", "pipeline", "sync", "pool", "dropbox"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "claim_next", "sync_source", "transcribe", "upload"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Video UUID being operated on.
pub const VIDEO_ID: &str = "video_id";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job type enum variant.
pub const JOB_TYPE: &str = "job_type";

/// Watched source UUID.
pub const SOURCE_ID: &str = "source_id";

/// Provider folder path.
pub const FOLDER: &str = "folder";

/// Pipeline stage name.
pub const STAGE: &str = "stage";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of listing pages consumed during a sync.
pub const PAGE_COUNT: &str = "page_count";

/// Number of videos added by a sync.
pub const ADDED: &str = "added";

/// Number of keyframes extracted/uploaded.
pub const KEYFRAME_COUNT: &str = "keyframe_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
