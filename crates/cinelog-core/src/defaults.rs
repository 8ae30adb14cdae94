//! Centralized default constants for cinelog.
//!
//! Single source of truth for shared default values; crates reference
//! these constants instead of defining their own magic numbers.

// =============================================================================
// DISCOVERY
// =============================================================================

/// File extensions treated as video content (lowercase, no dot).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mxf", "mkv"];

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default worker poll interval in milliseconds.
pub const JOB_POLL_INTERVAL_MS: u64 = 10_000;

/// Default maximum retry count for failed jobs (0 = no automatic retry;
/// failed jobs wait for an operator to enqueue a new one).
pub const JOB_MAX_RETRIES: i32 = 0;

/// Age in seconds after which a `running` job is presumed orphaned by a
/// worker crash and requeued on startup.
pub const STALE_RUNNING_SECS: i64 = 3_600;

/// Worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// PIPELINE
// =============================================================================

/// Keyframes extracted per video.
pub const KEYFRAME_COUNT: usize = 10;

/// Fallback duration in seconds when ffprobe reports none, used only to
/// place keyframe timestamps.
pub const FALLBACK_DURATION_SECS: f64 = 60.0;

/// Maximum transcript characters forwarded to the metadata model.
pub const TRANSCRIPT_EXCERPT_CHARS: usize = 15_000;

/// Per-command timeout for ffmpeg/ffprobe invocations (seconds).
pub const MEDIA_CMD_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// DUPLICATE DETECTION
// =============================================================================

/// Minimum similarity score at which non-exact matches are surfaced.
pub const DUPLICATE_SIMILARITY_THRESHOLD: f64 = 0.85;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

// =============================================================================
// TRANSCRIPTION
// =============================================================================

/// Environment variable for the Whisper transcription server URL. No
/// default: transcription is enabled by setting it.
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";

/// Environment variable for the Whisper model name.
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";

/// Default Whisper model.
pub const DEFAULT_WHISPER_MODEL: &str = "Systran/faster-distil-whisper-large-v3";

// =============================================================================
// METADATA GENERATION
// =============================================================================

/// Environment variable for the chat-completions endpoint base URL.
pub const ENV_LLM_BASE_URL: &str = "LLM_BASE_URL";

/// Default chat-completions base URL.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable for the chat-completions API key.
pub const ENV_LLM_API_KEY: &str = "LLM_API_KEY";

/// Environment variable for the metadata generation model.
pub const ENV_LLM_MODEL: &str = "LLM_MODEL";

/// Default metadata generation model.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Timeout for metadata generation requests in seconds.
pub const LLM_TIMEOUT_SECS: u64 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_extensions_are_lowercase() {
        for ext in VIDEO_EXTENSIONS {
            assert_eq!(*ext, ext.to_lowercase());
            assert!(!ext.starts_with('.'));
        }
    }

    #[test]
    fn retry_default_is_operator_driven() {
        assert_eq!(JOB_MAX_RETRIES, 0);
    }

    #[test]
    fn similarity_threshold_in_unit_interval() {
        assert!(DUPLICATE_SIMILARITY_THRESHOLD > 0.0);
        assert!(DUPLICATE_SIMILARITY_THRESHOLD < 1.0);
    }
}
