//! Error types for cinelog.

use thiserror::Error;

/// Result type alias using cinelog's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cinelog operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Video not found
    #[error("Video not found: {0}")]
    VideoNotFound(uuid::Uuid),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Storage provider call failed (listing, delta, download link)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Blob bucket upload failed
    #[error("Blob store error: {0}")]
    BlobStore(String),

    /// External media tool (ffmpeg/ffprobe) failed
    #[error("Media error: {0}")]
    Media(String),

    /// Inference/generation failed (transcription, metadata drafting)
    #[error("Inference error: {0}")]
    Inference(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_video_not_found() {
        let id = Uuid::nil();
        let err = Error::VideoNotFound(id);
        assert_eq!(err.to_string(), format!("Video not found: {}", id));
    }

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::new_v4();
        let err = Error::JobNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_provider() {
        let err = Error::Provider("cursor expired".to_string());
        assert_eq!(err.to_string(), "Provider error: cursor expired");
    }

    #[test]
    fn test_error_display_media() {
        let err = Error::Media("ffprobe exited with status 1".to_string());
        assert_eq!(err.to_string(), "Media error: ffprobe exited with status 1");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing access token".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing access token");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
