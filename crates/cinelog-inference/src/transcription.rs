//! Transcription backend trait and Whisper-compatible implementation.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use cinelog_core::{Error, Result, TranscriptSegment, WhisperConfig};

/// Result of audio transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    /// Full transcribed text.
    pub text: String,
    /// Timestamped segments.
    pub segments: Vec<TranscriptSegment>,
}

/// Backend for transcribing extracted audio.
///
/// The pipeline always hands over 16 kHz mono WAV, so implementations can
/// assume that format.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe WAV audio data.
    async fn transcribe(&self, audio_data: &[u8]) -> Result<Transcription>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible Whisper backend (works with Speaches/faster-whisper-server).
pub struct WhisperBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WhisperBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
            timeout_secs: 300, // 5 min for long audio
        }
    }

    /// Create from application configuration.
    pub fn from_config(config: &WhisperConfig) -> Self {
        Self::new(config.base_url.clone(), config.model.clone())
    }
}

/// OpenAI Whisper API response format (`verbose_json`).
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(&self, audio_data: &[u8]) -> Result<Transcription> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);

        debug!(
            subsystem = "inference",
            component = "whisper",
            op = "transcribe",
            model = %self.model,
            size = audio_data.len(),
            "Transcribing audio"
        );

        let file_part = reqwest::multipart::Part::bytes(audio_data.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Inference(format!("failed to create multipart: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Inference(format!("transcription request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "whisper API returned {status}: {body}"
            )));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("failed to parse whisper response: {e}")))?;

        let segments = result
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptSegment {
                start: s.start,
                end: s.end,
                text: s.text,
            })
            .collect();

        Ok(Transcription {
            text: result.text,
            segments,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_backend_new_trims_base_url() {
        let backend =
            WhisperBackend::new("http://localhost:8000/".to_string(), "whisper-1".to_string());
        assert_eq!(backend.base_url, "http://localhost:8000");
        assert_eq!(backend.model_name(), "whisper-1");
        assert_eq!(backend.timeout_secs, 300);
    }

    #[test]
    fn test_whisper_response_deserialization() {
        let json = r#"{
            "text": "Hello world",
            "segments": [
                {"start": 0.0, "end": 2.5, "text": "Hello"},
                {"start": 2.5, "end": 5.0, "text": "world"}
            ]
        }"#;

        let response: WhisperResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text, "Hello world");
        assert_eq!(response.segments.as_ref().unwrap().len(), 2);
        assert_eq!(response.segments.unwrap()[1].start, 2.5);
    }

    #[test]
    fn test_whisper_response_deserialization_minimal() {
        let json = r#"{"text": "Hello world"}"#;

        let response: WhisperResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text, "Hello world");
        assert!(response.segments.is_none());
    }
}
