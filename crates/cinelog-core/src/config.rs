//! Application configuration, built explicitly from the environment.
//!
//! No hidden singletons: the binary builds one `AppConfig` at startup and
//! hands pieces of it to the components that need them. Missing required
//! credentials fail fast at startup instead of at first use.

use crate::defaults::{
    DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, DEFAULT_WHISPER_MODEL, ENV_LLM_API_KEY,
    ENV_LLM_BASE_URL, ENV_LLM_MODEL, ENV_WHISPER_BASE_URL, ENV_WHISPER_MODEL, SERVER_PORT,
};
use crate::error::{Error, Result};

/// Storage-provider credentials.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub access_token: String,
    /// Override for the provider API base URL (tests, proxies).
    pub api_base: Option<String>,
}

/// Blob bucket for derived artifacts (keyframes). Optional: without it the
/// keyframe stage is skipped.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub base_url: String,
    pub service_key: String,
    pub bucket: String,
}

/// Whisper-compatible transcription endpoint. Optional.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub base_url: String,
    pub model: String,
}

/// Chat-completions endpoint for metadata drafting. Optional.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub provider: ProviderConfig,
    pub blob: Option<BlobConfig>,
    pub whisper: Option<WhisperConfig>,
    pub llm: Option<LlmConfig>,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("{name} must be set")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Build configuration from environment variables.
    ///
    /// Required: `DATABASE_URL`, `DROPBOX_ACCESS_TOKEN`.
    /// Optional blocks (each gates a pipeline stage when absent):
    /// blob store (`BLOB_STORE_URL` + `BLOB_STORE_KEY`, bucket via
    /// `BLOB_KEYFRAME_BUCKET`), transcription (`WHISPER_BASE_URL`),
    /// metadata drafting (`LLM_API_KEY`).
    pub fn from_env() -> Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let provider = ProviderConfig {
            access_token: required("DROPBOX_ACCESS_TOKEN")?,
            api_base: optional("DROPBOX_API_BASE"),
        };

        let blob = match (optional("BLOB_STORE_URL"), optional("BLOB_STORE_KEY")) {
            (Some(base_url), Some(service_key)) => Some(BlobConfig {
                base_url,
                service_key,
                bucket: optional("BLOB_KEYFRAME_BUCKET").unwrap_or_else(|| "keyframes".into()),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "BLOB_STORE_URL and BLOB_STORE_KEY must be set together".into(),
                ))
            }
        };

        let whisper = optional(ENV_WHISPER_BASE_URL).map(|base_url| WhisperConfig {
            base_url,
            model: optional(ENV_WHISPER_MODEL).unwrap_or_else(|| DEFAULT_WHISPER_MODEL.into()),
        });

        let llm = optional(ENV_LLM_API_KEY).map(|api_key| LlmConfig {
            base_url: optional(ENV_LLM_BASE_URL).unwrap_or_else(|| DEFAULT_LLM_BASE_URL.into()),
            api_key,
            model: optional(ENV_LLM_MODEL).unwrap_or_else(|| DEFAULT_LLM_MODEL.into()),
        });

        let port = match optional("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid PORT value: {raw}")))?,
            None => SERVER_PORT,
        };

        Ok(AppConfig {
            database_url,
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            provider,
            blob,
            whisper,
            llm,
        })
    }
}
