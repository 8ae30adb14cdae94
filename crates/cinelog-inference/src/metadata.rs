//! Structured metadata drafting via an OpenAI-compatible chat endpoint.
//!
//! The model is asked for a strict JSON object; `response_format:
//! json_object` keeps it honest, and `StringOrList` absorbs the remaining
//! looseness (models occasionally return `"styles": "documentary"` instead
//! of an array).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cinelog_core::{Error, LlmConfig, Result};
use cinelog_core::defaults::LLM_TIMEOUT_SECS;

/// A metadata draft produced by the model, for human review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDraft {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub suggested_title: String,
    #[serde(default)]
    pub suggested_description: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub styles: StringOrList,
    #[serde(default)]
    pub tags: StringOrList,
}

/// A JSON value that should be a string array but may arrive as a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl Default for StringOrList {
    fn default() -> Self {
        StringOrList::Many(Vec::new())
    }
}

impl StringOrList {
    /// Coerce to a list, dropping empty strings.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) => {
                if s.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![s]
                }
            }
            StringOrList::Many(list) => {
                list.into_iter().filter(|s| !s.trim().is_empty()).collect()
            }
        }
    }
}

/// Backend for drafting review metadata from a transcript excerpt.
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    /// Draft metadata from a bounded transcript excerpt and the filename.
    async fn generate(&self, transcript_excerpt: &str, filename: &str) -> Result<MetadataDraft>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Chat-completions implementation of `MetadataBackend`.
pub struct OpenAiMetadataBackend {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiMetadataBackend {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client: reqwest::Client::new(),
            timeout_secs: LLM_TIMEOUT_SECS,
        }
    }

    /// Create from application configuration.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
        )
    }

    fn build_prompt(transcript_excerpt: &str, filename: &str) -> String {
        format!(
            "You are cataloging a video file for an editorial review queue.\n\
             Filename: {filename}\n\
             Transcript (may be empty or partial):\n{transcript_excerpt}\n\n\
             Respond with a JSON object with exactly these keys:\n\
             \"summary\" (2-3 sentences), \"suggested_title\" (short),\n\
             \"suggested_description\" (1 paragraph), \"genre\" (one word),\n\
             \"styles\" (array of strings), \"tags\" (array of strings)."
        )
    }
}

#[async_trait]
impl MetadataBackend for OpenAiMetadataBackend {
    async fn generate(&self, transcript_excerpt: &str, filename: &str) -> Result<MetadataDraft> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            subsystem = "inference",
            component = "metadata",
            op = "generate",
            model = %self.model,
            prompt_len = transcript_excerpt.len(),
            "Drafting metadata"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: Self::build_prompt(transcript_excerpt, filename),
            }],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Inference(format!("metadata request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "chat API returned {status}: {body}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("failed to parse chat response: {e}")))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| Error::Inference("chat response had no choices".into()))?;

        serde_json::from_str::<MetadataDraft>(content)
            .map_err(|e| Error::Inference(format!("model returned malformed JSON: {e}")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_parses_full_object() {
        let json = r#"{
            "summary": "A drone tour of a coastline.",
            "suggested_title": "Coastal Drone Reel",
            "suggested_description": "Sweeping aerial footage of cliffs and surf.",
            "genre": "travel",
            "styles": ["aerial", "cinematic"],
            "tags": ["drone", "coast"]
        }"#;

        let draft: MetadataDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.suggested_title, "Coastal Drone Reel");
        assert_eq!(draft.styles.into_vec(), vec!["aerial", "cinematic"]);
        assert_eq!(draft.tags.into_vec(), vec!["drone", "coast"]);
    }

    #[test]
    fn draft_coerces_scalar_styles_and_tags() {
        let json = r#"{"summary": "x", "styles": "documentary", "tags": "news"}"#;

        let draft: MetadataDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.styles.into_vec(), vec!["documentary"]);
        assert_eq!(draft.tags.into_vec(), vec!["news"]);
        assert!(draft.suggested_title.is_empty());
    }

    #[test]
    fn draft_tolerates_missing_fields() {
        let draft: MetadataDraft = serde_json::from_str("{}").unwrap();
        assert!(draft.summary.is_empty());
        assert!(draft.styles.into_vec().is_empty());
    }

    #[test]
    fn string_or_list_drops_empties() {
        let list = StringOrList::Many(vec!["a".into(), "".into(), "  ".into(), "b".into()]);
        assert_eq!(list.into_vec(), vec!["a", "b"]);
        assert!(StringOrList::One("".into()).into_vec().is_empty());
    }

    #[test]
    fn prompt_includes_filename_and_excerpt() {
        let prompt = OpenAiMetadataBackend::build_prompt("some words", "clip.mp4");
        assert!(prompt.contains("clip.mp4"));
        assert!(prompt.contains("some words"));
        assert!(prompt.contains("\"tags\""));
    }
}
