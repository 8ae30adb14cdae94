//! Blob bucket client implementing `BlobStore`.
//!
//! Targets a Supabase-storage-style object endpoint: authenticated upsert
//! PUTs under `/storage/v1/object/{bucket}/{key}`, public reads under
//! `/storage/v1/object/public/{bucket}/{key}`.

use async_trait::async_trait;
use tracing::debug;

use cinelog_core::{BlobConfig, BlobStore, Error, Result};

/// HTTP client for a bucket of derived artifacts (keyframe images).
pub struct BucketClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl BucketClient {
    pub fn new(base_url: String, service_key: String, bucket: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
        }
    }

    /// Create from application configuration.
    pub fn from_config(config: &BlobConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.service_key.clone(),
            config.bucket.clone(),
        )
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }
}

#[async_trait]
impl BlobStore for BucketClient {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key);
        debug!(
            subsystem = "provider",
            component = "bucket",
            op = "upload",
            key = key,
            size = bytes.len(),
            "Uploading blob"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::BlobStore(format!("upload request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BlobStore(format!(
                "upload of {key} returned {status}: {body}"
            )));
        }

        Ok(self.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_shape() {
        let client = BucketClient::new(
            "https://blob.example.com/".into(),
            "svc".into(),
            "keyframes".into(),
        );
        assert_eq!(
            client.public_url("vid-1/frame_0.jpg"),
            "https://blob.example.com/storage/v1/object/public/keyframes/vid-1/frame_0.jpg"
        );
    }
}
