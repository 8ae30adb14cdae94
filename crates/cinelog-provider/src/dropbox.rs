//! Dropbox v2 API client implementing `StorageProvider`.
//!
//! Covers exactly the three calls the catalog needs: full recursive folder
//! listing, cursor continuation, and temporary download links. Listing
//! entries arrive tagged with `".tag"`; everything that is not a live file
//! or folder (deletions, unknown kinds) is dropped at this boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cinelog_core::{Error, FolderEntry, ListPage, ProviderConfig, Result, StorageProvider};

/// Default Dropbox RPC endpoint base.
pub const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com/2";

/// HTTP client for the Dropbox v2 API.
pub struct DropboxClient {
    client: reqwest::Client,
    access_token: String,
    api_base: String,
}

#[derive(Serialize)]
struct ListFolderRequest<'a> {
    path: &'a str,
    recursive: bool,
    include_deleted: bool,
}

#[derive(Serialize)]
struct ListFolderContinueRequest<'a> {
    cursor: &'a str,
}

#[derive(Serialize)]
struct TemporaryLinkRequest<'a> {
    path: &'a str,
}

#[derive(Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
enum RawEntry {
    File {
        id: String,
        path_display: Option<String>,
        path_lower: Option<String>,
    },
    Folder {
        path_display: Option<String>,
        path_lower: Option<String>,
    },
    Deleted {},
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ListFolderResponse {
    entries: Vec<RawEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Deserialize)]
struct TemporaryLinkResponse {
    link: String,
}

impl DropboxClient {
    pub fn new(access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Create from application configuration.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let mut client = Self::new(config.access_token.clone());
        if let Some(base) = &config.api_base {
            client.api_base = base.trim_end_matches('/').to_string();
        }
        client
    }

    async fn rpc<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}/{}", self.api_base, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("{endpoint} request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "{endpoint} returned {status}: {body}"
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| Error::Provider(format!("{endpoint} response parse failed: {e}")))
    }

    fn convert_page(response: ListFolderResponse) -> ListPage {
        let entries = response
            .entries
            .into_iter()
            .filter_map(|raw| match raw {
                RawEntry::File {
                    id,
                    path_display,
                    path_lower,
                } => path_display
                    .or(path_lower)
                    .map(|path| FolderEntry::File { id, path }),
                RawEntry::Folder {
                    path_display,
                    path_lower,
                } => path_display
                    .or(path_lower)
                    .map(|path| FolderEntry::Folder { path }),
                RawEntry::Deleted {} | RawEntry::Unknown => None,
            })
            .collect();

        ListPage {
            entries,
            cursor: response.cursor,
            has_more: response.has_more,
        }
    }
}

#[async_trait]
impl StorageProvider for DropboxClient {
    async fn list_folder(&self, path: &str) -> Result<ListPage> {
        debug!(
            subsystem = "provider",
            component = "dropbox",
            op = "list_folder",
            folder = path,
            "Listing folder"
        );
        let response: ListFolderResponse = self
            .rpc(
                "files/list_folder",
                &ListFolderRequest {
                    path,
                    recursive: true,
                    include_deleted: false,
                },
            )
            .await?;
        Ok(Self::convert_page(response))
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage> {
        debug!(
            subsystem = "provider",
            component = "dropbox",
            op = "list_folder_continue",
            "Continuing listing from cursor"
        );
        let response: ListFolderResponse = self
            .rpc(
                "files/list_folder/continue",
                &ListFolderContinueRequest { cursor },
            )
            .await?;
        Ok(Self::convert_page(response))
    }

    async fn temporary_link(&self, path: &str) -> Result<String> {
        let response: TemporaryLinkResponse = self
            .rpc("files/get_temporary_link", &TemporaryLinkRequest { path })
            .await?;
        Ok(response.link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_entry_tagged_deserialization() {
        let json = r#"{
            "entries": [
                {".tag": "file", "id": "id:a1", "path_display": "/Footage/clip.mp4"},
                {".tag": "folder", "path_display": "/Footage/Sub"},
                {".tag": "deleted", "path_display": "/Footage/gone.mp4"}
            ],
            "cursor": "AAAA",
            "has_more": false
        }"#;

        let response: ListFolderResponse = serde_json::from_str(json).unwrap();
        let page = DropboxClient::convert_page(response);

        assert_eq!(page.entries.len(), 2);
        assert_eq!(
            page.entries[0],
            FolderEntry::File {
                id: "id:a1".into(),
                path: "/Footage/clip.mp4".into()
            }
        );
        assert_eq!(
            page.entries[1],
            FolderEntry::Folder {
                path: "/Footage/Sub".into()
            }
        );
        assert_eq!(page.cursor, "AAAA");
        assert!(!page.has_more);
    }

    #[test]
    fn unknown_entry_kinds_are_dropped() {
        let json = r#"{
            "entries": [{".tag": "symlink", "path_display": "/x"}],
            "cursor": "B",
            "has_more": true
        }"#;

        let response: ListFolderResponse = serde_json::from_str(json).unwrap();
        let page = DropboxClient::convert_page(response);
        assert!(page.entries.is_empty());
        assert!(page.has_more);
    }

    #[test]
    fn file_entry_falls_back_to_path_lower() {
        let json = r#"{
            "entries": [{".tag": "file", "id": "id:b2", "path_lower": "/footage/b.mov"}],
            "cursor": "C",
            "has_more": false
        }"#;

        let response: ListFolderResponse = serde_json::from_str(json).unwrap();
        let page = DropboxClient::convert_page(response);
        assert_eq!(
            page.entries[0],
            FolderEntry::File {
                id: "id:b2".into(),
                path: "/footage/b.mov".into()
            }
        );
    }

    #[test]
    fn from_config_trims_api_base() {
        let config = ProviderConfig {
            access_token: "tok".into(),
            api_base: Some("http://localhost:9999/2/".into()),
        };
        let client = DropboxClient::from_config(&config);
        assert_eq!(client.api_base, "http://localhost:9999/2");
    }
}
