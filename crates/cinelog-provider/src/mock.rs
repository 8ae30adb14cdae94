//! In-memory provider and blob store for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use cinelog_core::{BlobStore, Error, ListPage, Result, StorageProvider};

/// Scripted in-memory `StorageProvider`.
///
/// Folders are scripted as page sequences: `list_folder` returns the first
/// page, each page's cursor continues to the next. A continue from an
/// unscripted cursor behaves like a quiet delta poll (no entries, same
/// cursor, no more pages), matching how the live provider answers a cursor
/// with no changes behind it.
#[derive(Default)]
pub struct MockProvider {
    first_pages: Mutex<HashMap<String, ListPage>>,
    continuations: Mutex<HashMap<String, ListPage>>,
    links: Mutex<HashMap<String, String>>,
    fail_folders: Mutex<HashMap<String, String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a folder's listing as a page sequence. Pages after the first
    /// are reachable through the preceding page's cursor.
    pub fn script_folder(&self, path: &str, pages: Vec<ListPage>) {
        let mut iter = pages.into_iter();
        let Some(first) = iter.next() else {
            return;
        };
        let mut prev_cursor = first.cursor.clone();
        self.first_pages
            .lock()
            .expect("mock lock")
            .insert(path.to_string(), first);
        for page in iter {
            let cursor = page.cursor.clone();
            self.continuations
                .lock()
                .expect("mock lock")
                .insert(prev_cursor, page);
            prev_cursor = cursor;
        }
    }

    /// Script a download link for a file path.
    pub fn script_link(&self, path: &str, url: &str) {
        self.links
            .lock()
            .expect("mock lock")
            .insert(path.to_string(), url.to_string());
    }

    /// Make listing a folder fail with the given message.
    pub fn fail_folder(&self, path: &str, message: &str) {
        self.fail_folders
            .lock()
            .expect("mock lock")
            .insert(path.to_string(), message.to_string());
    }
}

#[async_trait]
impl StorageProvider for MockProvider {
    async fn list_folder(&self, path: &str) -> Result<ListPage> {
        if let Some(msg) = self.fail_folders.lock().expect("mock lock").get(path) {
            return Err(Error::Provider(msg.clone()));
        }
        self.first_pages
            .lock()
            .expect("mock lock")
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("unknown folder: {path}")))
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<ListPage> {
        Ok(self
            .continuations
            .lock()
            .expect("mock lock")
            .get(cursor)
            .cloned()
            .unwrap_or_else(|| ListPage {
                entries: Vec::new(),
                cursor: cursor.to_string(),
                has_more: false,
            }))
    }

    async fn temporary_link(&self, path: &str) -> Result<String> {
        self.links
            .lock()
            .expect("mock lock")
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("no link scripted for {path}")))
    }
}

/// In-memory `BlobStore` recording every upload.
#[derive(Default)]
pub struct MockBlobStore {
    uploads: Mutex<Vec<(String, usize, String)>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys uploaded so far, in order.
    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .expect("mock lock")
            .iter()
            .map(|(key, _, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.uploads.lock().expect("mock lock").push((
            key.to_string(),
            bytes.len(),
            content_type.to_string(),
        ));
        Ok(format!("mock://blobs/{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinelog_core::FolderEntry;

    fn page(cursor: &str, has_more: bool, paths: &[&str]) -> ListPage {
        ListPage {
            entries: paths
                .iter()
                .map(|p| FolderEntry::File {
                    id: format!("id:{p}"),
                    path: (*p).to_string(),
                })
                .collect(),
            cursor: cursor.to_string(),
            has_more,
        }
    }

    #[tokio::test]
    async fn scripted_pages_chain_through_cursors() {
        let provider = MockProvider::new();
        provider.script_folder(
            "/footage",
            vec![
                page("c1", true, &["/footage/a.mp4"]),
                page("c2", false, &["/footage/b.mp4"]),
            ],
        );

        let first = provider.list_folder("/footage").await.unwrap();
        assert_eq!(first.cursor, "c1");
        assert!(first.has_more);

        let second = provider.list_folder_continue("c1").await.unwrap();
        assert_eq!(second.cursor, "c2");
        assert!(!second.has_more);

        // Quiet delta poll from the final cursor.
        let quiet = provider.list_folder_continue("c2").await.unwrap();
        assert!(quiet.entries.is_empty());
        assert_eq!(quiet.cursor, "c2");
    }

    #[tokio::test]
    async fn blob_store_records_uploads() {
        let store = MockBlobStore::new();
        let url = store
            .upload("v1/frame_0.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(url, "mock://blobs/v1/frame_0.jpg");
        assert_eq!(store.uploaded_keys(), vec!["v1/frame_0.jpg"]);
    }
}
