//! # cinelog-provider
//!
//! Cloud storage provider clients for cinelog: the Dropbox v2 listing and
//! download-link client, the blob bucket client for derived artifacts, and
//! in-memory mocks for tests.

pub mod bucket;
pub mod dropbox;
pub mod mock;

pub use bucket::BucketClient;
pub use dropbox::DropboxClient;
pub use mock::{MockBlobStore, MockProvider};
