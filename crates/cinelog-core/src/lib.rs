//! # cinelog-core
//!
//! Core types, traits, and abstractions for the cinelog video catalog.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other cinelog crates depend on.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod path;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use config::{AppConfig, BlobConfig, LlmConfig, ProviderConfig, WhisperConfig};
pub use error::{Error, Result};
pub use models::*;
pub use path::{filename_from_path, is_video_path, normalize_path, paths_equal, truncate_chars};
pub use traits::*;
pub use uuid_utils::new_v7;
