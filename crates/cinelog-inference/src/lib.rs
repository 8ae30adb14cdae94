//! # cinelog-inference
//!
//! Inference backends for cinelog: Whisper-compatible transcription and
//! chat-completions metadata drafting. Both are optional at runtime; the
//! pipeline soft-skips the corresponding stage when a backend is absent.

pub mod metadata;
pub mod transcription;

pub use metadata::{MetadataBackend, MetadataDraft, OpenAiMetadataBackend, StringOrList};
pub use transcription::{Transcription, TranscriptionBackend, WhisperBackend};
