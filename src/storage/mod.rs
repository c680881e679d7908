//! Persistence of crawled entities
//!
//! The crawler hands finished notes, comments and creators to a [`Store`].
//! Stores must be idempotent under duplicate ids and must never stall the
//! crawl on slow disk for longer than their configured write timeout.

mod json;
mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Comment, Creator, Note};

/// Errors that can occur while persisting entities
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A write did not finish within the configured bound
    #[error("write to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },
}

/// Sink for crawled entities
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a note, replacing any earlier copy with the same id
    async fn save_note(&self, note: &Note) -> Result<(), StoreError>;

    /// Persist a comment; a comment id already stored for the note is ignored
    ///
    /// Returns whether the comment was new.
    async fn save_comment(&self, comment: &Comment) -> Result<bool, StoreError>;

    /// Persist a creator profile
    async fn save_creator(&self, creator: &Creator) -> Result<(), StoreError>;

    /// Flush and release resources
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Replace characters that are unsafe in file names
pub(crate) fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
