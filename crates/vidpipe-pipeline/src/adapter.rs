//! Ingestion source boundary.
//!
//! The orchestrator never talks to a chat client directly. It consumes
//! [`ItemEvent`]s from an [`ItemSource`] and sends progress text back
//! through the event's reply sink, so pipeline logic runs unchanged
//! against a real adapter or a test double.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Downloaded payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("Reply failed: {0}")]
    ReplyFailed(String),

    #[error("Source error: {0}")]
    Source(String),
}

/// One new ingested item: a stable identity, a retrievable payload, and a
/// reply sink pointing back at whoever submitted it.
#[async_trait]
pub trait ItemEvent: Send + Sync {
    /// Stable identifier derived from the source message identity.
    fn item_id(&self) -> &str;

    /// Fetch the payload into `dest_dir` and return the local file path.
    /// Must not return until the file is fully present on disk.
    async fn download(&self, dest_dir: &Path) -> Result<PathBuf, AdapterError>;

    /// Send a progress or result message back to the submitter.
    async fn reply(&self, text: &str) -> Result<(), AdapterError>;
}

/// A stream of new items. `next_event` returning `Ok(None)` means the
/// source is closed and no further items will arrive.
#[async_trait]
pub trait ItemSource: Send {
    async fn next_event(&mut self) -> Result<Option<Box<dyn ItemEvent>>, AdapterError>;
}
