//! Storage abstraction trait
//!
//! All object storage backends (S3-compatible, local filesystem) implement
//! [`Storage`]. The pipeline writes whole asset trees through it; the edge
//! proxy reads through it. Objects are never partially visible: a key only
//! resolves once its content is fully committed.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;
use vidpipe_core::StorageBackend;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Requested range not satisfiable (object size {size})")]
    RangeNotSatisfiable { size: u64 },

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether a retry could plausibly succeed. Auth, permission, and key
    /// errors abort immediately; network and backend errors are retried by
    /// the upload stage's retry policy.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::UploadFailed(_)
            | StorageError::DownloadFailed(_)
            | StorageError::BackendError(_)
            | StorageError::IoError(_) => true,
            StorageError::DeleteFailed(_)
            | StorageError::NotFound(_)
            | StorageError::InvalidKey(_)
            | StorageError::AccessDenied(_)
            | StorageError::RangeNotSatisfiable { .. }
            | StorageError::ConfigError(_) => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed chunk stream returned by download operations.
pub type ByteChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// A requested byte range, parsed from an HTTP `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-end` (end inclusive).
    FromTo(u64, u64),
    /// `bytes=start-`.
    From(u64),
    /// `bytes=-len` (final `len` bytes).
    Suffix(u64),
}

/// A ranged download: the chunk stream plus the byte accounting needed to
/// build a `206 Partial Content` response.
pub struct RangedObject {
    pub stream: ByteChunkStream,
    /// Total size of the object, not of the range.
    pub total_size: u64,
    /// First byte position served (inclusive).
    pub start: u64,
    /// Last byte position served (inclusive).
    pub end: u64,
}

impl RangedObject {
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Storage abstraction trait
///
/// Keys are posix-style (`<root>/<item_id>/<relative_path>`), never start
/// with `/`, and never contain `..`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload a local file to `key`. Backends use multipart transfer above
    /// their configured threshold; either way the object only becomes
    /// visible once fully committed. Returns the number of bytes stored.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<u64>;

    /// Upload an in-memory object to `key`.
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str)
        -> StorageResult<()>;

    /// Download an object as a chunk stream.
    async fn download_stream(&self, key: &str) -> StorageResult<ByteChunkStream>;

    /// Download part of an object. Fails with `RangeNotSatisfiable` when
    /// the range starts at or past the end of the object.
    async fn download_range(&self, key: &str, range: ByteRange) -> StorageResult<RangedObject>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size in bytes of an object, if it exists.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Which backend this is.
    fn backend_type(&self) -> StorageBackend;
}
