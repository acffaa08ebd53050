//! Vidpipe Storage Library
//!
//! Object storage abstraction and backends. The pipeline's upload stage
//! writes asset trees through the [`Storage`] trait; the edge proxy reads
//! through it. Backends: S3-compatible (AWS S3, Cloudflare R2, MinIO) and
//! local filesystem.
//!
//! # Key format
//!
//! `<root>/<item_id>/<relative_path>`, always with forward slashes. Keys
//! must not contain `..` or a leading `/`. Key construction is centralized
//! in the [`keys`] module so all backends and callers stay consistent.

pub mod factory;
pub mod keys;
pub mod local;
pub mod s3;
pub mod traits;

pub use factory::create_storage;
pub use local::LocalStorage;
pub use s3::{MultipartTuning, S3Storage};
pub use traits::{
    ByteChunkStream, ByteRange, RangedObject, Storage, StorageError, StorageResult,
};
