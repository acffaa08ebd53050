//! Vidpipe Pipeline Library
//!
//! Orchestration of the ingest pipeline: items arrive from an
//! [`adapter::ItemSource`], move through download, transcode, and upload
//! in strict order, and finish with a reply carrying the public URL. One
//! item's failure never affects another; concurrency is bounded by a
//! worker pool sized from configuration.

pub mod adapter;
pub mod orchestrator;
pub mod retry;
pub mod upload;

pub use adapter::{AdapterError, ItemEvent, ItemSource};
pub use orchestrator::Orchestrator;
pub use retry::RetryPolicy;
pub use upload::{UploadError, UploadStage};
