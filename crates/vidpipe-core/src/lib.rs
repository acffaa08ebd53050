//! Vidpipe Core Library
//!
//! Shared configuration, domain models, and media type tables used by the
//! pipeline stages and the edge proxy. Components receive a validated
//! [`Config`] built once at startup; nothing else reads the environment.

pub mod config;
pub mod media;
pub mod models;
pub mod telemetry;

pub use config::{
    default_rendition_ladder, Config, ConfigError, EdgeConfig, PipelineConfig, RenditionSpec,
    RetrySettings, StorageBackend, StorageConfig, TranscodeMode, TranscodeSettings,
    UploadSettings,
};
pub use models::{AssetTree, Item, ItemStatus, Rendition, Stage, UploadReport};
