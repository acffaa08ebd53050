//! Configuration module
//!
//! One immutable [`Config`] is built from the environment at startup and
//! validated before anything runs. Pipeline stages and the edge proxy only
//! ever see this structure; they never read the environment themselves.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

const DEFAULT_KEY_ROOT: &str = "videos";
const DEFAULT_SEGMENT_DURATION_SECS: u64 = 6;
const DEFAULT_MULTIPART_THRESHOLD_MB: u64 = 8;
const DEFAULT_PART_SIZE_MB: u64 = 8;
const DEFAULT_PART_CONCURRENCY: usize = 4;
const DEFAULT_MAX_CONCURRENT_ITEMS: usize = 1;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_SERVER_PORT: u16 = 8080;

/// S3 multipart parts must be at least 5 MiB (except the last).
pub const MIN_PART_SIZE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which object storage backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" | "r2" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Object storage configuration. Bucket/region/endpoint requirements are
/// enforced by the backend factory for the selected backend.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible providers (R2, MinIO, Spaces).
    pub endpoint: Option<String>,
    pub local_path: Option<String>,
    pub local_base_url: Option<String>,
}

/// Explicit retry schedule for per-file transfers.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

/// Upload stage tuning.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Files at or above this size use multipart transfer.
    pub multipart_threshold_bytes: u64,
    pub part_size_bytes: u64,
    /// Bounded in-flight parts for a single large file, distinct from the
    /// item-level concurrency bound.
    pub part_concurrency: usize,
    pub retry: RetrySettings,
    /// Log intended keys without writing anything.
    pub dry_run: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            multipart_threshold_bytes: DEFAULT_MULTIPART_THRESHOLD_MB * 1024 * 1024,
            part_size_bytes: DEFAULT_PART_SIZE_MB * 1024 * 1024,
            part_concurrency: DEFAULT_PART_CONCURRENCY,
            retry: RetrySettings::default(),
            dry_run: false,
        }
    }
}

/// Whether transcoding produces one rendition or the configured ladder
/// plus a master playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeMode {
    Single,
    Multi,
}

/// One entry in the rendition ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenditionSpec {
    pub label: String,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

/// Default ladder: 720p and 480p, matching the single-rendition encode
/// settings at two bitrate tiers.
pub fn default_rendition_ladder() -> Vec<RenditionSpec> {
    vec![
        RenditionSpec {
            label: "720p".to_string(),
            height: 720,
            video_bitrate_kbps: 3000,
            audio_bitrate_kbps: 128,
        },
        RenditionSpec {
            label: "480p".to_string(),
            height: 480,
            video_bitrate_kbps: 1500,
            audio_bitrate_kbps: 96,
        },
    ]
}

/// Transcode stage settings.
#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    pub ffmpeg_path: String,
    pub segment_duration_secs: u64,
    pub mode: TranscodeMode,
    /// Ladder used when `mode` is `Multi`.
    pub renditions: Vec<RenditionSpec>,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            segment_duration_secs: DEFAULT_SEGMENT_DURATION_SECS,
            mode: TranscodeMode::Single,
            renditions: default_rendition_ladder(),
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root under which per-item working directories are created.
    pub work_dir: PathBuf,
    /// Public base URL the edge proxy is reachable at.
    pub base_url: String,
    /// First key path segment for all stored objects (default `videos`).
    pub key_root: String,
    /// Remove an item's working directory after successful upload.
    pub cleanup: bool,
    /// Bounded number of items processed concurrently.
    pub max_concurrent_items: usize,
}

/// Edge proxy settings.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub server_port: u16,
    /// Requests outside this root segment are 404 (default `videos`).
    pub key_root: String,
}

/// Application configuration, shared by the ingest daemon and edge proxy.
#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub transcode: TranscodeSettings,
    pub upload: UploadSettings,
    pub storage: StorageConfig,
    pub edge: EdgeConfig,
}

impl Config {
    /// Read and validate configuration from the environment. This is the
    /// only place the process environment is consulted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let key_root = env::var("KEY_ROOT")
            .unwrap_or_else(|_| DEFAULT_KEY_ROOT.to_string())
            .trim_matches('/')
            .to_string();

        let base_url = env::var("PUBLIC_BASE_URL")
            .map_err(|_| ConfigError::Missing("PUBLIC_BASE_URL"))?
            .trim_end_matches('/')
            .to_string();

        let renditions = match env::var("RENDITION_LADDER") {
            Ok(raw) => {
                serde_json::from_str::<Vec<RenditionSpec>>(&raw).map_err(|e| {
                    ConfigError::Invalid {
                        name: "RENDITION_LADDER",
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?
            }
            Err(_) => default_rendition_ladder(),
        };

        let mode = if parse_bool("MULTIBITRATE", false)? {
            TranscodeMode::Multi
        } else {
            TranscodeMode::Single
        };

        let backend = match env::var("STORAGE_BACKEND") {
            Ok(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "STORAGE_BACKEND",
                value: raw.clone(),
                reason,
            })?,
            Err(_) => StorageBackend::S3,
        };

        // R2 deployments only set the account id; derive the endpoint.
        let endpoint = env::var("S3_ENDPOINT").ok().or_else(|| {
            env::var("R2_ACCOUNT_ID")
                .ok()
                .map(|account| format!("https://{}.r2.cloudflarestorage.com", account))
        });

        let config = Config {
            pipeline: PipelineConfig {
                work_dir: PathBuf::from(
                    env::var("WORK_DIR").unwrap_or_else(|_| "./workdir".to_string()),
                ),
                base_url,
                key_root: key_root.clone(),
                cleanup: parse_bool("CLEANUP", false)?,
                max_concurrent_items: parse_num(
                    "PIPELINE_MAX_CONCURRENT_ITEMS",
                    DEFAULT_MAX_CONCURRENT_ITEMS,
                )?,
            },
            transcode: TranscodeSettings {
                ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
                segment_duration_secs: parse_num(
                    "HLS_SEGMENT_TIME",
                    DEFAULT_SEGMENT_DURATION_SECS,
                )?,
                mode,
                renditions,
            },
            upload: UploadSettings {
                multipart_threshold_bytes: parse_num::<u64>(
                    "UPLOAD_MULTIPART_THRESHOLD_MB",
                    DEFAULT_MULTIPART_THRESHOLD_MB,
                )? * 1024
                    * 1024,
                part_size_bytes: parse_num::<u64>("UPLOAD_PART_SIZE_MB", DEFAULT_PART_SIZE_MB)?
                    * 1024
                    * 1024,
                part_concurrency: parse_num("UPLOAD_PART_CONCURRENCY", DEFAULT_PART_CONCURRENCY)?,
                retry: RetrySettings {
                    max_attempts: parse_num("UPLOAD_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS)?,
                    base_delay_ms: parse_num(
                        "UPLOAD_RETRY_BASE_DELAY_MS",
                        DEFAULT_RETRY_BASE_DELAY_MS,
                    )?,
                    max_delay_ms: parse_num(
                        "UPLOAD_RETRY_MAX_DELAY_MS",
                        DEFAULT_RETRY_MAX_DELAY_MS,
                    )?,
                },
                dry_run: parse_bool("UPLOAD_DRY_RUN", false)?,
            },
            storage: StorageConfig {
                backend,
                bucket: env::var("S3_BUCKET")
                    .or_else(|_| env::var("R2_BUCKET"))
                    .ok(),
                region: env::var("S3_REGION").ok().or(Some("auto".to_string())),
                endpoint,
                local_path: env::var("LOCAL_STORAGE_PATH").ok(),
                local_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            },
            edge: EdgeConfig {
                server_port: parse_num("PORT", DEFAULT_SERVER_PORT)?,
                key_root,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants. Called by `from_env`, and directly by
    /// tests that build configs by hand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.key_root.is_empty() || self.pipeline.key_root.contains('/') {
            return Err(ConfigError::Invalid {
                name: "KEY_ROOT",
                value: self.pipeline.key_root.clone(),
                reason: "must be a single non-empty path segment".to_string(),
            });
        }
        if self.pipeline.base_url.is_empty() {
            return Err(ConfigError::Missing("PUBLIC_BASE_URL"));
        }
        if self.pipeline.max_concurrent_items == 0 {
            return Err(ConfigError::Invalid {
                name: "PIPELINE_MAX_CONCURRENT_ITEMS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.transcode.segment_duration_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "HLS_SEGMENT_TIME",
                value: "0".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.transcode.mode == TranscodeMode::Multi && self.transcode.renditions.is_empty() {
            return Err(ConfigError::Invalid {
                name: "RENDITION_LADDER",
                value: "[]".to_string(),
                reason: "multi-rendition mode needs at least one rendition".to_string(),
            });
        }
        if self.upload.part_size_bytes < MIN_PART_SIZE_BYTES {
            return Err(ConfigError::Invalid {
                name: "UPLOAD_PART_SIZE_MB",
                value: self.upload.part_size_bytes.to_string(),
                reason: "parts must be at least 5 MiB".to_string(),
            });
        }
        if self.upload.part_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "UPLOAD_PART_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.upload.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "UPLOAD_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        },
        Err(_) => Ok(default),
    }
}

fn parse_num<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: "not a valid number".to_string(),
        }),
        Err(_) => Ok(default),
    }
}
