//! Vidpipe Transcode Library
//!
//! The transcode stage: drives the external `ffmpeg` binary to turn one
//! input video into a segmented HLS asset tree, one invocation per
//! rendition, with a synthesized master playlist for multi-rendition
//! output. All side effects stay inside the given output directory; a
//! failed run cleans its own partial output before the error propagates.

pub mod asset_tree;
pub mod ffmpeg;
pub mod playlist;

use async_trait::async_trait;
use std::path::Path;
use vidpipe_core::{AssetTree, RenditionSpec, TranscodeMode, TranscodeSettings};

/// Transcoding failures. All are terminal for the current attempt; retry
/// policy belongs to the orchestrator, not this stage.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Transcoding tool not found: {0}")]
    ToolNotFound(String),

    #[error("Transcoder exited with status {status}: {stderr_tail}")]
    NonZeroExit { status: i32, stderr_tail: String },

    #[error("No output produced in {0}")]
    NoOutputProduced(String),

    #[error("Input not readable: {0}")]
    InputUnreadable(String),

    #[error("Playlist {playlist} references missing segment {segment}")]
    MissingSegment { playlist: String, segment: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-run transcode options.
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub segment_duration_secs: u64,
    pub mode: TranscodeMode,
    /// Ladder used when `mode` is `Multi`, ordered as configured.
    pub renditions: Vec<RenditionSpec>,
}

impl From<&TranscodeSettings> for TranscodeOptions {
    fn from(settings: &TranscodeSettings) -> Self {
        Self {
            segment_duration_secs: settings.segment_duration_secs,
            mode: settings.mode,
            renditions: settings.renditions.clone(),
        }
    }
}

/// Transcode stage seam. The orchestrator only sees this trait, so
/// pipeline logic is testable without a real encoder.
#[async_trait]
pub trait Transcode: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        output_dir: &Path,
        options: &TranscodeOptions,
    ) -> Result<AssetTree, TranscodeError>;
}

pub use ffmpeg::FfmpegTranscoder;
