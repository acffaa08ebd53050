//! Domain models: items moving through the pipeline and the asset trees
//! they produce.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline stage names, used in failure reporting and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Transcode,
    Upload,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Download => write!(f, "download"),
            Stage::Transcode => write!(f, "transcode"),
            Stage::Upload => write!(f, "upload"),
        }
    }
}

/// Lifecycle state of one ingested item.
///
/// Transitions are strictly sequential; `Failed` is terminal and reachable
/// from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Received,
    Downloading,
    Downloaded,
    Transcoding,
    Transcoded,
    Uploading,
    Completed,
    Failed { stage: Stage, reason: String },
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed { .. })
    }
}

/// One ingested video, tracked end-to-end through the pipeline.
///
/// Exclusively owned by the orchestrator while in flight; there is no
/// concurrent mutation of an item.
#[derive(Debug, Clone)]
pub struct Item {
    /// Stable identifier derived from the source message identity.
    pub item_id: String,
    /// Local path of the downloaded source file, once present.
    pub input_path: Option<PathBuf>,
    pub status: ItemStatus,
    /// Local directory holding the segmented output, once transcoded.
    pub output_root: Option<PathBuf>,
    /// Key namespace root for this item's objects, e.g. `videos/12345`.
    pub storage_prefix: String,
    /// Canonical public URL, set once upload completes.
    pub public_url: Option<String>,
}

impl Item {
    pub fn new(item_id: impl Into<String>, storage_prefix: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            input_path: None,
            status: ItemStatus::Received,
            output_root: None,
            storage_prefix: storage_prefix.into(),
            public_url: None,
        }
    }
}

/// One encoded quality variant of an item's video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rendition {
    pub name: String,
    /// Playlist path relative to the asset tree root (posix separators).
    pub playlist_path: String,
    /// Segment paths relative to the asset tree root, in temporal order.
    pub segment_paths: Vec<String>,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub segment_duration_secs: u64,
}

impl Rendition {
    /// Peak bandwidth in bits/s advertised in the master playlist.
    /// Video plus audio bitrate with ~10% container overhead.
    pub fn bandwidth(&self) -> u64 {
        let kbps = (self.video_bitrate_kbps + self.audio_bitrate_kbps) as u64;
        kbps * 1000 * 110 / 100
    }

    /// Pixel dimensions advertised in the master playlist. Width follows
    /// 16:9 rounded to an even number, matching the encoder's `scale=-2:h`.
    pub fn resolution(&self) -> (u32, u32) {
        let w = ((self.height as f64) * 16.0 / 9.0).round() as u32;
        let w = if w % 2 == 0 { w } else { w + 1 };
        (w, self.height)
    }
}

/// The full set of playlist and segment files produced for one item.
///
/// Relative path structure under `root` is preserved exactly under the
/// item's storage prefix at the destination.
#[derive(Debug, Clone)]
pub struct AssetTree {
    /// Local directory the tree lives under.
    pub root: PathBuf,
    /// Playlist viewers should start from, relative to `root`. The master
    /// playlist for multi-rendition output, the media playlist otherwise.
    pub primary_playlist: String,
    pub renditions: Vec<Rendition>,
    /// Every file in the tree, relative to `root` (posix separators).
    pub files: Vec<String>,
}

impl AssetTree {
    pub fn is_multi_rendition(&self) -> bool {
        self.renditions.len() > 1
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Summary returned by a successful upload stage run.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub uploaded_count: usize,
    pub total_bytes: u64,
    pub duration: Duration,
}
