//! FfmpegTranscoder - segmented HLS encoding via the external ffmpeg binary.

use crate::{asset_tree, playlist, Transcode, TranscodeError, TranscodeOptions};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use vidpipe_core::{AssetTree, Rendition, RenditionSpec, TranscodeMode};

const STDERR_TAIL_BYTES: usize = 2048;

/// Nominal bitrates recorded for single-rendition output. The encode is
/// CRF-driven, so these only feed rendition metadata, not the encoder.
const SINGLE_VIDEO_KBPS: u32 = 3000;
const SINGLE_AUDIO_KBPS: u32 = 128;

/// Drives one ffmpeg invocation per rendition. Stateless apart from the
/// binary path; safe to share across items.
#[derive(Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Shared encode arguments: H.264 veryfast CRF 23, fixed GOP for clean
    /// segment boundaries, AAC audio, VOD playlist type.
    fn base_args(input: &Path, segment_duration_secs: u64) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "0:a:0?".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-crf".to_string(),
            "23".to_string(),
            "-g".to_string(),
            "48".to_string(),
            "-sc_threshold".to_string(),
            "0".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-hls_time".to_string(),
            segment_duration_secs.to_string(),
            "-hls_playlist_type".to_string(),
            "vod".to_string(),
        ]
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), TranscodeError> {
        tracing::debug!(ffmpeg = %self.ffmpeg_path, args = ?args, "Running ffmpeg");

        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::ToolNotFound(self.ffmpeg_path.clone())
                } else {
                    TranscodeError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let stderr_tail = stderr[tail_start..].to_string();
            return Err(TranscodeError::NonZeroExit {
                status: output.status.code().unwrap_or(-1),
                stderr_tail,
            });
        }

        Ok(())
    }

    /// One encode producing `playlist.m3u8` + `seg_%05d.ts` at the root,
    /// scaled to 720p.
    async fn run_single(
        &self,
        input: &Path,
        output_dir: &Path,
        options: &TranscodeOptions,
    ) -> Result<Rendition, TranscodeError> {
        let mut args = Self::base_args(input, options.segment_duration_secs);
        args.extend([
            "-b:a".to_string(),
            format!("{}k", SINGLE_AUDIO_KBPS),
            "-vf".to_string(),
            "scale=-2:720:flags=lanczos".to_string(),
            "-hls_segment_filename".to_string(),
            output_dir.join("seg_%05d.ts").to_string_lossy().to_string(),
            output_dir.join("playlist.m3u8").to_string_lossy().to_string(),
        ]);

        self.run_ffmpeg(&args).await?;

        Ok(Rendition {
            name: "720p".to_string(),
            playlist_path: "playlist.m3u8".to_string(),
            segment_paths: vec![],
            height: 720,
            video_bitrate_kbps: SINGLE_VIDEO_KBPS,
            audio_bitrate_kbps: SINGLE_AUDIO_KBPS,
            segment_duration_secs: options.segment_duration_secs,
        })
    }

    /// One encode per ladder entry, writing under `variants/`.
    async fn run_rendition(
        &self,
        input: &Path,
        output_dir: &Path,
        spec: &RenditionSpec,
        segment_duration_secs: u64,
    ) -> Result<Rendition, TranscodeError> {
        let variants_dir = output_dir.join("variants");
        tokio::fs::create_dir_all(&variants_dir).await?;

        let playlist = variants_dir.join(format!("{}.m3u8", spec.label));
        let segments = variants_dir.join(format!("seg_{}_%05d.ts", spec.label));

        let mut args = Self::base_args(input, segment_duration_secs);
        args.extend([
            "-b:a".to_string(),
            format!("{}k", spec.audio_bitrate_kbps),
            "-vf".to_string(),
            format!("scale=-2:{}:flags=lanczos", spec.height),
            "-maxrate".to_string(),
            format!("{}k", spec.video_bitrate_kbps),
            "-bufsize".to_string(),
            "2M".to_string(),
            "-hls_segment_filename".to_string(),
            segments.to_string_lossy().to_string(),
            playlist.to_string_lossy().to_string(),
        ]);

        self.run_ffmpeg(&args).await?;

        Ok(Rendition {
            name: spec.label.clone(),
            playlist_path: format!("variants/{}.m3u8", spec.label),
            segment_paths: vec![],
            height: spec.height,
            video_bitrate_kbps: spec.video_bitrate_kbps,
            audio_bitrate_kbps: spec.audio_bitrate_kbps,
            segment_duration_secs,
        })
    }
}

/// Remove everything under `dir` without removing the directory itself.
/// Used both before a run (re-ingestion overwrites cleanly) and after a
/// failed run (no partial segments are left in place).
async fn clear_dir(dir: &Path) -> Result<(), TranscodeError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl Transcode for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output_dir: &Path,
        options: &TranscodeOptions,
    ) -> Result<AssetTree, TranscodeError> {
        tokio::fs::metadata(input)
            .await
            .map_err(|e| TranscodeError::InputUnreadable(format!("{}: {}", input.display(), e)))?;

        tokio::fs::create_dir_all(output_dir).await?;
        clear_dir(output_dir).await?;

        let start = std::time::Instant::now();

        let result = match options.mode {
            TranscodeMode::Single => {
                let rendition = self.run_single(input, output_dir, options).await?;
                asset_tree::collect(output_dir, "playlist.m3u8", vec![rendition]).await
            }
            TranscodeMode::Multi => {
                let mut renditions = Vec::with_capacity(options.renditions.len());
                for spec in &options.renditions {
                    tracing::info!(rendition = %spec.label, "Encoding rendition");
                    renditions.push(
                        self.run_rendition(input, output_dir, spec, options.segment_duration_secs)
                            .await?,
                    );
                }

                let master = playlist::master_playlist(&renditions);
                tokio::fs::write(output_dir.join("playlist.m3u8"), master).await?;

                asset_tree::collect(output_dir, "playlist.m3u8", renditions).await
            }
        };

        match result {
            Ok(tree) => {
                tracing::info!(
                    input = %input.display(),
                    output = %output_dir.display(),
                    renditions = tree.renditions.len(),
                    files = tree.file_count(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Transcode complete"
                );
                Ok(tree)
            }
            Err(e) => {
                // Never leave truncated segments behind for the uploader.
                if let Err(cleanup_err) = clear_dir(output_dir).await {
                    tracing::warn!(error = %cleanup_err, "Failed to clear partial transcode output");
                }
                Err(e)
            }
        }
    }
}
