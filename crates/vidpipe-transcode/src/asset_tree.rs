//! Asset tree collection and consistency verification.
//!
//! After the encoder runs, the tree handed to the upload stage must be
//! self-consistent: every segment referenced by a playlist exists on disk.
//! Broken trees fail here, before anything reaches storage.

use crate::playlist::segment_entries;
use crate::TranscodeError;
use std::path::Path;
use vidpipe_core::{AssetTree, Rendition};
use walkdir::WalkDir;

/// Read one rendition's media playlist and resolve its segment paths
/// relative to the tree root, verifying each segment exists.
pub async fn resolve_rendition(
    root: &Path,
    mut rendition: Rendition,
) -> Result<Rendition, TranscodeError> {
    let playlist_abs = root.join(&rendition.playlist_path);
    let text = tokio::fs::read_to_string(&playlist_abs).await.map_err(|_| {
        TranscodeError::NoOutputProduced(playlist_abs.display().to_string())
    })?;

    // Segment entries are relative to the playlist's own directory.
    let playlist_dir = match rendition.playlist_path.rsplit_once('/') {
        Some((dir, _)) => format!("{}/", dir),
        None => String::new(),
    };

    let mut segment_paths = Vec::new();
    for entry in segment_entries(&text) {
        let relative = format!("{}{}", playlist_dir, entry);
        if !tokio::fs::try_exists(root.join(&relative)).await.unwrap_or(false) {
            return Err(TranscodeError::MissingSegment {
                playlist: rendition.playlist_path.clone(),
                segment: relative,
            });
        }
        segment_paths.push(relative);
    }

    if segment_paths.is_empty() {
        return Err(TranscodeError::NoOutputProduced(
            playlist_abs.display().to_string(),
        ));
    }

    rendition.segment_paths = segment_paths;
    Ok(rendition)
}

/// Build the final [`AssetTree`] for an output directory: resolve every
/// rendition's playlist and take inventory of all files present.
pub async fn collect(
    root: &Path,
    primary_playlist: &str,
    renditions: Vec<Rendition>,
) -> Result<AssetTree, TranscodeError> {
    let mut resolved = Vec::with_capacity(renditions.len());
    for rendition in renditions {
        resolved.push(resolve_rendition(root, rendition).await?);
    }

    let files = list_files(root)?;
    if files.is_empty() {
        return Err(TranscodeError::NoOutputProduced(root.display().to_string()));
    }

    Ok(AssetTree {
        root: root.to_path_buf(),
        primary_playlist: primary_playlist.to_string(),
        renditions: resolved,
        files,
    })
}

/// All files under `root`, as sorted posix-relative paths.
fn list_files(root: &Path) -> Result<Vec<String>, TranscodeError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            TranscodeError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other("walk error without io cause")
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let posix = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        files.push(posix);
    }
    files.sort();
    Ok(files)
}
