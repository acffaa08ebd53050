//! Media type tables shared by the upload stage and the edge proxy.
//!
//! Objects are stored with their correct content type and served with a
//! cache policy keyed on extension: segments are immutable once written
//! (long cache), playlists may be rewritten (short cache so updates
//! propagate), everything else gets a moderate default.

/// Content type for HLS playlists.
pub const CONTENT_TYPE_M3U8: &str = "application/vnd.apple.mpegurl";
/// Content type for MPEG transport stream segments.
pub const CONTENT_TYPE_TS: &str = "video/MP2T";

/// Infer a content type from a storage key or file name extension.
pub fn content_type_for(name: &str) -> &'static str {
    match extension(name) {
        Some("m3u8") => CONTENT_TYPE_M3U8,
        Some("ts") => CONTENT_TYPE_TS,
        Some("mp4") => "video/mp4",
        Some("m4v") => "video/mp4",
        Some("mpd") => "application/dash+xml",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Cache-control policy by extension.
pub fn cache_control_for(name: &str) -> &'static str {
    match extension(name) {
        // Segments never change once written.
        Some("ts") => "public, max-age=86400, immutable",
        // Playlists can be rewritten; keep propagation fast.
        Some("m3u8") => "public, max-age=30",
        _ => "public, max-age=3600",
    }
}

/// Extensions recognized as video payloads at the ingestion boundary.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "webm", "avi", "m4v"];

/// Whether a file name carries a known video extension.
pub fn has_video_extension(name: &str) -> bool {
    extension(name).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext))
}

fn extension(name: &str) -> Option<&str> {
    let base = name.rsplit('/').next().unwrap_or(name);
    let (_, ext) = base.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_for_hls_assets() {
        assert_eq!(
            content_type_for("videos/123/playlist.m3u8"),
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(content_type_for("videos/123/seg_00001.ts"), "video/MP2T");
        assert_eq!(content_type_for("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for("manifest.mpd"), "application/dash+xml");
        assert_eq!(content_type_for("unknown.bin"), "application/octet-stream");
        assert_eq!(content_type_for("no-extension"), "application/octet-stream");
    }

    #[test]
    fn cache_policy_is_asymmetric() {
        assert_eq!(
            cache_control_for("seg_00001.ts"),
            "public, max-age=86400, immutable"
        );
        assert_eq!(cache_control_for("playlist.m3u8"), "public, max-age=30");
        assert_eq!(cache_control_for("poster.jpg"), "public, max-age=3600");
    }

    #[test]
    fn video_extension_detection() {
        assert!(has_video_extension("movie.MP4".to_lowercase().as_str()));
        assert!(has_video_extension("clip.mkv"));
        assert!(!has_video_extension("notes.txt"));
        assert!(!has_video_extension("plain"));
    }
}
