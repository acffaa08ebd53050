//! HLS playlist reading and master playlist synthesis.

use vidpipe_core::Rendition;

/// Build the master playlist for a multi-rendition asset tree. Renditions
/// are listed highest bandwidth first so players that take the first entry
/// start at the best quality.
pub fn master_playlist(renditions: &[Rendition]) -> String {
    let mut ordered: Vec<&Rendition> = renditions.iter().collect();
    ordered.sort_by(|a, b| b.bandwidth().cmp(&a.bandwidth()));

    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for rendition in ordered {
        let (width, height) = rendition.resolution();
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n{}\n",
            rendition.bandwidth(),
            width,
            height,
            rendition.playlist_path
        ));
    }
    playlist
}

/// Extract the segment entries of a media playlist: every non-empty line
/// that is not a tag, in file order (which is temporal order for VOD
/// output).
pub fn segment_entries(playlist_text: &str) -> Vec<String> {
    playlist_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendition(name: &str, height: u32, video_kbps: u32, audio_kbps: u32) -> Rendition {
        Rendition {
            name: name.to_string(),
            playlist_path: format!("variants/{}.m3u8", name),
            segment_paths: vec![],
            height,
            video_bitrate_kbps: video_kbps,
            audio_bitrate_kbps: audio_kbps,
            segment_duration_secs: 6,
        }
    }

    #[test]
    fn master_playlist_orders_by_descending_bitrate() {
        // Configured low-to-high on purpose; output must still be high-to-low.
        let renditions = vec![
            rendition("480p", 480, 1500, 96),
            rendition("720p", 720, 3000, 128),
        ];

        let master = master_playlist(&renditions);
        let p720 = master.find("variants/720p.m3u8").unwrap();
        let p480 = master.find("variants/480p.m3u8").unwrap();
        assert!(p720 < p480);
        assert!(master.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(master.contains("RESOLUTION=1280x720"));
        assert!(master.contains("RESOLUTION=854x480"));
    }

    #[test]
    fn segment_entries_skip_tags_and_blanks() {
        let text = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nseg_00000.ts\n\n#EXTINF:6.0,\nseg_00001.ts\n#EXT-X-ENDLIST\n";
        assert_eq!(segment_entries(text), vec!["seg_00000.ts", "seg_00001.ts"]);
    }
}
