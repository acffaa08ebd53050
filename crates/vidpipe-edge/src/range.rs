//! HTTP `Range` header parsing.
//!
//! Only single byte ranges are honored. Multi-range requests and
//! malformed headers return `None`, and the caller falls back to a full
//! `200` response, which is always a valid answer to a range request.

use vidpipe_storage::ByteRange;

pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let spec = value.strip_prefix("bytes=")?.trim();
    if spec.contains(',') {
        return None;
    }

    let (start, end) = spec.split_once('-')?;
    match (start.is_empty(), end.is_empty()) {
        // bytes=-len
        (true, false) => {
            let len: u64 = end.parse().ok()?;
            if len == 0 {
                return None;
            }
            Some(ByteRange::Suffix(len))
        }
        // bytes=start-
        (false, true) => Some(ByteRange::From(start.parse().ok()?)),
        // bytes=start-end
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            if end < start {
                return None;
            }
            Some(ByteRange::FromTo(start, end))
        }
        (true, true) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_ranges() {
        assert_eq!(parse_range_header("bytes=0-499"), Some(ByteRange::FromTo(0, 499)));
        assert_eq!(parse_range_header("bytes=500-"), Some(ByteRange::From(500)));
        assert_eq!(parse_range_header("bytes=-200"), Some(ByteRange::Suffix(200)));
    }

    #[test]
    fn rejects_malformed_and_multi_ranges() {
        assert_eq!(parse_range_header("bytes=0-499,600-999"), None);
        assert_eq!(parse_range_header("bytes=499-0"), None);
        assert_eq!(parse_range_header("bytes=-"), None);
        assert_eq!(parse_range_header("bytes=abc-def"), None);
        assert_eq!(parse_range_header("items=0-499"), None);
    }
}
