//! Container analysis.

use std::fmt;

use stkpak_common::scan::{find_all, find_anchor, find_from};
use tracing::trace;

use crate::page::{
    first_page_checksum_ok, PageHeader, CAPTURE_PATTERN, CODEC_ID, FLAG_BOS, STREAM_VERSION,
};

/// How far into a buffer a page that lost its capture pattern is looked for.
pub const HEADLESS_WINDOW: usize = 64;

/// Where the codec identifier may start, relative to the end of the capture
/// pattern. In page coordinates this is `[25, 45)`.
const CODEC_ID_WINDOW: std::ops::Range<usize> = 21..41;

/// Classification of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerStatus {
    /// A usable first page sits at offset 0.
    Valid,
    /// The first page is intact apart from where it starts.
    MissingLeadingMarker,
    /// A capture pattern exists but nothing around it can be trusted.
    CorruptedHeader,
    /// No capture pattern anywhere.
    NoMarkerFound,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Valid => "valid",
            Self::MissingLeadingMarker => "missing leading marker",
            Self::CorruptedHeader => "corrupted header",
            Self::NoMarkerFound => "no marker found",
        })
    }
}

/// What [`analyze`] learned about a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerAnalysis {
    pub status: ContainerStatus,
    /// First capture pattern.
    pub first_marker: Option<usize>,
    /// Second capture pattern.
    pub second_marker: Option<usize>,
    /// First occurrence of the codec identifier.
    pub codec_id: Option<usize>,
    /// Whether a first page with a trustworthy layout was located.
    pub has_valid_structure: bool,
    /// Where the recoverable first page starts, for
    /// [`ContainerStatus::MissingLeadingMarker`]. Either a capture pattern,
    /// or the version byte of a page whose capture pattern is gone.
    pub page_start: Option<usize>,
}

impl ContainerAnalysis {
    /// One-line human readable summary.
    pub fn description(&self) -> String {
        match (self.status, self.page_start) {
            (ContainerStatus::Valid, _) if self.has_valid_structure => {
                "valid first page".to_string()
            }
            (ContainerStatus::Valid, _) => "first page checksum valid".to_string(),
            (ContainerStatus::MissingLeadingMarker, Some(start)) => {
                format!("first page recoverable at offset {start}")
            }
            (ContainerStatus::CorruptedHeader, _) => match self.first_marker {
                Some(pos) => format!("marker at offset {pos} but header is corrupted"),
                None => "header is corrupted".to_string(),
            },
            (status, _) => status.to_string(),
        }
    }
}

/// Classify a buffer. Pure; never modifies or caches anything.
pub fn analyze(data: &[u8]) -> ContainerAnalysis {
    let markers = find_all(data, &CAPTURE_PATTERN);
    let mut analysis = ContainerAnalysis {
        status: ContainerStatus::NoMarkerFound,
        first_marker: markers.first().copied(),
        second_marker: markers.get(1).copied(),
        codec_id: find_from(data, 0, CODEC_ID),
        has_valid_structure: false,
        page_start: None,
    };

    if analysis.first_marker == Some(0) {
        let sane = is_sane_page(data, 0);
        let version_ok = PageHeader::parse(data).is_some_and(|h| h.version == STREAM_VERSION);
        if sane || (version_ok && first_page_checksum_ok(data)) {
            analysis.status = ContainerStatus::Valid;
            analysis.has_valid_structure = sane;
        } else {
            analysis.status = ContainerStatus::CorruptedHeader;
        }
        return analysis;
    }

    // A layout right behind an intact capture pattern is a whole page, handled below.
    let headless = |d: &[u8], pos: usize| {
        !d[..pos].ends_with(&CAPTURE_PATTERN) && layout_ok(&d[pos..])
    };
    if let Some(start) = find_anchor(data, 0, HEADLESS_WINDOW, headless) {
        trace!(start, "page without capture pattern");
        analysis.status = ContainerStatus::MissingLeadingMarker;
        analysis.has_valid_structure = true;
        analysis.page_start = Some(start);
        return analysis;
    }

    if let Some(&pos) = markers.iter().find(|&&pos| is_sane_page(data, pos)) {
        trace!(pos, "first page after leading bytes");
        analysis.status = ContainerStatus::MissingLeadingMarker;
        analysis.has_valid_structure = true;
        analysis.page_start = Some(pos);
        return analysis;
    }

    if analysis.first_marker.is_some() {
        analysis.status = ContainerStatus::CorruptedHeader;
    }
    analysis
}

/// A capture pattern at `pos` followed by a trustworthy first-page layout.
pub(crate) fn is_sane_page(data: &[u8], pos: usize) -> bool {
    data[pos..].starts_with(&CAPTURE_PATTERN) && layout_ok(&data[pos + CAPTURE_PATTERN.len()..])
}

/// Check the bytes following a capture pattern: stream version, the
/// beginning-of-stream flag, and the codec identifier a little further on.
fn layout_ok(tail: &[u8]) -> bool {
    if tail.len() < PageHeader::SIZE - CAPTURE_PATTERN.len() {
        return false;
    }
    if tail[0] != STREAM_VERSION || tail[1] & FLAG_BOS == 0 {
        return false;
    }

    let end = (CODEC_ID_WINDOW.end + CODEC_ID.len() - 1).min(tail.len());
    find_from(&tail[..end], CODEC_ID_WINDOW.start, CODEC_ID).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{stream, stream_without_checksum};

    #[test]
    fn test_valid_stream() {
        let data = stream();
        let analysis = analyze(&data);

        assert_eq!(analysis.status, ContainerStatus::Valid);
        assert!(analysis.has_valid_structure);
        assert_eq!(analysis.first_marker, Some(0));
        assert_eq!(analysis.second_marker, Some(58));
        assert_eq!(analysis.codec_id, Some(29));
    }

    #[test]
    fn test_stale_checksum_is_still_valid() {
        let analysis = analyze(&stream_without_checksum());
        assert_eq!(analysis.status, ContainerStatus::Valid);
    }

    #[test]
    fn test_missing_first_four_bytes() {
        let data = stream();
        let analysis = analyze(&data[4..]);

        assert_eq!(analysis.status, ContainerStatus::MissingLeadingMarker);
        assert_eq!(analysis.page_start, Some(0));
        assert_eq!(analysis.first_marker, Some(54));
    }

    #[test]
    fn test_leading_junk_before_marker() {
        let mut data = b"junk-junk-junk-junk-junk-junk-junk-junk-junk-junk-junk-junk-junk-junk!".to_vec();
        data.extend_from_slice(&stream());
        let analysis = analyze(&data);

        assert_eq!(analysis.status, ContainerStatus::MissingLeadingMarker);
        assert_eq!(analysis.page_start, Some(70));
    }

    #[test]
    fn test_short_junk_before_whole_page() {
        let mut data = vec![0x11u8; 20];
        data.extend_from_slice(&stream());
        let analysis = analyze(&data);

        assert_eq!(analysis.status, ContainerStatus::MissingLeadingMarker);
        assert_eq!(analysis.page_start, Some(20));
        assert_eq!(analysis.first_marker, Some(20));
    }

    #[test]
    fn test_corrupted_header() {
        let mut data = stream();
        data[4] = 7;
        data[5] = 0;
        data[23] ^= 0xFF;
        assert_eq!(analyze(&data).status, ContainerStatus::CorruptedHeader);
    }

    #[test]
    fn test_marker_later_without_layout() {
        let mut data = vec![0xAAu8; 80];
        data.extend_from_slice(b"OggS\x05\x00 nothing useful here");
        let analysis = analyze(&data);

        assert_eq!(analysis.status, ContainerStatus::CorruptedHeader);
        assert_eq!(analysis.first_marker, Some(80));
    }

    #[test]
    fn test_no_marker() {
        let analysis = analyze(b"just some bytes");
        assert_eq!(analysis.status, ContainerStatus::NoMarkerFound);
        assert_eq!(analysis.first_marker, None);
        assert_eq!(analysis.codec_id, None);
        assert_eq!(analyze(&[]).status, ContainerStatus::NoMarkerFound);
    }

    #[test]
    fn test_description() {
        assert_eq!(analyze(&stream()).description(), "valid first page");
        assert_eq!(
            analyze(&stream()[4..]).description(),
            "first page recoverable at offset 0"
        );
        assert_eq!(analyze(b"").description(), "no marker found");
    }
}
