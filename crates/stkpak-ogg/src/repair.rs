//! Container repair.
//!
//! Repairs never lose data the caller might still want: a buffer that is
//! already valid comes back untouched, and one that cannot be repaired comes
//! back unchanged with [`RepairAction::Unrepairable`].

use std::path::Path;

use tracing::{debug, warn};
use zerocopy::IntoBytes;

use crate::analysis::{analyze, ContainerAnalysis, ContainerStatus};
use crate::page::{
    first_page_checksum_ok, write_first_page_checksum, PageHeader, CAPTURE_PATTERN, DEFAULT_SERIAL,
    IDENTIFICATION_PACKET_SIZE, PACKET_TYPE_IDENTIFICATION,
};

/// Size of the reconstructed header: page header, a one-entry segment table
/// and the packet type byte that precedes the codec identifier.
pub const TEMPLATE_SIZE: usize = PageHeader::SIZE + 2;

/// Bytes of the identification packet from the codec identifier onward.
const IDENTIFICATION_TAIL: usize = IDENTIFICATION_PACKET_SIZE as usize - 1;

/// What [`repair_with_outcome`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairAction {
    /// The buffer was valid.
    Unchanged,
    /// The capture pattern was put back in front of the first page.
    PrependedMarker,
    /// Bytes in front of the first page were dropped.
    DroppedLeadingBytes,
    /// A fresh header was spliced in front of the codec identifier.
    Reconstructed,
    /// Nothing could be done; the buffer is returned as is.
    Unrepairable,
}

impl RepairAction {
    /// Whether the output differs from the input.
    pub fn modified(self) -> bool {
        !matches!(self, Self::Unchanged | Self::Unrepairable)
    }
}

/// Result of a repair attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// The repaired buffer, or a copy of the input.
    pub data: Vec<u8>,
    pub action: RepairAction,
    /// Analysis of the input.
    pub analysis: ContainerAnalysis,
}

/// Repair a buffer and return the result.
///
/// `repair(&repair(x)) == repair(x)` holds for every input.
pub fn repair(data: &[u8]) -> Vec<u8> {
    repair_with_outcome(data).data
}

/// Repair a buffer, reporting what was done.
pub fn repair_with_outcome(data: &[u8]) -> RepairOutcome {
    let analysis = analyze(data);

    let (repaired, action) = match (analysis.status, analysis.page_start) {
        (ContainerStatus::Valid, _) => (data.to_vec(), RepairAction::Unchanged),
        (ContainerStatus::MissingLeadingMarker, Some(start))
            if data[start..].starts_with(&CAPTURE_PATTERN) =>
        {
            debug!(dropped = start, "dropping bytes before first page");
            (data[start..].to_vec(), RepairAction::DroppedLeadingBytes)
        }
        (ContainerStatus::MissingLeadingMarker, Some(start)) => {
            debug!(start, "restoring capture pattern");
            let mut repaired = Vec::with_capacity(CAPTURE_PATTERN.len() + data.len() - start);
            repaired.extend_from_slice(&CAPTURE_PATTERN);
            repaired.extend_from_slice(&data[start..]);
            (repaired, RepairAction::PrependedMarker)
        }
        _ => match reconstruct(data, &analysis) {
            Some(repaired) => (repaired, RepairAction::Reconstructed),
            None => {
                warn!(status = %analysis.status, "container could not be repaired");
                (data.to_vec(), RepairAction::Unrepairable)
            }
        },
    };

    RepairOutcome {
        data: repaired,
        action,
        analysis,
    }
}

/// Rebuild the first page header from a template.
///
/// The serial number is salvaged from the first capture pattern when there
/// is one. Everything before the codec identifier is replaced. Returns
/// `None` when the identifier is missing or the packet behind it is cut
/// short.
pub fn reconstruct(data: &[u8], analysis: &ContainerAnalysis) -> Option<Vec<u8>> {
    let codec = analysis.codec_id?;
    if data.len() - codec < IDENTIFICATION_TAIL {
        debug!(codec, "identification packet truncated");
        return None;
    }

    let serial = analysis
        .first_marker
        .and_then(|pos| data.get(pos + 14..pos + 18))
        .and_then(|bytes| bytes.try_into().ok())
        .unwrap_or(DEFAULT_SERIAL);

    let mut repaired = Vec::with_capacity(TEMPLATE_SIZE + data.len() - codec);
    repaired.extend_from_slice(PageHeader::first_page(serial, 1).as_bytes());
    repaired.push(IDENTIFICATION_PACKET_SIZE);
    repaired.push(PACKET_TYPE_IDENTIFICATION);
    repaired.extend_from_slice(&data[codec..]);

    if !write_first_page_checksum(&mut repaired) {
        return None;
    }
    debug!(
        discarded = codec,
        serial = u32::from_le_bytes(serial),
        "reconstructed first page"
    );
    Some(repaired)
}

/// Recompute a stale first-page checksum.
///
/// Only buffers that open with a capture pattern and a complete first page
/// are touched; everything else is returned as is.
pub fn refresh_checksum(data: &[u8]) -> Vec<u8> {
    let mut refreshed = data.to_vec();
    if data.starts_with(&CAPTURE_PATTERN) && !first_page_checksum_ok(data) {
        write_first_page_checksum(&mut refreshed);
    }
    refreshed
}

/// Whether a file name looks like an Ogg stream.
pub fn is_ogg_name<P: AsRef<Path>>(name: P) -> bool {
    name.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ogg"))
}

/// Whether a buffer needs no repair.
pub fn is_valid(data: &[u8]) -> bool {
    analyze(data).status == ContainerStatus::Valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::first_page_checksum_ok;
    use crate::test_support::{stream, stream_without_checksum};
    use proptest::prelude::*;

    #[test]
    fn test_valid_is_untouched() {
        let data = stream();
        let outcome = repair_with_outcome(&data);

        assert_eq!(outcome.action, RepairAction::Unchanged);
        assert!(!outcome.action.modified());
        assert_eq!(outcome.data, data);
    }

    #[test]
    fn test_stale_checksum_needs_explicit_refresh() {
        let data = stream_without_checksum();
        assert_eq!(repair(&data), data);
        assert!(!first_page_checksum_ok(&data));

        let refreshed = refresh_checksum(&data);
        assert!(first_page_checksum_ok(&refreshed));
        assert_eq!(refreshed, stream());
        assert_eq!(refresh_checksum(&refreshed), refreshed);
    }

    #[test]
    fn test_prepends_missing_marker() {
        let original = stream();
        let damaged = &original[4..];
        let outcome = repair_with_outcome(damaged);

        assert_eq!(outcome.analysis.status, ContainerStatus::MissingLeadingMarker);
        assert_eq!(outcome.action, RepairAction::PrependedMarker);
        assert_eq!(outcome.data.len(), damaged.len() + 4);
        assert_eq!(&outcome.data[4..], damaged);
        assert_eq!(outcome.data, original);
    }

    #[test]
    fn test_drops_leading_bytes() {
        let mut data = vec![0xEEu8; 100];
        data.extend_from_slice(&stream());
        let outcome = repair_with_outcome(&data);

        assert_eq!(outcome.action, RepairAction::DroppedLeadingBytes);
        assert_eq!(outcome.data, stream());
    }

    #[test]
    fn test_drops_short_leading_junk() {
        for junk in [1usize, 4, 20, 60] {
            let mut data = vec![0x11u8; junk];
            data.extend_from_slice(&stream());
            let outcome = repair_with_outcome(&data);

            assert_eq!(outcome.action, RepairAction::DroppedLeadingBytes, "junk {junk}");
            assert_eq!(outcome.analysis.page_start, Some(junk));
            assert_eq!(outcome.data, stream());
        }
    }

    #[test]
    fn test_reconstructs_corrupted_header() {
        let mut data = stream();
        data[4] = 9;
        data[5] = 0;
        data[26] = 0xFF;
        let outcome = repair_with_outcome(&data);

        assert_eq!(outcome.analysis.status, ContainerStatus::CorruptedHeader);
        assert_eq!(outcome.action, RepairAction::Reconstructed);
        assert!(first_page_checksum_ok(&outcome.data));
        assert!(is_valid(&outcome.data));
        // Serial survives, everything from the codec identifier on is kept.
        assert_eq!(&outcome.data[14..18], &data[14..18]);
        assert_eq!(&outcome.data[29..], &data[29..]);
    }

    #[test]
    fn test_reconstructs_without_any_marker() {
        let packet = &stream()[28..58];
        let mut data = b"garbage!!!".to_vec();
        data.extend_from_slice(packet);
        let outcome = repair_with_outcome(&data);

        assert_eq!(outcome.analysis.status, ContainerStatus::NoMarkerFound);
        assert_eq!(outcome.action, RepairAction::Reconstructed);
        assert_eq!(outcome.data.len(), TEMPLATE_SIZE + packet.len() - 1);
        assert_eq!(&outcome.data[14..18], &DEFAULT_SERIAL);
        assert!(first_page_checksum_ok(&outcome.data));
    }

    #[test]
    fn test_unrepairable_is_returned_unchanged() {
        let data = b"OggS but nothing else of use".to_vec();
        let outcome = repair_with_outcome(&data);
        assert_eq!(outcome.action, RepairAction::Unrepairable);
        assert_eq!(outcome.data, data);

        let truncated = b"xx\x01vorbis\x00\x00".to_vec();
        assert_eq!(repair(&truncated), truncated);
        assert!(repair(&[]).is_empty());
    }

    #[test]
    fn test_is_ogg_name() {
        assert!(is_ogg_name("BGM/title_loop.ogg"));
        assert!(is_ogg_name("SE\\HIT.OGG"));
        assert!(!is_ogg_name("EVENT/cg01.png"));
        assert!(!is_ogg_name("ogg"));
    }

    fn damaged_stream() -> impl Strategy<Value = Vec<u8>> {
        (0usize..64, prop::collection::vec((0usize..96, any::<u8>()), 0..6)).prop_map(
            |(cut, edits)| {
                let mut data = stream();
                for (at, value) in edits {
                    data[at] = value;
                }
                data.split_off(cut.min(data.len()))
            },
        )
    }

    proptest! {
        #[test]
        fn test_repair_is_idempotent(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let once = repair(&data);
            prop_assert_eq!(repair(&once), once);
        }

        #[test]
        fn test_repair_is_idempotent_on_damaged_streams(data in damaged_stream()) {
            let once = repair(&data);
            prop_assert_eq!(repair(&once), once);
        }

        #[test]
        fn test_valid_input_is_returned_bitwise(data in damaged_stream()) {
            if analyze(&data).status == ContainerStatus::Valid {
                prop_assert_eq!(repair(&data), data);
            }
        }

        #[test]
        fn test_modified_output_is_valid(data in damaged_stream()) {
            let outcome = repair_with_outcome(&data);
            if outcome.action.modified() {
                prop_assert!(is_valid(&outcome.data));
            }
        }
    }
}
