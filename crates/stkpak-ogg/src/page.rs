//! Ogg page layout.
//!
//! ```text
//! offset  size  field
//!      0     4  capture pattern "OggS"
//!      4     1  stream structure version (0)
//!      5     1  header type flags (0x02 = beginning of stream)
//!      6     8  granule position
//!     14     4  bitstream serial number
//!     18     4  page sequence number
//!     22     4  CRC-32 of the whole page, computed with this field zeroed
//!     26     1  segment count
//!     27     n  segment table
//! ```

use std::ops::Range;

use stkpak_common::crc;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Capture pattern opening every page.
pub const CAPTURE_PATTERN: [u8; 4] = *b"OggS";

/// Codec identifier carried by the Vorbis identification packet.
pub const CODEC_ID: &[u8] = b"vorbis";

/// Packet type byte preceding the codec identifier in the first packet.
pub const PACKET_TYPE_IDENTIFICATION: u8 = 0x01;

/// The only stream structure version in use.
pub const STREAM_VERSION: u8 = 0;

/// Header type flag marking the first page of a logical stream.
pub const FLAG_BOS: u8 = 0x02;

/// Byte range of the checksum field within a page.
pub const CHECKSUM_RANGE: Range<usize> = 22..26;

/// Serial number used when none can be recovered.
pub const DEFAULT_SERIAL: [u8; 4] = [0x2A, 0x00, 0x00, 0x00];

/// Size of the Vorbis identification packet.
pub const IDENTIFICATION_PACKET_SIZE: u8 = 30;

/// Fixed part of a page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct PageHeader {
    pub capture_pattern: [u8; 4],
    pub version: u8,
    pub flags: u8,
    pub granule_position: U64,
    pub serial: U32,
    pub sequence: U32,
    pub checksum: U32,
    pub segment_count: u8,
}

impl PageHeader {
    /// Header size in bytes, excluding the segment table.
    pub const SIZE: usize = 27;

    /// Borrow the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Option<&Self> {
        Self::ref_from_prefix(data).ok().map(|(header, _)| header)
    }

    /// A first-page header for a stream with the given serial number.
    pub fn first_page(serial: [u8; 4], segment_count: u8) -> Self {
        Self {
            capture_pattern: CAPTURE_PATTERN,
            version: STREAM_VERSION,
            flags: FLAG_BOS,
            granule_position: U64::new(0),
            serial: U32::new(u32::from_le_bytes(serial)),
            sequence: U32::new(0),
            checksum: U32::new(0),
            segment_count,
        }
    }

    #[inline]
    pub fn has_capture_pattern(&self) -> bool {
        self.capture_pattern == CAPTURE_PATTERN
    }

    #[inline]
    pub fn is_bos(&self) -> bool {
        self.flags & FLAG_BOS != 0
    }
}

/// Length of the page at the start of `data`, from its segment table.
///
/// Returns `None` if the header or segment table is cut off. The page body
/// itself may extend past the end of `data`.
pub fn page_len(data: &[u8]) -> Option<usize> {
    let header = PageHeader::parse(data)?;
    let table_end = PageHeader::SIZE + header.segment_count as usize;
    let table = data.get(PageHeader::SIZE..table_end)?;
    Some(table_end + table.iter().map(|&len| len as usize).sum::<usize>())
}

/// The complete first page of `data`, if all of it is present.
pub fn first_page(data: &[u8]) -> Option<&[u8]> {
    data.get(..page_len(data)?)
}

/// Checksum of a page, counting its checksum field as zero.
#[inline]
pub fn page_checksum(page: &[u8]) -> u32 {
    crc::hash_with_zeroed(page, CHECKSUM_RANGE)
}

/// The checksum stored in a page header.
pub fn stored_checksum(page: &[u8]) -> Option<u32> {
    let field = page.get(CHECKSUM_RANGE)?;
    Some(u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
}

/// Check that `data` opens with a complete page whose checksum matches.
pub fn first_page_checksum_ok(data: &[u8]) -> bool {
    if !data.starts_with(&CAPTURE_PATTERN) {
        return false;
    }
    first_page(data).is_some_and(|page| stored_checksum(page) == Some(page_checksum(page)))
}

/// Recompute and store the checksum of the first page in place.
///
/// Returns `false`, leaving `data` untouched, when there is no complete
/// first page.
pub fn write_first_page_checksum(data: &mut [u8]) -> bool {
    let Some(len) = first_page(data).map(<[u8]>::len) else {
        return false;
    };
    let checksum = page_checksum(&data[..len]);
    data[CHECKSUM_RANGE].copy_from_slice(&checksum.to_le_bytes());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn page() -> Vec<u8> {
        let mut data = PageHeader::first_page(DEFAULT_SERIAL, 2).as_bytes().to_vec();
        data.extend_from_slice(&[3, 2]);
        data.extend_from_slice(b"abcde");
        data
    }

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<PageHeader>(), PageHeader::SIZE);
    }

    #[test]
    fn test_header_fields() {
        let data = page();
        let header = PageHeader::parse(&data).unwrap();

        assert!(header.has_capture_pattern());
        assert!(header.is_bos());
        assert_eq!(header.serial.get(), 0x2A);
        assert_eq!(&data[14..18], &DEFAULT_SERIAL);
    }

    #[test]
    fn test_page_len() {
        let data = page();
        assert_eq!(page_len(&data), Some(27 + 2 + 5));
        assert_eq!(first_page(&data).map(<[u8]>::len), Some(34));
        assert_eq!(first_page(&data[..30]), None);
        assert_eq!(page_len(&data[..28]), None);
    }

    #[test]
    fn test_write_checksum() {
        let mut data = page();
        data.extend_from_slice(b"OggS next page");
        assert!(!first_page_checksum_ok(&data));

        assert!(write_first_page_checksum(&mut data));
        assert!(first_page_checksum_ok(&data));
        assert_eq!(&data[34..], b"OggS next page");
    }

    #[test]
    fn test_write_checksum_needs_whole_page() {
        let mut data = page();
        data.truncate(31);
        let before = data.clone();

        assert!(!write_first_page_checksum(&mut data));
        assert_eq!(data, before);
    }

    proptest! {
        #[test]
        fn test_checksum_roundtrip(
            segments in prop::collection::vec(any::<u8>(), 0..8),
            body in prop::collection::vec(any::<u8>(), 0..2048),
            serial in any::<[u8; 4]>(),
        ) {
            let mut data = PageHeader::first_page(serial, segments.len() as u8).as_bytes().to_vec();
            data.extend_from_slice(&segments);
            data.extend_from_slice(&body);

            let complete = write_first_page_checksum(&mut data);
            prop_assert_eq!(complete, first_page(&data).is_some());
            if complete {
                prop_assert!(first_page_checksum_ok(&data));
            }
        }
    }
}
