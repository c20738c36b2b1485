//! On-disk GPK structures.
//!
//! A package is laid out as
//!
//! ```text
//! [entry data ...][enciphered, size-prefixed zlib index: N bytes][trailer: 32 bytes]
//! ```
//!
//! All multi-byte integers are little-endian.

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// First trailer identifier.
pub const TRAILER_IDENT_INDEX: [u8; 12] = *b"STKFile0PIDX";

/// Second trailer identifier.
pub const TRAILER_IDENT_PACKAGE: [u8; 16] = *b"STKFile0PACKFILE";

/// Tag carried by entries whose payload is a size-prefixed zlib stream.
pub const TAG_DEFLATE: [u8; 4] = *b"DFLT";

/// Tag carried by entries stored raw.
pub const TAG_STORED: [u8; 4] = *b"    ";

/// Largest plausible file name, in UTF-16 code units.
pub const MAX_NAME_UNITS: u16 = 1024;

/// Package trailer, always the last 32 bytes of the file.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Trailer {
    /// `STKFile0PIDX`
    pub ident_index: [u8; 12],
    /// Length of the index section preceding the trailer.
    pub index_length: U32,
    /// `STKFile0PACKFILE`
    pub ident_package: [u8; 16],
}

impl Trailer {
    /// Trailer size in bytes.
    pub const SIZE: usize = 32;

    /// Build a trailer for an index of the given length.
    pub fn new(index_length: u32) -> Self {
        Self {
            ident_index: TRAILER_IDENT_INDEX,
            index_length: U32::new(index_length),
            ident_package: TRAILER_IDENT_PACKAGE,
        }
    }

    /// Check both identifiers.
    pub fn is_valid(&self) -> bool {
        self.ident_index == TRAILER_IDENT_INDEX && self.ident_package == TRAILER_IDENT_PACKAGE
    }
}

/// Fixed metadata record following each file name in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct EntryRecord {
    /// Matches the numeric suffix of the package file name.
    pub sub_version: U16,
    /// Major version, always 1 in shipped packages.
    pub version: U16,
    /// Always zero.
    pub zero: U16,
    /// Offset of the entry data from the start of the package.
    pub offset: U32,
    /// On-disk length of the entry data.
    pub compressed_length: U32,
    /// `DFLT` for compressed payloads, spaces otherwise.
    pub tag: [u8; 4],
    /// Inflated length; zero when the entry is stored raw.
    pub uncompressed_length: U32,
    /// Length of a compression sub-header following this record in the index.
    pub sub_header_length: u8,
}

impl EntryRecord {
    /// Record size in bytes.
    pub const SIZE: usize = 23;
}
