//! GPK catalog entry.

use std::path::{Path, PathBuf};

use crate::format::{EntryRecord, TAG_DEFLATE};

/// An entry (file) within a GPK package.
///
/// This contains metadata about the file, not the file data itself.
/// Use [`Archive::read`](crate::Archive::read) to get the stored bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entry {
    /// File name/path within the package.
    name: String,
    /// Matches the numeric suffix of the package file name.
    sub_version: u16,
    /// Record format version.
    version: u16,
    /// Offset of the entry data from the start of the package.
    offset: u32,
    /// On-disk length.
    compressed_length: u32,
    /// Inflated length, zero when stored raw.
    uncompressed_length: u32,
    /// Framing tag.
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_tag"))]
    tag: [u8; 4],
    /// Extra bytes that followed the record in the index.
    sub_header_length: u8,
}

impl Entry {
    /// Create an entry from its name and decoded record.
    pub(crate) fn new(name: String, record: &EntryRecord) -> Self {
        Self {
            name,
            sub_version: record.sub_version.get(),
            version: record.version.get(),
            offset: record.offset.get(),
            compressed_length: record.compressed_length.get(),
            uncompressed_length: record.uncompressed_length.get(),
            tag: record.tag,
            sub_header_length: record.sub_header_length,
        }
    }

    /// Get the file name/path.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn sub_version(&self) -> u16 {
        self.sub_version
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Offset of the entry data within the package.
    #[inline]
    pub fn offset(&self) -> u64 {
        u64::from(self.offset)
    }

    /// Number of bytes stored on disk.
    #[inline]
    pub fn compressed_length(&self) -> u64 {
        u64::from(self.compressed_length)
    }

    /// Declared inflated length; zero for raw entries.
    #[inline]
    pub fn uncompressed_length(&self) -> u64 {
        u64::from(self.uncompressed_length)
    }

    /// The raw 4-byte framing tag.
    #[inline]
    pub fn tag(&self) -> [u8; 4] {
        self.tag
    }

    #[inline]
    pub fn sub_header_length(&self) -> u8 {
        self.sub_header_length
    }

    /// One past the last byte of the entry data.
    #[inline]
    pub fn end_offset(&self) -> u64 {
        self.offset() + self.compressed_length()
    }

    /// Check if the stored bytes are a size-prefixed zlib stream.
    ///
    /// Some packages tag raw entries with `DFLT` but leave the inflated
    /// length at zero; those are treated as raw.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.tag == TAG_DEFLATE && self.uncompressed_length != 0
    }

    /// Get the relative output path for extraction.
    ///
    /// Converts Windows path separators to the platform's native separator.
    pub fn output_path(&self) -> PathBuf {
        let normalized = self.name.replace('\\', "/");
        PathBuf::from(normalized)
    }

    /// Get the file extension, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
    }
}

#[cfg(feature = "serde")]
fn serialize_tag<S: serde::Serializer>(tag: &[u8; 4], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(tag))
}
