//! GPK package writer.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;
use zerocopy::little_endian::{U16, U32};
use zerocopy::IntoBytes;

use crate::archive::TrailerEncoding;
use crate::cipher;
use crate::codec;
use crate::format::{EntryRecord, Trailer, TAG_DEFLATE, TAG_STORED};
use crate::table::encode_entry;

#[derive(Debug, Clone)]
struct PendingEntry {
    name: String,
    data: Vec<u8>,
    compressed: bool,
}

/// Builds GPK packages in memory.
///
/// ```
/// use stkpak_gpk::ArchiveBuilder;
///
/// let package = ArchiveBuilder::new()
///     .add("SE/hit.ogg", b"OggS...".to_vec())
///     .to_bytes()?;
/// // The trailer is enciphered by default.
/// assert!(!package.ends_with(b"STKFile0PACKFILE"));
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    entries: Vec<PendingEntry>,
    sub_version: u16,
    trailer: TrailerEncoding,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    /// Create an empty builder that enciphers its trailer.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            sub_version: 0,
            trailer: TrailerEncoding::Enciphered,
        }
    }

    /// Set the sub-version written into every record.
    pub fn sub_version(mut self, sub_version: u16) -> Self {
        self.sub_version = sub_version;
        self
    }

    /// Choose how the trailer and index are stored.
    ///
    /// A plain trailer is paired with a plain index, matching packages that
    /// were shipped already deciphered.
    pub fn trailer_encoding(mut self, encoding: TrailerEncoding) -> Self {
        self.trailer = encoding;
        self
    }

    /// Add an entry stored raw.
    pub fn add<S: Into<String>>(mut self, name: S, data: Vec<u8>) -> Self {
        self.entries.push(PendingEntry {
            name: name.into(),
            data,
            compressed: false,
        });
        self
    }

    /// Add an entry stored as a size-prefixed zlib stream.
    ///
    /// Compression happens in [`to_bytes`](Self::to_bytes).
    pub fn add_compressed<S: Into<String>>(mut self, name: S, data: &[u8]) -> Self {
        self.entries.push(PendingEntry {
            name: name.into(),
            data: data.to_vec(),
            compressed: true,
        });
        self
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the package.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut package = Vec::new();
        let mut index = Vec::new();

        for pending in &self.entries {
            let stored = if pending.compressed {
                Cow::Owned(codec::compress(&pending.data)?)
            } else {
                Cow::Borrowed(pending.data.as_slice())
            };

            let offset = u32::try_from(package.len())
                .map_err(|_| invalid("package data exceeds 4 GiB".to_string()))?;
            let length = u32::try_from(stored.len())
                .map_err(|_| invalid(format!("entry too large: {}", pending.name)))?;
            let uncompressed_length = if pending.compressed {
                u32::try_from(pending.data.len())
                    .map_err(|_| invalid(format!("entry too large: {}", pending.name)))?
            } else {
                0
            };

            let record = EntryRecord {
                sub_version: U16::new(self.sub_version),
                version: U16::new(1),
                zero: U16::new(0),
                offset: U32::new(offset),
                compressed_length: U32::new(length),
                tag: if pending.compressed { TAG_DEFLATE } else { TAG_STORED },
                uncompressed_length: U32::new(uncompressed_length),
                sub_header_length: 0,
            };
            encode_entry(&mut index, &pending.name, &record)?;
            package.extend_from_slice(&stored);
        }
        index.extend_from_slice(&[0, 0]);

        let raw_index = match self.trailer {
            TrailerEncoding::Enciphered => codec::encode_index(&index)?,
            TrailerEncoding::Plain => codec::compress(&index)?,
        };
        let index_length = u32::try_from(raw_index.len())
            .map_err(|_| invalid("index exceeds 4 GiB".to_string()))?;

        let mut trailer = Trailer::new(index_length).as_bytes().to_vec();
        if self.trailer == TrailerEncoding::Enciphered {
            cipher::apply(&mut trailer);
        }

        debug!(
            entries = self.entries.len(),
            data = package.len(),
            index = raw_index.len(),
            "package built"
        );
        package.extend_from_slice(&raw_index);
        package.extend_from_slice(&trailer);
        Ok(package)
    }

    /// Serialize the package to a file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.to_bytes()?)
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}
