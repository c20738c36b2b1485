//! GPK package loader.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern, PatternError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};
use zerocopy::{FromBytes, IntoBytes};

use crate::cipher;
use crate::codec;
use crate::entry::Entry;
use crate::error::{ExtractError, LoadError, Result};
use crate::extract::read_range;
use crate::format::Trailer;
use crate::reader::EntryReader;
use crate::table::{parse_entries, EntryTable, TableEnd};

/// How the trailer was stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TrailerEncoding {
    /// Stored in the clear; the index was shipped deciphered as well.
    Plain,
    /// Stored enciphered like the index.
    Enciphered,
}

/// A loaded GPK package.
///
/// Loading reads the trailer and the index once; the catalog is frozen
/// afterwards. Entry data stays on disk and is read on demand.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    name: String,
    file: Mutex<File>,
    file_size: u64,
    index_offset: u64,
    index_length: u32,
    entries: Vec<Entry>,
    lookup: FxHashMap<String, usize>,
    trailer_encoding: TrailerEncoding,
    table_end: TableEnd,
}

impl Archive {
    /// Load a package and parse its catalog.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
            _ => LoadError::Io(e),
        })?;
        let file_size = file.metadata()?.len();

        if file_size < Trailer::SIZE as u64 {
            return Err(LoadError::SignatureInvalid);
        }
        let mut trailer_bytes = [0u8; Trailer::SIZE];
        file.seek(SeekFrom::End(-(Trailer::SIZE as i64)))?;
        file.read_exact(&mut trailer_bytes)?;
        let (trailer, trailer_encoding) = read_trailer(&trailer_bytes)?;

        let index_length = trailer.index_length.get();
        let index_offset = file_size
            .checked_sub(Trailer::SIZE as u64 + u64::from(index_length))
            .ok_or(LoadError::IndexOutOfBounds {
                index_length,
                file_size,
            })?;
        debug!(index_offset, index_length, ?trailer_encoding, "trailer ok");

        let mut raw_index = vec![0u8; index_length as usize];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut raw_index)?;

        let index = codec::decode_index(&raw_index, trailer_encoding == TrailerEncoding::Plain)?;
        let EntryTable { entries, end } = parse_entries(&index);
        if let (true, TableEnd::Corrupt { offset }) = (entries.is_empty(), end) {
            return Err(LoadError::TableCorrupt { offset });
        }

        let mut lookup = FxHashMap::with_capacity_and_hasher(entries.len(), Default::default());
        for (i, entry) in entries.iter().enumerate() {
            lookup.entry(lookup_key(entry.name())).or_insert(i);
        }

        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        info!("loaded {name}: {} entries", entries.len());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            file: Mutex::new(file),
            file_size,
            index_offset,
            index_length,
            entries,
            lookup,
            trailer_encoding,
            table_end: end,
        })
    }

    /// Package name (the file stem).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the package was loaded from.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the package file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Where the index section starts; everything before it is entry data.
    #[inline]
    pub fn index_offset(&self) -> u64 {
        self.index_offset
    }

    #[inline]
    pub fn trailer_encoding(&self) -> TrailerEncoding {
        self.trailer_encoding
    }

    /// How the entry table ended. Anything other than
    /// [`TableEnd::EndMarker`] or [`TableEnd::EndOfData`] means the catalog
    /// may be missing trailing entries.
    #[inline]
    pub fn table_end(&self) -> TableEnd {
        self.table_end
    }

    /// Get the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in on-disk index order.
    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Get entry by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Find an entry by name.
    ///
    /// Matching ignores case and treats `/` and `\` as the same separator.
    /// When a name occurs twice, the first entry wins.
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.lookup
            .get(&lookup_key(name))
            .map(|&index| &self.entries[index])
    }

    /// Entries whose name matches a glob pattern, case-insensitively.
    pub fn matching(&self, pattern: &str) -> std::result::Result<Vec<&Entry>, PatternError> {
        Ok(self
            .matching_indices(pattern)?
            .into_iter()
            .map(|index| &self.entries[index])
            .collect())
    }

    /// Catalog indices of the entries [`matching`](Self::matching) returns.
    pub fn matching_indices(&self, pattern: &str) -> std::result::Result<Vec<usize>, PatternError> {
        let pattern = Pattern::new(&pattern.replace('\\', "/"))?;
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        Ok(self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| pattern.matches_with(&e.name().replace('\\', "/"), options))
            .map(|(index, _)| index)
            .collect())
    }

    /// Read the stored bytes of an entry verbatim.
    ///
    /// No decompression is applied; see
    /// [`codec::decompress_payload`](crate::codec::decompress_payload).
    pub fn read(&self, entry: &Entry) -> std::result::Result<Vec<u8>, ExtractError> {
        self.check_bounds(entry)?;
        read_range(&mut self.file.lock(), entry)
    }

    /// Read an entry by name.
    pub fn read_by_name(&self, name: &str) -> std::result::Result<Vec<u8>, ExtractError> {
        let entry = self
            .find(name)
            .ok_or_else(|| ExtractError::EntryNotFound(name.to_string()))?;
        self.read(entry)
    }

    /// Open a streaming reader over one entry with its own file handle.
    pub fn open_entry(&self, entry: &Entry) -> std::result::Result<EntryReader, ExtractError> {
        self.check_bounds(entry)?;
        let file = File::open(&self.path).map_err(|e| ExtractError::io(entry.name(), e))?;
        EntryReader::new(file, entry.offset(), entry.compressed_length())
            .map_err(|e| ExtractError::io(entry.name(), e))
    }

    /// Write a copy of the package with the index and trailer deciphered.
    ///
    /// The data region is copied byte for byte. The result loads with a
    /// [`TrailerEncoding::Plain`] trailer and the same catalog. Writing over
    /// the package being read is refused.
    pub fn write_deciphered<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if path == self.path {
            return Err(LoadError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to overwrite the source package",
            )));
        }

        let mut file = self.file.lock();
        let mut raw_index = vec![0u8; self.index_length as usize];
        file.seek(SeekFrom::Start(self.index_offset))?;
        file.read_exact(&mut raw_index)?;
        let plain_index =
            codec::decipher_index(&raw_index, self.trailer_encoding == TrailerEncoding::Plain)?;
        let index_length = u32::try_from(plain_index.len()).map_err(|_| {
            LoadError::Io(io::Error::new(io::ErrorKind::InvalidData, "index exceeds 4 GiB"))
        })?;

        let mut out = BufWriter::new(File::create(path)?);
        file.seek(SeekFrom::Start(0))?;
        let copied = io::copy(&mut (&mut *file).take(self.index_offset), &mut out)?;
        if copied != self.index_offset {
            return Err(LoadError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "package shrank while copying entry data",
            )));
        }

        out.write_all(&plain_index)?;
        out.write_all(Trailer::new(index_length).as_bytes())?;
        out.flush()?;

        info!(
            "wrote deciphered {} to {}: {copied} data bytes, {index_length} index bytes",
            self.name,
            path.display()
        );
        Ok(())
    }

    /// Check that an entry's byte range lies inside the package.
    pub(crate) fn check_bounds(&self, entry: &Entry) -> std::result::Result<(), ExtractError> {
        if entry.end_offset() > self.file_size {
            return Err(ExtractError::OutOfBounds {
                name: entry.name().to_string(),
                offset: entry.offset(),
                end: entry.end_offset(),
                file_size: self.file_size,
            });
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Archive {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Validate the trailer, trying the deciphered form first.
fn read_trailer(bytes: &[u8; Trailer::SIZE]) -> Result<(Trailer, TrailerEncoding)> {
    let mut deciphered = *bytes;
    cipher::apply(&mut deciphered);

    let trailer = Trailer::read_from_bytes(&deciphered).map_err(|_| LoadError::SignatureInvalid)?;
    if trailer.is_valid() {
        return Ok((trailer, TrailerEncoding::Enciphered));
    }

    let trailer = Trailer::read_from_bytes(bytes).map_err(|_| LoadError::SignatureInvalid)?;
    if trailer.is_valid() {
        return Ok((trailer, TrailerEncoding::Plain));
    }

    Err(LoadError::SignatureInvalid)
}

fn lookup_key(name: &str) -> String {
    name.replace('\\', "/").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_trailer() {
        let mut bytes = [0u8; Trailer::SIZE];
        bytes.copy_from_slice(Trailer::new(77).as_bytes());

        let (trailer, encoding) = read_trailer(&bytes).unwrap();
        assert_eq!(encoding, TrailerEncoding::Plain);
        assert_eq!(trailer.index_length.get(), 77);
    }

    #[test]
    fn test_enciphered_trailer() {
        let mut bytes = [0u8; Trailer::SIZE];
        bytes.copy_from_slice(Trailer::new(77).as_bytes());
        cipher::apply(&mut bytes);

        let (trailer, encoding) = read_trailer(&bytes).unwrap();
        assert_eq!(encoding, TrailerEncoding::Enciphered);
        assert_eq!(trailer.index_length.get(), 77);
    }

    #[test]
    fn test_bad_trailer() {
        let bytes = [0x41u8; Trailer::SIZE];
        assert!(matches!(read_trailer(&bytes), Err(LoadError::SignatureInvalid)));
    }

    #[test]
    fn test_lookup_key() {
        assert_eq!(lookup_key("BGM\\Title.OGG"), lookup_key("bgm/title.ogg"));
    }
}
