//! Error types for the GPK crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while unwrapping the compressed index or an entry payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Input too short to hold a compressed stream.
    #[error("compressed data too short: {0} bytes")]
    TooShort(usize),

    /// No zlib header at offset 0 or 4, with or without the cipher pass.
    #[error("no valid compressed stream found")]
    NoValidStream,

    /// A stream header was found but the stream did not inflate cleanly.
    #[error("compressed stream is corrupt: {0}")]
    StreamCorrupt(#[source] std::io::Error),
}

/// Archive-fatal errors raised by [`Archive::load`](crate::Archive::load).
#[derive(Debug, Error)]
pub enum LoadError {
    /// The package file does not exist.
    #[error("package not found: {}", .0.display())]
    NotFound(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither the raw nor the deciphered trailer carries the identifiers.
    #[error("invalid package signature")]
    SignatureInvalid,

    /// The trailer declares an index larger than the file can hold.
    #[error("index length {index_length} does not fit in a {file_size} byte package")]
    IndexOutOfBounds { index_length: u32, file_size: u64 },

    /// The index could not be deciphered or inflated.
    #[error("index decode failed: {0}")]
    IndexDecodeFailed(#[from] DecodeError),

    /// The entry table was corrupt before a single entry could be read.
    #[error("entry table corrupt at offset {offset}")]
    TableCorrupt { offset: usize },
}

/// Per-entry errors raised while reading or writing one entry.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No entry with that name.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The entry's byte range lies outside the package file.
    #[error("entry {name} spans {offset}..{end} beyond the {file_size} byte package")]
    OutOfBounds {
        name: String,
        offset: u64,
        end: u64,
        file_size: u64,
    },

    /// The entry name would escape the output directory.
    #[error("refusing to write unsafe path: {0}")]
    UnsafePath(String),

    /// I/O error while reading the package or writing output.
    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The post-processing step could not decode the payload.
    #[error("decode failed for {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: DecodeError,
    },
}

impl ExtractError {
    pub(crate) fn io(name: &str, source: std::io::Error) -> Self {
        Self::Io {
            name: name.to_string(),
            source,
        }
    }
}

/// One failed job from a bulk extraction.
#[derive(Debug)]
pub struct EntryFailure {
    /// Catalog index of the entry.
    pub index: usize,
    /// Entry name.
    pub name: String,
    /// What went wrong.
    pub error: ExtractError,
}

/// Aggregated outcome of a bulk extraction in which some entries failed.
///
/// Every other entry was still processed.
#[derive(Debug, Error)]
#[error("{} of {total} entries failed to extract", .failures.len())]
pub struct ExtractAllError {
    /// Number of jobs that were run.
    pub total: usize,
    /// Every collected failure, ordered by catalog index.
    pub failures: Vec<EntryFailure>,
}

impl ExtractAllError {
    /// Number of failed entries.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Number of entries that were written.
    pub fn succeeded(&self) -> usize {
        self.total - self.failures.len()
    }
}

/// Result type for package loading.
pub type Result<T, E = LoadError> = std::result::Result<T, E>;
