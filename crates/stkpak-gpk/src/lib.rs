//! GPK package reader.
//!
//! GPK is the asset package format shipped with the game client. A package
//! is a run of raw entry data followed by an index and a 32-byte trailer:
//!
//! - The index is a size-prefixed zlib stream (Qt `qCompress` style),
//!   usually obscured with a repeating 16-byte XOR key
//! - The trailer holds two identifiers and the index length; it may be
//!   stored enciphered or in the clear
//! - Each index entry is a UTF-16LE name and a 23-byte record pointing at
//!   the entry's bytes
//!
//! Damaged indexes are common, so the entry table parser resynchronises on
//! the next plausible entry and keeps everything readable before the damage.
//!
//! # Example
//!
//! ```no_run
//! use stkpak_gpk::Archive;
//!
//! let archive = Archive::load("packs/BGM.GPK")?;
//!
//! for entry in archive.iter() {
//!     println!("{}: {} bytes", entry.name(), entry.compressed_length());
//! }
//!
//! if let Some(entry) = archive.find("bgm/title_loop.ogg") {
//!     let data = archive.read(entry)?;
//! }
//!
//! // Write everything out with a small worker pool.
//! stkpak_gpk::extract_all(&archive, "out/BGM")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod archive;
mod builder;
mod entry;
mod error;
mod extract;
mod reader;

pub mod cipher;
pub mod codec;
pub mod format;
pub mod table;

pub use archive::{Archive, TrailerEncoding};
pub use builder::ArchiveBuilder;
pub use entry::Entry;
pub use error::{DecodeError, EntryFailure, ExtractAllError, ExtractError, LoadError, Result};
pub use extract::{
    default_workers, extract, extract_all, safe_join, BulkExtractor, Progress, MAX_WORKERS,
};
pub use reader::{AssetReader, AssetResolver, EntryReader};
pub use table::{EntryTable, TableEnd};
