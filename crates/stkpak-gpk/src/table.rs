//! Entry table parsing.
//!
//! The inflated index is a sequence of
//!
//! ```text
//! [name length: u16][name: UTF-16LE, length code units][record: 23 bytes][sub-header: n bytes]
//! ```
//!
//! terminated by a zero length. Shipped indexes are sometimes damaged, so
//! the parser is tolerant: when the next length looks wrong it scans a short
//! window ahead for something shaped like a path and resumes there, and when
//! nothing turns up it stops and keeps what it already has.

use std::io;

use byteorder::{LittleEndian, WriteBytesExt};
use stkpak_common::scan::find_anchor;
use stkpak_common::BinaryReader;
use thiserror::Error;
use tracing::{debug, trace};
use zerocopy::IntoBytes;

use crate::entry::Entry;
use crate::format::{EntryRecord, MAX_NAME_UNITS};

/// How far past a bad length the parser looks for the next entry.
pub const RESYNC_WINDOW: usize = 32;

/// How the entry table ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TableEnd {
    /// A zero name length with nothing recoverable after it.
    EndMarker,
    /// The index ran out of bytes.
    EndOfData,
    /// Parsing stopped at unrecoverable damage.
    Corrupt { offset: usize },
}

/// The parsed catalog together with how parsing ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryTable {
    pub entries: Vec<Entry>,
    pub end: TableEnd,
}

#[derive(Debug, Error)]
enum EntryFault {
    #[error("name length {0} exceeds {MAX_NAME_UNITS}")]
    NameTooLong(u16),

    #[error("name contains control characters")]
    ImplausibleName,

    #[error("record reserved field is {0:#06x}")]
    ImplausibleRecord(u16),

    #[error(transparent)]
    Read(#[from] stkpak_common::Error),
}

/// Parse an inflated index into its entries.
///
/// This never fails outright. Damage that cannot be skipped ends the table
/// early and is reported through [`EntryTable::end`].
pub fn parse_entries(index: &[u8]) -> EntryTable {
    let mut reader = BinaryReader::new(index);
    let mut entries = Vec::new();

    let end = loop {
        if reader.remaining() < 2 {
            break TableEnd::EndOfData;
        }

        let start = reader.position();
        match read_entry(&mut reader) {
            Ok(Some(entry)) => {
                trace!(offset = start, name = entry.name(), "entry");
                entries.push(entry);
            }
            Ok(None) => break TableEnd::EndMarker,
            Err(fault) => {
                debug!(offset = start, "unreadable entry: {fault}");
                match resync(index, start + 1) {
                    Some(anchor) => {
                        reader.seek(anchor);
                        continue;
                    }
                    None => break TableEnd::Corrupt { offset: start },
                }
            }
        }

        let next = reader.position();
        match reader.peek_u16() {
            Err(_) => break TableEnd::EndOfData,
            Ok(units) if (1..=MAX_NAME_UNITS).contains(&units) => {}
            Ok(units) => match resync(index, next) {
                Some(anchor) => {
                    debug!(from = next, to = anchor, "resynchronised entry table");
                    reader.seek(anchor);
                }
                None if units == 0 => break TableEnd::EndMarker,
                None => break TableEnd::Corrupt { offset: next },
            },
        }
    };

    debug!(entries = entries.len(), ?end, "entry table parsed");
    EntryTable { entries, end }
}

/// Read one entry, or `None` at a zero-length terminator.
fn read_entry(reader: &mut BinaryReader<'_>) -> Result<Option<Entry>, EntryFault> {
    let units = reader.read_u16()?;
    if units == 0 {
        return Ok(None);
    }
    if units > MAX_NAME_UNITS {
        return Err(EntryFault::NameTooLong(units));
    }

    let name = reader.read_utf16(units as usize)?;
    if !is_plausible_name(&name) {
        return Err(EntryFault::ImplausibleName);
    }

    let record: EntryRecord = reader.read_struct()?;
    if record.zero.get() != 0 {
        return Err(EntryFault::ImplausibleRecord(record.zero.get()));
    }
    reader.advance(record.sub_header_length as usize);

    Ok(Some(Entry::new(name, &record)))
}

/// Look for the next position that plausibly starts an entry.
fn resync(index: &[u8], from: usize) -> Option<usize> {
    find_anchor(index, from, RESYNC_WINDOW, is_plausible_entry)
}

/// A candidate anchor has a sane length, a decodable name shaped like a
/// path, and a record that would itself be accepted.
fn is_plausible_entry(index: &[u8], pos: usize) -> bool {
    let mut reader = BinaryReader::new_at(index, pos);
    let Ok(units) = reader.read_u16() else {
        return false;
    };
    if units == 0 || units > MAX_NAME_UNITS {
        return false;
    }
    let Ok(name) = reader.read_utf16(units as usize) else {
        return false;
    };
    if !looks_like_path(&name) {
        return false;
    }
    matches!(reader.read_struct::<EntryRecord>(), Ok(record) if record.zero.get() == 0)
}

/// Entry names never carry control characters, NUL included.
fn is_plausible_name(name: &str) -> bool {
    !name.chars().any(char::is_control)
}

fn looks_like_path(name: &str) -> bool {
    is_plausible_name(name) && name.contains(['/', '\\']) && name.contains('.')
}

/// Append one encoded entry to an index buffer.
pub(crate) fn encode_entry(out: &mut Vec<u8>, name: &str, record: &EntryRecord) -> io::Result<()> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let count = u16::try_from(units.len())
        .ok()
        .filter(|&count| (1..=MAX_NAME_UNITS).contains(&count))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("name of {} UTF-16 units does not fit an entry", units.len()),
            )
        })?;

    out.write_u16::<LittleEndian>(count)?;
    for unit in units {
        out.write_u16::<LittleEndian>(unit)?;
    }
    out.extend_from_slice(record.as_bytes());
    Ok(())
}
