//! Binary reader for zero-copy parsing of byte slices.
//!
//! This module provides [`BinaryReader`], a cursor-like type that reads
//! little-endian values and fixed-layout records out of a byte slice without
//! copying.

use zerocopy::FromBytes;

use crate::{Error, Result};

/// A binary reader that provides zero-copy reading from a byte slice.
///
/// # Example
///
/// ```
/// use stkpak_common::BinaryReader;
///
/// let data = [0x05, 0x00, 0x41, 0x00, 0x2E, 0x00];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u16().unwrap(), 5);
/// assert_eq!(reader.read_utf16(2).unwrap(), "A.");
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a new reader starting at a specific position.
    #[inline]
    pub const fn new_at(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Seek to an absolute position.
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Advance the position by a number of bytes.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.position = self.position.saturating_add(count);
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        Ok(&self.data[self.position..self.position + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Read a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Peek at a little-endian u16 without advancing.
    #[inline]
    pub fn peek_u16(&self) -> Result<u16> {
        let bytes = self.peek_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read `units` UTF-16LE code units and decode them.
    ///
    /// Unpaired surrogates are rejected rather than replaced, so callers can
    /// treat them as corruption.
    pub fn read_utf16(&mut self, units: usize) -> Result<String> {
        let start = self.position;
        let bytes = self.read_bytes(units * 2)?;
        let code_units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));

        char::decode_utf16(code_units)
            .collect::<std::result::Result<String, _>>()
            .map_err(|_| Error::InvalidUtf16 { offset: start })
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [
            0x01u8, 0x02, // u16: 0x0201
            0xFF, 0xFF, // u16: 0xFFFF
        ];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert_eq!(reader.read_u16().unwrap(), 0xFFFF);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.peek_u16().unwrap(), 0x0201);
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert_eq!(reader.peek_u16().unwrap(), 0x0403);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_read_utf16() {
        let name: Vec<u8> = "SE/hit.ogg"
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        let mut reader = BinaryReader::new(&name);

        assert_eq!(reader.read_utf16(10).unwrap(), "SE/hit.ogg");
    }

    #[test]
    fn test_read_utf16_rejects_lone_surrogate() {
        let data = [0x00, 0xD8, 0x41, 0x00];
        let mut reader = BinaryReader::new(&data);

        assert!(matches!(
            reader.read_utf16(2),
            Err(Error::InvalidUtf16 { offset: 0 })
        ));
    }

    #[test]
    fn test_read_struct() {
        let data = [0x01u8, 0x02, 0x03, 0x04, 0x05];
        let mut reader = BinaryReader::new(&data);

        let value: [u8; 4] = reader.read_struct().unwrap();
        assert_eq!(value, [1, 2, 3, 4]);
        assert_eq!(reader.remaining(), 1);
        assert!(reader.read_struct::<[u8; 4]>().is_err());
    }

    #[test]
    fn test_seek_and_advance() {
        let data = [0u8, 0, 0x34, 0x12];
        let mut reader = BinaryReader::new_at(&data, 1);

        reader.advance(1);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        reader.seek(0);
        assert_eq!(reader.remaining(), 4);
        reader.advance(usize::MAX);
        assert!(reader.is_empty());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_eof_error() {
        let data = [0x01];
        let mut reader = BinaryReader::new(&data);

        assert!(matches!(
            reader.read_u16(),
            Err(Error::UnexpectedEof { needed: 2, available: 1 })
        ));
    }
}
