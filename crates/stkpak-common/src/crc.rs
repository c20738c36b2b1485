//! Ogg page CRC-32.
//!
//! Ogg pages carry a CRC-32 over the whole page computed with the generator
//! polynomial `0x04C11DB7`, processed most-significant bit first, with the
//! register starting at zero and no final inversion. The checksum field
//! itself is counted as zero while the page is hashed.

use std::ops::Range;

/// Generator polynomial used by Ogg page checksums.
pub const OGG_POLYNOMIAL: u32 = 0x04C1_1DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ OGG_POLYNOMIAL
            } else {
                r << 1
            };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

#[inline]
fn step(crc: u32, byte: u8) -> u32 {
    (crc << 8) ^ TABLE[((crc >> 24) as u8 ^ byte) as usize]
}

/// Compute the checksum of a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    hash_bytes_with_seed(data, 0)
}

/// Continue a previous checksum computation over more bytes.
#[inline]
pub fn hash_bytes_with_seed(data: &[u8], seed: u32) -> u32 {
    data.iter().fold(seed, |crc, &byte| step(crc, byte))
}

/// Compute the checksum of `data` treating the bytes in `zeroed` as zero.
///
/// This is how a page is hashed while its own checksum field is in place.
/// Parts of `zeroed` lying past the end of `data` are ignored.
pub fn hash_with_zeroed(data: &[u8], zeroed: Range<usize>) -> u32 {
    let start = zeroed.start.min(data.len());
    let end = zeroed.end.clamp(start, data.len());

    let crc = hash_bytes(&data[..start]);
    let crc = (start..end).fold(crc, |crc, _| step(crc, 0));
    hash_bytes_with_seed(&data[end..], crc)
}
