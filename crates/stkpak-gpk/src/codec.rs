//! Compressed index codec.
//!
//! The index (and any `DFLT` entry payload) is stored in the Qt `qCompress`
//! convention: a 4-byte big-endian uncompressed length followed by a zlib
//! stream. Packages in the wild disagree about whether the index was
//! deciphered before shipping and about whether the length prefix is still
//! present, so decoding looks for a zlib header rather than assuming either.

use std::borrow::Cow;
use std::io::{self, Write};

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use tracing::{debug, trace};

use crate::cipher;
use crate::error::DecodeError;

/// Offsets at which a zlib header is looked for.
const HEADER_OFFSETS: [usize; 2] = [0, 4];

const INFLATE_CHUNK: usize = 16 * 1024;

/// Check whether two bytes form a zlib stream header (RFC 1950).
#[inline]
pub fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    cmf & 0x0F == 8 && cmf >> 4 <= 7 && ((u16::from(cmf) << 8) | u16::from(flg)) % 31 == 0
}

/// Inflate a complete zlib stream, failing if it ends early.
fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut output = Vec::with_capacity(data.len().saturating_mul(4).max(INFLATE_CHUNK));

    loop {
        if output.len() == output.capacity() {
            output.reserve(INFLATE_CHUNK);
        }

        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let status = inflater
            .decompress_vec(&data[before_in as usize..], &mut output, FlushDecompress::None)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if matches!(status, Status::StreamEnd) {
            return Ok(output);
        }
        if inflater.total_in() == before_in && inflater.total_out() == before_out {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "compressed stream ended early",
            ));
        }
    }
}

/// Inflate from every header offset holding a zlib header until one yields a
/// complete stream.
///
/// `Ok(None)` means no offset held a header at all.
fn inflate_any(data: &[u8]) -> io::Result<Option<Vec<u8>>> {
    let mut failure = None;

    for offset in HEADER_OFFSETS {
        if data.len() < offset + 2 || !is_zlib_header(data[offset], data[offset + 1]) {
            continue;
        }
        match inflate(&data[offset..]) {
            Ok(output) => {
                trace!(offset, "zlib stream inflated");
                return Ok(Some(output));
            }
            Err(e) => {
                trace!(offset, "zlib header did not inflate: {e}");
                failure = Some(e);
            }
        }
    }

    failure.map_or(Ok(None), Err)
}

/// Find the form of the stored index that inflates, returning it alongside
/// the inflated bytes.
fn locate(raw: &[u8], pre_deciphered: bool) -> Result<(Cow<'_, [u8]>, Vec<u8>), DecodeError> {
    if raw.len() < 2 {
        return Err(DecodeError::TooShort(raw.len()));
    }

    let mut failure = None;

    if pre_deciphered {
        match inflate_any(raw) {
            Ok(Some(index)) => {
                debug!("index: {} bytes -> {} bytes", raw.len(), index.len());
                return Ok((Cow::Borrowed(raw), index));
            }
            Ok(None) => {}
            Err(e) => {
                debug!("plain index did not inflate, retrying deciphered: {e}");
                failure = Some(e);
            }
        }
    }

    let deciphered = cipher::applied(raw);
    match inflate_any(&deciphered) {
        Ok(Some(index)) => {
            debug!("index: {} bytes -> {} bytes", raw.len(), index.len());
            return Ok((Cow::Owned(deciphered), index));
        }
        Ok(None) => {}
        Err(e) => failure = Some(e),
    }

    Err(match failure {
        Some(e) => DecodeError::StreamCorrupt(e),
        None => DecodeError::NoValidStream,
    })
}

/// Decode the raw index section of a package.
///
/// `pre_deciphered` is the hint from trailer validation. When set, the raw
/// bytes are tried first; the cipher pass runs only if that finds nothing
/// usable. The declared length prefix is never trusted: a stream that
/// inflates cleanly is authoritative.
pub fn decode_index(raw: &[u8], pre_deciphered: bool) -> Result<Vec<u8>, DecodeError> {
    locate(raw, pre_deciphered).map(|(_, index)| index)
}

/// The stored index section with the cipher removed, still compressed.
///
/// Uses the same detection as [`decode_index`], so the result is exactly
/// what a package with a plain trailer carries.
pub fn decipher_index(raw: &[u8], pre_deciphered: bool) -> Result<Vec<u8>, DecodeError> {
    locate(raw, pre_deciphered).map(|(stored, _)| stored.into_owned())
}

/// Unwrap a `DFLT` entry payload.
///
/// Payloads are never enciphered, so only the offset search applies.
pub fn decompress_payload(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if raw.len() < 2 {
        return Err(DecodeError::TooShort(raw.len()));
    }
    inflate_any(raw)
        .map_err(DecodeError::StreamCorrupt)?
        .ok_or(DecodeError::NoValidStream)
}

/// Compress data in the size-prefixed convention.
///
/// Fails for inputs whose length does not fit the 32-bit prefix.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let length = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "input exceeds 4 GiB")
    })?;

    let mut output = Vec::with_capacity(data.len() / 2 + 16);
    output.extend_from_slice(&length.to_be_bytes());

    let mut encoder = ZlibEncoder::new(output, Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Compress and encipher an index the way packages store it.
pub fn encode_index(index: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoded = compress(index)?;
    cipher::apply(&mut encoded);
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"SE/hit.ogg SE/hit.ogg SE/hit.ogg BGM/title_loop.ogg";

    #[test]
    fn test_zlib_header_detection() {
        assert!(is_zlib_header(0x78, 0x9C));
        assert!(is_zlib_header(0x78, 0x01));
        assert!(is_zlib_header(0x78, 0xDA));
        assert!(!is_zlib_header(0x78, 0x9D));
        assert!(!is_zlib_header(0x00, 0x00));
    }

    #[test]
    fn test_decode_enciphered_index() {
        let encoded = encode_index(SAMPLE).unwrap();
        assert_eq!(decode_index(&encoded, false).unwrap(), SAMPLE);
        // The hint only changes the search order.
        assert_eq!(decode_index(&encoded, true).unwrap(), SAMPLE);
    }

    #[test]
    fn test_decode_plain_index_with_prefix() {
        let plain = compress(SAMPLE).unwrap();
        assert_eq!(decode_index(&plain, true).unwrap(), SAMPLE);
    }

    #[test]
    fn test_decode_plain_index_without_prefix() {
        let plain = compress(SAMPLE).unwrap();
        assert_eq!(decode_index(&plain[4..], true).unwrap(), SAMPLE);
    }

    #[test]
    fn test_decode_enciphered_index_without_prefix() {
        let mut stream = compress(SAMPLE).unwrap()[4..].to_vec();
        cipher::apply(&mut stream);
        assert_eq!(decode_index(&stream, false).unwrap(), SAMPLE);
    }

    #[test]
    fn test_no_valid_stream() {
        let garbage = vec![0u8; 64];
        assert!(matches!(
            decode_index(&cipher::applied(&garbage), false),
            Err(DecodeError::NoValidStream)
        ));
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let encoded = compress(&[0x5Au8; 4096].repeat(4)).unwrap();
        let truncated = cipher::applied(&encoded[..encoded.len() / 2]);
        assert!(matches!(
            decode_index(&truncated, false),
            Err(DecodeError::StreamCorrupt(_))
        ));
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(decode_index(&[0x78], false), Err(DecodeError::TooShort(1))));
    }

    #[test]
    fn test_header_lookalike_prefix_falls_through() {
        // Bytes 0..2 form a valid zlib header but the block type is reserved.
        let mut payload = vec![0x78, 0x01, 0xFF, 0xFF];
        payload.extend_from_slice(&compress(SAMPLE).unwrap()[4..]);

        assert_eq!(decompress_payload(&payload).unwrap(), SAMPLE);
        assert_eq!(decode_index(&payload, true).unwrap(), SAMPLE);
    }

    #[test]
    fn test_decipher_index() {
        let encoded = encode_index(SAMPLE).unwrap();
        let plain = decipher_index(&encoded, false).unwrap();
        assert_eq!(plain, compress(SAMPLE).unwrap());
        assert_eq!(decipher_index(&plain, true).unwrap(), plain);
        assert_eq!(decode_index(&plain, true).unwrap(), SAMPLE);
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = compress(SAMPLE).unwrap();
        assert_eq!(decompress_payload(&payload).unwrap(), SAMPLE);
    }
}
