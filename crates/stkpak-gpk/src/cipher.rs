//! GPK obfuscation cipher.
//!
//! GPK packages obscure their index (and sometimes their trailer) with a
//! repeating 16-byte XOR key. Applying the cipher twice restores the input,
//! so the same routine both enciphers and deciphers.

/// The XOR key used by GPK packages.
///
/// This is hardcoded in the game client and is not a secret.
pub const GPK_CIPHER_KEY: [u8; 16] = [
    0x82, 0xEE, 0x1D, 0xB3, 0x57, 0xE9, 0x2C, 0xC2, 0x2F, 0x54, 0x7B, 0x10, 0x4C, 0x9A, 0x75, 0x49,
];

/// Apply the cipher in place.
///
/// Byte `i` of the buffer is XORed with key byte `i % 16`.
#[inline]
pub fn apply(data: &mut [u8]) {
    for (byte, key) in data.iter_mut().zip(GPK_CIPHER_KEY.iter().cycle()) {
        *byte ^= key;
    }
}

/// Apply the cipher to a copy of the data.
pub fn applied(data: &[u8]) -> Vec<u8> {
    let mut buffer = data.to_vec();
    apply(&mut buffer);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_empty() {
        let mut data: [u8; 0] = [];
        apply(&mut data);
        assert!(applied(&[]).is_empty());
    }

    #[test]
    fn test_key_repeats_every_16_bytes() {
        let out = applied(&[0u8; 40]);
        assert_eq!(&out[..16], &GPK_CIPHER_KEY);
        assert_eq!(&out[16..32], &GPK_CIPHER_KEY);
        assert_eq!(&out[32..], &GPK_CIPHER_KEY[..8]);
    }

    #[test]
    fn test_is_involution() {
        let original: Vec<u8> = (0..=255u8).collect();
        let mut data = original.clone();
        apply(&mut data);
        assert_ne!(data, original);
        apply(&mut data);
        assert_eq!(data, original);
    }
}
