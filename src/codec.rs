//! LZ codec boundary and the content hash.
//!
//! The engine treats compression as a black box: `compress` never fails on
//! non-empty input and returns an empty frame only for empty input;
//! `decompress`/`decompress_into` report the exact byte count produced, and
//! any disagreement with the expected length is corruption.

use crate::error::{Result, VarkError};

pub fn compress(src: &[u8]) -> Vec<u8> {
    if src.is_empty() {
        return Vec::new();
    }
    lz4_flex::compress(src)
}

/// Decompress a frame into a fresh buffer of exactly `expected` bytes.
pub fn decompress(src: &[u8], expected: usize) -> Result<Vec<u8>> {
    if expected == 0 {
        return Ok(Vec::new());
    }
    let out = lz4_flex::decompress(src, expected)
        .map_err(|_| VarkError::Corrupt("lz frame failed to decode"))?;
    if out.len() != expected {
        return Err(VarkError::Corrupt("decoder output length mismatch"));
    }
    Ok(out)
}

/// Decompress a frame into `dst`, returning the byte count produced.
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    lz4_flex::decompress_into(src, dst).map_err(|_| VarkError::Corrupt("lz frame failed to decode"))
}

/// FNV-1a 64 over the uncompressed member bytes; stored in the catalog and
/// checked on full decompression.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    const BASIS: u64 = 0xCBF2_9CE4_8422_2325;
    const PRIME: u64 = 0x100_0000_01B3;
    let mut hash = BASIS;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_vectors() {
        assert_eq!(fnv1a_64(b""), 0xCBF2_9CE4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xAF63_DC4C_8601_EC8C);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171F73967E8);
    }

    #[test]
    fn round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let frame = compress(&data);
        assert!(!frame.is_empty());
        assert_eq!(decompress(&frame, data.len()).unwrap(), data);
    }

    #[test]
    fn empty_input_yields_empty_frame() {
        assert!(compress(b"").is_empty());
        assert!(decompress(b"", 0).unwrap().is_empty());
    }

    #[test]
    fn wrong_expected_length_is_corrupt() {
        let frame = compress(b"some bytes worth compressing, repeated a few times over");
        assert!(matches!(
            decompress(&frame, 7),
            Err(VarkError::Corrupt(_))
        ));
    }
}
