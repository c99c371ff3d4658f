//! Compression and checksum adapters.
//!
//! The archive core never touches DEFLATE or CRC-32 directly. It calls these
//! traits, so callers can swap in their own implementation (a different
//! compression level, a hardware CRC, a recording fake in tests).

use std::io::{self, Read, Write};

use flate2::Compression as Level;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

/// Raw DEFLATE compression (method 8, no zlib/gzip envelope).
pub trait Compression {
    /// Compress a complete payload.
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Decompress a complete payload. `size_hint` is the expected output
    /// length taken from the header and is only used to size the buffer.
    fn decompress(&self, data: &[u8], size_hint: usize) -> io::Result<Vec<u8>>;
}

/// CRC-32 with the IEEE 802.3 polynomial.
pub trait Checksum {
    fn crc32(&self, data: &[u8]) -> u32;
}

/// Upper bound on the output reserved up front, as a multiple of the input.
const MAX_HINT_RATIO: usize = 4;

/// `flate2` backed raw DEFLATE.
#[derive(Debug, Clone, Copy)]
pub struct RawDeflate {
    level: u32,
}

impl RawDeflate {
    /// Default level used by `zip` and `gzip`.
    pub const DEFAULT_LEVEL: u32 = 6;

    /// Create an adapter with the given level, clamped to 0..=9.
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for RawDeflate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEVEL)
    }
}

impl Compression for RawDeflate {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(
            Vec::with_capacity(data.len() / 2 + 16),
            Level::new(self.level),
        );
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8], size_hint: usize) -> io::Result<Vec<u8>> {
        // The hint comes from an untrusted header.
        let reserve = size_hint.min(data.len().saturating_mul(MAX_HINT_RATIO).max(64));
        let mut out = Vec::with_capacity(reserve);
        DeflateDecoder::new(data).read_to_end(&mut out)?;
        out.shrink_to_fit();
        Ok(out)
    }
}

/// `crc32fast` backed checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32;

impl Checksum for Crc32 {
    fn crc32(&self, data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_roundtrip() {
        let codec = RawDeflate::default();
        let data = b"hello hello hello hello hello".repeat(20);
        let compressed = codec.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(codec.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_deflate_is_raw() {
        // A zlib stream would start with 0x78; raw DEFLATE of an empty
        // payload is the two byte final fixed block.
        let compressed = RawDeflate::default().compress(b"").unwrap();
        assert_eq!(compressed, vec![0x03, 0x00]);
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let err = RawDeflate::default().decompress(&[0xff; 8], 0);
        assert!(err.is_err());
    }

    #[test]
    fn test_decompress_ignores_oversized_hint() {
        let codec = RawDeflate::default();
        let compressed = codec.compress(b"hi").unwrap();
        let out = codec.decompress(&compressed, u32::MAX as usize).unwrap();
        assert_eq!(out, b"hi");
        assert!(out.capacity() < 64);
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(RawDeflate::new(42).level(), 9);
    }

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(Crc32.crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(Crc32.crc32(b""), 0);
    }
}
