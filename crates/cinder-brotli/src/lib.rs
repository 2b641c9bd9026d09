//! # Cinder Brotli
//!
//! Native Rust implementation of a Brotli-bit-format encoder and decoder.
//!
//! The encoder models its input with insert-and-copy commands over a
//! sliding window, then packs each meta-block with partitioned,
//! context-conditioned entropy models and self-describing prefix codes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       cinder-brotli                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  compress/              │  decompress.rs                    │
//! │  ├── ring_buffer        │  (full decoding pipeline)         │
//! │  ├── backward_refs      │                                   │
//! │  ├── block_splitter     │                                   │
//! │  ├── cluster            │                                   │
//! │  └── metablock          │                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  huffman.rs             │  histogram.rs                     │
//! │  (codes + serialization)│  (counts, population cost)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  bits.rs                │  prefix.rs        │  context.rs   │
//! │  (bit sink / reader)    │  (static tables)  │  (modeling)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stream layout
//!
//! A stream is a header (window size), a sequence of meta-blocks of up
//! to 2 MiB of input each, and a final last-block bit. Every meta-block
//! carries its own block splits, context maps and prefix codes, so the
//! decoder needs no out-of-band state beyond the persistent distance
//! ring. The empty input has a fixed two-byte encoding.
//!
//! ## Example
//!
//! ```rust
//! use cinder_brotli::BrotliCodec;
//! use cinder_core::{Codec, Compressor, Decompressor};
//!
//! let codec = BrotliCodec::new();
//! let compressed = codec.compress(b"Hello, World!").unwrap();
//! let original = codec.decompress(&compressed).unwrap();
//! assert_eq!(original, b"Hello, World!");
//! ```

pub mod bits;
pub mod compress;
pub mod context;
pub mod decompress;
pub mod histogram;
pub mod huffman;
pub mod prefix;

pub use compress::{BrotliEncoder, MAX_BACKWARD_DISTANCE, META_BLOCK_SIZE_BITS, WINDOW_BITS};

use cinder_core::{
    Algorithm, Codec, CompressionLevel, Compressor, Decompressor, Error, Result,
};

/// Brotli compressor.
#[derive(Debug, Clone)]
pub struct BrotliCompressor {
    level: CompressionLevel,
}

impl BrotliCompressor {
    /// Create a new compressor with default settings.
    pub fn new() -> Self {
        Self {
            level: CompressionLevel::Default,
        }
    }

    /// Create with compression level.
    pub fn with_level(level: CompressionLevel) -> Self {
        Self { level }
    }
}

impl Default for BrotliCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for BrotliCompressor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Brotli
    }

    fn level(&self) -> CompressionLevel {
        self.level
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        compress::compress_buffer(input, self.level)
    }

    fn compress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let compressed = self.compress(input)?;
        if compressed.len() > output.len() {
            return Err(Error::buffer_too_small(compressed.len(), output.len()));
        }
        output[..compressed.len()].copy_from_slice(&compressed);
        Ok(compressed.len())
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        // Worst case: incompressible input pays the per-meta-block
        // model headers on top of near-raw literals.
        input_len + (input_len >> 2) + 512
    }
}

/// Brotli decompressor.
#[derive(Debug, Clone, Default)]
pub struct BrotliDecompressor;

impl BrotliDecompressor {
    /// Create a new decompressor.
    pub fn new() -> Self {
        Self
    }
}

impl Decompressor for BrotliDecompressor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Brotli
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        decompress::decompress_stream(input)
    }

    fn decompress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let decompressed = self.decompress(input)?;
        if decompressed.len() > output.len() {
            return Err(Error::buffer_too_small(decompressed.len(), output.len()));
        }
        output[..decompressed.len()].copy_from_slice(&decompressed);
        Ok(decompressed.len())
    }
}

/// Brotli codec combining compression and decompression.
#[derive(Debug, Clone)]
pub struct BrotliCodec {
    level: CompressionLevel,
}

impl BrotliCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self {
            level: CompressionLevel::Default,
        }
    }

    /// Create with compression level.
    pub fn with_level(level: CompressionLevel) -> Self {
        Self { level }
    }
}

impl Default for BrotliCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for BrotliCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Brotli
    }

    fn level(&self) -> CompressionLevel {
        self.level
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        BrotliCompressor::with_level(self.level).compress(input)
    }

    fn compress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        BrotliCompressor::with_level(self.level).compress_to(input, output)
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        BrotliCompressor::new().max_compressed_size(input_len)
    }
}

impl Decompressor for BrotliCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Brotli
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        BrotliDecompressor::new().decompress(input)
    }

    fn decompress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        BrotliDecompressor::new().decompress_to(input, output)
    }
}

impl Codec for BrotliCodec {
    fn new() -> Self {
        BrotliCodec::new()
    }

    fn with_level(level: CompressionLevel) -> Self {
        BrotliCodec::with_level(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_empty() {
        let codec = BrotliCodec::new();
        let compressed = codec.compress(b"").unwrap();
        assert_eq!(compressed, vec![0x01, 0x00]);
        assert_eq!(codec.decompress(&compressed).unwrap(), b"");
    }

    #[test]
    fn test_roundtrip_single_byte() {
        let codec = BrotliCodec::new();
        let compressed = codec.compress(b"A").unwrap();
        assert!(compressed.len() <= 16, "got {} bytes", compressed.len());
        assert_eq!(codec.decompress(&compressed).unwrap(), b"A");
    }

    #[test]
    fn test_roundtrip_small() {
        let codec = BrotliCodec::new();
        let input = b"Hello, Brotli!";
        let compressed = codec.compress(input).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_roundtrip_repetitive() {
        let codec = BrotliCodec::new();
        let input: Vec<u8> = b"The quick brown fox jumps over the lazy dog. "
            .iter()
            .cycle()
            .take(100_000)
            .copied()
            .collect();
        let compressed = codec.compress(&input).unwrap();
        assert!(compressed.len() < input.len() / 10);
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_roundtrip_binary() {
        let codec = BrotliCodec::new();
        let input: Vec<u8> = (0..=255).collect();
        let compressed = codec.compress(&input).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_compression_levels() {
        let input = b"Testing compression levels with some repetitive content content content.";
        for level in [
            CompressionLevel::None,
            CompressionLevel::Fast,
            CompressionLevel::Default,
            CompressionLevel::Best,
        ] {
            let codec = BrotliCodec::with_level(level);
            let compressed = codec.compress(input).unwrap();
            assert_eq!(
                codec.decompress(&compressed).unwrap(),
                input,
                "roundtrip failed at level {level:?}"
            );
        }
    }

    #[test]
    fn test_verify_roundtrip() {
        let codec = BrotliCodec::new();
        assert!(codec.verify_roundtrip(b"verify roundtrip helper").unwrap());
    }

    #[test]
    fn test_compress_to_buffer_too_small() {
        let compressor = BrotliCompressor::new();
        let mut tiny = [0u8; 1];
        assert!(compressor.compress_to(b"some input data", &mut tiny).is_err());
    }

    #[test]
    fn test_compress_to() {
        let compressor = BrotliCompressor::new();
        let decompressor = BrotliDecompressor::new();
        let input = b"compress into a caller buffer";
        let mut buf = vec![0u8; compressor.max_compressed_size(input.len())];
        let n = compressor.compress_to(input, &mut buf).unwrap();
        assert_eq!(decompressor.decompress(&buf[..n]).unwrap(), input);
    }

    #[test]
    fn test_decompress_to() {
        let codec = BrotliCodec::new();
        let compressed = codec.compress(b"fits exactly").unwrap();
        let mut out = vec![0u8; 12];
        let n = codec.decompress_to(&compressed, &mut out).unwrap();
        assert_eq!(&out[..n], b"fits exactly");

        let mut small = vec![0u8; 3];
        assert!(codec.decompress_to(&compressed, &mut small).is_err());
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let decompressor = BrotliDecompressor::new();
        assert!(decompressor.decompress(&[]).is_err());
    }
}
