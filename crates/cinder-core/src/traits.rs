//! Core traits for compression and decompression.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! Compressor / Decompressor  (one-shot operations)
//!       ↓
//! Codec  (combined compress + decompress)
//! ```

use crate::error::Result;
use crate::types::{Algorithm, CompressionLevel, CompressionRatio};

/// One-shot compression operations.
pub trait Compressor {
    /// Get the compression algorithm.
    fn algorithm(&self) -> Algorithm;

    /// Get the configured compression level.
    fn level(&self) -> CompressionLevel;

    /// Compress `input` in one shot into a fresh vector.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Compress `input` into a caller-provided buffer.
    ///
    /// Returns the number of bytes written, or a buffer-too-small error
    /// when `output` cannot hold the result.
    fn compress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize>;

    /// Worst-case compressed size for `input_len` bytes, for sizing
    /// output buffers up front.
    fn max_compressed_size(&self, input_len: usize) -> usize;
}

/// One-shot decompression operations.
pub trait Decompressor {
    /// Get the decompression algorithm.
    fn algorithm(&self) -> Algorithm;

    /// Decompress `input` in one shot into a fresh vector.
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `input` into a caller-provided buffer.
    ///
    /// Returns the number of bytes written, or a buffer-too-small error
    /// when `output` cannot hold the result.
    fn decompress_to(&self, input: &[u8], output: &mut [u8]) -> Result<usize>;
}

/// Combined codec for both compression and decompression.
pub trait Codec: Compressor + Decompressor {
    /// Create a new codec with default settings.
    fn new() -> Self
    where
        Self: Sized;

    /// Create a new codec with specified level.
    fn with_level(level: CompressionLevel) -> Self
    where
        Self: Sized;

    /// Round-trip test: compress then decompress.
    /// Returns true if data matches.
    fn verify_roundtrip(&self, data: &[u8]) -> Result<bool> {
        let compressed = self.compress(data)?;
        let decompressed = self.decompress(&compressed)?;
        Ok(data == decompressed.as_slice())
    }

    /// Get compression ratio for given data.
    fn measure_ratio(&self, data: &[u8]) -> Result<CompressionRatio> {
        let compressed = self.compress(data)?;
        Ok(CompressionRatio::new(data.len(), compressed.len()))
    }
}
