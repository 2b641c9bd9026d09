//! Compression pipeline.
//!
//! ```text
//! Input bytes
//!     │
//!     ▼
//! ┌─────────────────────────────────────┐
//! │  Ring buffer append                 │
//! │  Literal cost estimation            │
//! │  Backward-reference search          │
//! └─────────────────────────────────────┘
//!     │ commands
//!     ▼
//! ┌─────────────────────────────────────┐
//! │  Distance short-code resolution     │
//! │  Meta-block assembly                │
//! │  (splits, contexts, clustering)     │
//! └─────────────────────────────────────┘
//!     │ meta-block
//!     ▼
//! ┌─────────────────────────────────────┐
//! │  Bit-packed serialization           │
//! └─────────────────────────────────────┘
//!     │
//!     ▼
//! Compressed bytes
//! ```
//!
//! The encoder persists four pieces across meta-blocks: the ring buffer,
//! the 4-entry distance ring, the hasher, and the literal-cost scratch.
//! Everything else is block-scoped.

mod backward_references;
mod block_splitter;
mod cluster;
mod metablock;
mod ring_buffer;

pub use backward_references::{Command, Hasher, DISTANCE_PREFIX_NONE};
pub use block_splitter::{compute_block_type_short_codes, BlockSplit};
pub use metablock::{
    build_meta_block, compute_command_prefixes, compute_distance_short_codes, encode_context_map,
    meta_block_length, store_meta_block, EncodingParams, MetaBlock, SHORT_CODE_INDEX_OFFSET,
    SHORT_CODE_VALUE_OFFSET,
};
pub use ring_buffer::RingBuffer;

use crate::bits::BitSink;
use crate::context::LiteralContextMode;
use backward_references::{create_backward_references, estimate_bit_costs_for_literals};
use cinder_core::{CompressionLevel, Error, Result};

/// Log2 of the sliding window.
pub const WINDOW_BITS: u32 = 22;

/// The decoder may write a little ahead in its own window; the encoder
/// gives up that much reach.
const DECODER_WRITE_AHEAD_SLACK: usize = 16;

/// Largest usable backward distance.
pub const MAX_BACKWARD_DISTANCE: usize = (1 << WINDOW_BITS) - DECODER_WRITE_AHEAD_SLACK;

/// Log2 of the maximum meta-block payload.
pub const META_BLOCK_SIZE_BITS: u32 = 21;

/// Log2 of the ring buffer capacity.
const RING_BUFFER_BITS: u32 = 23;

/// Initial contents of the distance ring.
pub const INITIAL_DISTANCE_RING: [usize; 4] = [4, 11, 15, 16];

/// Streaming encoder state.
///
/// Drive it with [`write_stream_header`](BrotliEncoder::write_stream_header),
/// any number of [`write_meta_block`](BrotliEncoder::write_meta_block)
/// calls of up to `1 << 21` bytes each, then
/// [`finish_stream`](BrotliEncoder::finish_stream).
pub struct BrotliEncoder {
    window_bits: u32,
    params: EncodingParams,
    search_depth: usize,
    ring: RingBuffer,
    literal_cost: Vec<f32>,
    hasher: Hasher,
    dist_ring: [usize; 4],
    dist_ring_idx: usize,
    input_pos: usize,
    sink: BitSink,
}

impl BrotliEncoder {
    /// Create an encoder with the default window.
    pub fn new(level: CompressionLevel) -> Result<Self> {
        Self::with_window_bits(WINDOW_BITS, level)
    }

    /// Create an encoder with an explicit window size.
    pub fn with_window_bits(window_bits: u32, level: CompressionLevel) -> Result<Self> {
        if !(16..=24).contains(&window_bits) {
            return Err(Error::invalid_parameter(
                "window_bits",
                window_bits as i64,
                "16..=24",
            ));
        }
        let params = EncodingParams {
            num_direct_distance_codes: 12,
            distance_postfix_bits: 1,
            literal_context_mode: LiteralContextMode::Signed,
        };
        params.validate()?;

        let search_depth = match level {
            CompressionLevel::None => 1,
            CompressionLevel::Fast => 8,
            CompressionLevel::Default => 32,
            CompressionLevel::Best => 64,
            CompressionLevel::Ultra => 128,
            CompressionLevel::Custom(n) => n.clamp(1, 512) as usize,
        };

        Ok(Self {
            window_bits,
            params,
            search_depth,
            ring: RingBuffer::new(RING_BUFFER_BITS),
            literal_cost: vec![0.0; 1 << RING_BUFFER_BITS],
            hasher: Hasher::new(),
            dist_ring: INITIAL_DISTANCE_RING,
            dist_ring_idx: 0,
            input_pos: 0,
            sink: BitSink::with_capacity(2 << META_BLOCK_SIZE_BITS),
        })
    }

    /// Override the literal context mode (the default is signed-magnitude
    /// modeling, which suits general binary data).
    pub fn with_literal_context_mode(mut self, mode: LiteralContextMode) -> Self {
        self.params.literal_context_mode = mode;
        self
    }

    /// Write the stream header: no embedded input size, then the window
    /// size (one bit for the 16-bit window, otherwise a 3-bit offset).
    pub fn write_stream_header(&mut self) {
        self.sink.write_bits(3, 0);
        if self.window_bits == 16 {
            self.sink.write_bits(1, 0);
        } else {
            self.sink.write_bits(1, 1);
            self.sink.write_bits(3, (self.window_bits - 17) as u64);
        }
    }

    /// Compress one meta-block of input and return the completed output
    /// bytes. A straddling partial byte stays buffered for the next call.
    pub fn write_meta_block(&mut self, input: &[u8]) -> Vec<u8> {
        debug_assert!(!input.is_empty());
        debug_assert!(input.len() <= 1 << META_BLOCK_SIZE_BITS);

        let max_backward = (1usize << self.window_bits) - DECODER_WRITE_AHEAD_SLACK;
        self.ring.write(self.input_pos, input);
        estimate_bit_costs_for_literals(
            &self.ring,
            self.input_pos,
            input.len(),
            &mut self.literal_cost,
        );
        let mut commands = create_backward_references(
            &self.ring,
            &self.literal_cost,
            self.input_pos,
            input.len(),
            max_backward,
            &mut self.hasher,
            self.search_depth,
        );
        compute_distance_short_codes(&mut commands, &mut self.dist_ring, &mut self.dist_ring_idx);

        let mb = build_meta_block(self.params, commands, &self.ring, self.input_pos);
        store_meta_block(&mb, &self.ring, &mut self.input_pos, &mut self.sink);
        self.sink.extract_bytes()
    }

    /// Terminate the stream with the last-block bit and flush the tail.
    pub fn finish_stream(mut self) -> Vec<u8> {
        self.sink.write_bits(1, 1);
        self.sink.into_bytes()
    }
}

/// Compress a whole buffer into a fresh vector.
///
/// Zero-length input has a fixed two-byte encoding; everything else goes
/// through the header / meta-block loop / last-bit sequence.
pub fn compress_buffer(input: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Ok(vec![0x01, 0x00]);
    }

    let mut encoder = BrotliEncoder::new(level)?;
    encoder.write_stream_header();

    let mut output = Vec::with_capacity(input.len() / 2 + 64);
    for chunk in input.chunks(1 << META_BLOCK_SIZE_BITS) {
        output.extend_from_slice(&encoder.write_meta_block(chunk));
    }
    output.extend_from_slice(&encoder.finish_stream());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bits_validation() {
        assert!(BrotliEncoder::with_window_bits(15, CompressionLevel::Default).is_err());
        assert!(BrotliEncoder::with_window_bits(25, CompressionLevel::Default).is_err());
        for bits in 16..=24 {
            assert!(BrotliEncoder::with_window_bits(bits, CompressionLevel::Default).is_ok());
        }
    }

    #[test]
    fn test_empty_input_fixed_encoding() {
        let out = compress_buffer(&[], CompressionLevel::Default).unwrap();
        assert_eq!(out, vec![0x01, 0x00]);
    }

    #[test]
    fn test_stream_header_bits() {
        let mut encoder = BrotliEncoder::new(CompressionLevel::Default).unwrap();
        encoder.write_stream_header();
        // 3 zero bits, a 1 bit, then window_bits - 17 = 5 in 3 bits.
        let bytes = encoder.finish_stream();
        // Header is 7 bits plus the final last-block bit: 0b1_101_1_000.
        assert_eq!(bytes[0] & 0x07, 0);
        assert_eq!((bytes[0] >> 3) & 1, 1);
        assert_eq!((bytes[0] >> 4) & 0x07, 5);
    }

    #[test]
    fn test_determinism() {
        let input: Vec<u8> = b"determinism check ".iter().cycle().take(10_000).copied().collect();
        let a = compress_buffer(&input, CompressionLevel::Default).unwrap();
        let b = compress_buffer(&input, CompressionLevel::Default).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_meta_block_flush_keeps_bit_stream_aligned() {
        let mut encoder = BrotliEncoder::new(CompressionLevel::Default).unwrap();
        encoder.write_stream_header();
        let mut output = Vec::new();
        output.extend_from_slice(&encoder.write_meta_block(b"first chunk of data, fairly short"));
        let after_first = output.len();
        output.extend_from_slice(&encoder.write_meta_block(b"second chunk of data, also short"));
        assert!(output.len() > after_first);
        output.extend_from_slice(&encoder.finish_stream());
        assert!(!output.is_empty());
    }
}
