//! End-to-end round-trip tests over the boundary scenarios and
//! randomized inputs spanning multiple meta-blocks.

use cinder_brotli::context::LiteralContextMode;
use cinder_brotli::{BrotliCodec, BrotliDecompressor, BrotliEncoder};
use cinder_core::{Codec, CompressionLevel, Compressor, Decompressor};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

fn roundtrip(input: &[u8]) -> Vec<u8> {
    let codec = BrotliCodec::new();
    let compressed = codec.compress(input).expect("compress");
    let decompressed = codec.decompress(&compressed).expect("decompress");
    assert_eq!(decompressed, input, "round-trip mismatch");
    compressed
}

#[test]
fn test_empty_input_is_two_fixed_bytes() {
    let compressed = roundtrip(b"");
    assert_eq!(compressed, vec![0x01, 0x00]);
}

#[test]
fn test_single_byte() {
    // The fixed meta-block framing (length, three split bits, distance
    // parameters, two context maps, three prefix codes) costs ~10 bytes
    // even for one input byte.
    let compressed = roundtrip(b"A");
    assert!(compressed.len() <= 16, "single byte took {} bytes", compressed.len());
}

#[test]
fn test_64kib_of_zeros() {
    let input = vec![0u8; 64 * 1024];
    let compressed = roundtrip(&input);
    assert!(
        compressed.len() <= 64,
        "64 KiB of zeros took {} bytes",
        compressed.len()
    );
}

#[test]
fn test_abc_cycle_200kib() {
    let input: Vec<u8> = b"abc".iter().cycle().take(200 * 1024).copied().collect();
    let compressed = roundtrip(&input);
    assert!(
        compressed.len() < 1000,
        "200 KiB cycle took {} bytes",
        compressed.len()
    );
}

#[test]
fn test_4mib_random_spans_meta_blocks() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut input = vec![0u8; 4 * 1024 * 1024];
    rng.fill_bytes(&mut input);
    let compressed = roundtrip(&input);
    // Incompressible input cannot shrink.
    assert!(compressed.len() >= input.len());
}

#[test]
fn test_exact_meta_block_boundary() {
    // Exactly two maximum-size meta-blocks.
    let mut rng = StdRng::seed_from_u64(7);
    let mut input = vec![0u8; 2 << 21];
    rng.fill_bytes(&mut input);
    roundtrip(&input);
}

#[test]
fn test_streaming_driver_matches_one_shot() {
    let input: Vec<u8> = b"streaming and one-shot agree "
        .iter()
        .cycle()
        .take(50_000)
        .copied()
        .collect();

    let mut encoder = BrotliEncoder::new(CompressionLevel::Default).unwrap();
    encoder.write_stream_header();
    let mut streamed = Vec::new();
    for chunk in input.chunks(1 << 21) {
        streamed.extend_from_slice(&encoder.write_meta_block(chunk));
    }
    streamed.extend_from_slice(&encoder.finish_stream());

    let one_shot = BrotliCodec::new().compress(&input).unwrap();
    assert_eq!(streamed, one_shot);
}

#[test]
fn test_small_meta_blocks_share_the_window() {
    // Feed repeating content in small meta-blocks; later blocks should
    // still round-trip while copying from earlier ones.
    let pattern: Vec<u8> = b"shared window pattern ".iter().cycle().take(4096).copied().collect();

    let mut encoder = BrotliEncoder::new(CompressionLevel::Default).unwrap();
    encoder.write_stream_header();
    let mut compressed = Vec::new();
    for _ in 0..8 {
        compressed.extend_from_slice(&encoder.write_meta_block(&pattern));
    }
    compressed.extend_from_slice(&encoder.finish_stream());

    let expected: Vec<u8> = pattern
        .iter()
        .cycle()
        .take(pattern.len() * 8)
        .copied()
        .collect();
    let decompressed = BrotliDecompressor::new().decompress(&compressed).unwrap();
    assert_eq!(decompressed, expected);
    // Later blocks compress to almost nothing thanks to the window.
    assert!(compressed.len() < expected.len() / 8);
}

#[test]
fn test_determinism_across_invocations() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut input = vec![0u8; 300_000];
    rng.fill_bytes(&mut input);
    // Make it partly compressible.
    for chunk in input.chunks_mut(1024).skip(1).step_by(2) {
        chunk.fill(b'x');
    }
    let a = BrotliCodec::new().compress(&input).unwrap();
    let b = BrotliCodec::new().compress(&input).unwrap();
    assert_eq!(a, b);
    assert_eq!(BrotliDecompressor::new().decompress(&a).unwrap(), input);
}

#[test]
fn test_random_sizes_and_alphabets() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    for _ in 0..24 {
        let len = rng.gen_range(0..10_000);
        let alphabet = rng.gen_range(1..=256) as u32;
        let input: Vec<u8> = (0..len).map(|_| (rng.next_u32() % alphabet) as u8).collect();
        roundtrip(&input);
    }
}

#[test]
fn test_text_like_input() {
    let text = include_str!("../src/lib.rs");
    let input: Vec<u8> = text.bytes().cycle().take(150_000).collect();
    let compressed = roundtrip(&input);
    assert!(compressed.len() < input.len() / 2);
}

#[test]
fn test_every_literal_context_mode_roundtrips() {
    // Mixed text and binary so each mode sees varied prev-byte contexts.
    let mut input: Vec<u8> = b"Context modes: LSB6, MSB6, UTF8 and Signed. "
        .iter()
        .cycle()
        .take(30_000)
        .copied()
        .collect();
    input.extend((0..30_000u32).map(|i| (i * 17) as u8));

    for mode in [
        LiteralContextMode::Lsb6,
        LiteralContextMode::Msb6,
        LiteralContextMode::Utf8,
        LiteralContextMode::Signed,
    ] {
        let mut encoder = BrotliEncoder::new(CompressionLevel::Default)
            .unwrap()
            .with_literal_context_mode(mode);
        encoder.write_stream_header();
        let mut compressed = Vec::new();
        for chunk in input.chunks(1 << 21) {
            compressed.extend_from_slice(&encoder.write_meta_block(chunk));
        }
        compressed.extend_from_slice(&encoder.finish_stream());

        let decompressed = BrotliDecompressor::new().decompress(&compressed).unwrap();
        assert_eq!(decompressed, input, "round-trip failed in mode {mode:?}");
    }
}

#[test]
fn test_structured_binary_input() {
    // Record-like data: fixed-stride fields exercise distance short codes.
    let mut input = Vec::new();
    for i in 0u32..20_000 {
        input.extend_from_slice(&i.to_le_bytes());
        input.extend_from_slice(&(i % 7).to_le_bytes());
    }
    roundtrip(&input);
}
