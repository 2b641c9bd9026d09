//! Benchmarks for Brotli-format compression and decompression.
//!
//! Run with: `cargo bench -p cinder-brotli`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cinder_brotli::{BrotliCodec, BrotliCompressor};
use cinder_core::{CompressionLevel, Compressor, Decompressor};

/// Generate test data with varying compressibility.
fn generate_test_data(size: usize, compressibility: f64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut data = Vec::with_capacity(size);

    if compressibility > 0.9 {
        let pattern = b"ABCDEFGHIJKLMNOP";
        while data.len() < size {
            data.extend_from_slice(pattern);
        }
        data.truncate(size);
    } else if compressibility > 0.5 {
        let phrases: &[&[u8]] = &[
            b"The quick brown fox jumps over the lazy dog. ",
            b"Pack my box with five dozen liquor jugs! ",
            b"How vexingly quick daft zebras jump!! ",
        ];
        while data.len() < size {
            if rng.gen_bool(compressibility) {
                let phrase = phrases[rng.gen_range(0..phrases.len())];
                data.extend_from_slice(phrase);
            } else {
                data.push(rng.r#gen::<u8>());
            }
        }
        data.truncate(size);
    } else {
        data.resize(size, 0);
        rng.fill(&mut data[..]);
    }

    data
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("brotli_compress");

    for size in [4 * 1024, 64 * 1024, 256 * 1024] {
        let data = generate_test_data(size, 0.7);
        let compressor = BrotliCompressor::new();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}KB", size / 1024)),
            &data,
            |b, data| b.iter(|| compressor.compress(black_box(data)).unwrap()),
        );
    }

    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("brotli_decompress");

    let codec = BrotliCodec::new();
    for size in [4 * 1024, 64 * 1024, 256 * 1024] {
        let data = generate_test_data(size, 0.7);
        let compressed = codec.compress(&data).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}KB", size / 1024)),
            &compressed,
            |b, compressed| b.iter(|| codec.decompress(black_box(compressed)).unwrap()),
        );
    }

    group.finish();
}

fn bench_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("brotli_levels");

    let size = 64 * 1024;
    let data = generate_test_data(size, 0.8);

    for (name, level) in [
        ("fast", CompressionLevel::Fast),
        ("default", CompressionLevel::Default),
        ("best", CompressionLevel::Best),
    ] {
        let compressor = BrotliCompressor::with_level(level);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| compressor.compress(black_box(data)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress, bench_levels);
criterion_main!(benches);
