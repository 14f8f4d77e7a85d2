//! Throughput benchmarks for LZMA compression and decompression.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ruzma::{compress_bytes, decompress_bytes};
use std::hint::black_box;

/// Test data generators covering the interesting compression regimes.
mod test_data {
    /// All bytes identical: the rep0 fast path.
    pub fn uniform(size: usize) -> Vec<u8> {
        vec![0xAA; size]
    }

    /// LCG noise: the literal-only worst case.
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x123456789ABCDEF0;
        for _ in 0..size {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }

    /// Short repeating phrase: dense match coverage.
    pub fn repetitive(size: usize) -> Vec<u8> {
        let pattern = b"TOBEORNOTTOBEORTOBEORNOT";
        let mut data = Vec::with_capacity(size);
        while data.len() < size {
            let take = (size - data.len()).min(pattern.len());
            data.extend_from_slice(&pattern[..take]);
        }
        data
    }
}

const SIZE: usize = 256 * 1024;

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    group.throughput(Throughput::Bytes(SIZE as u64));
    let patterns: [(&str, fn(usize) -> Vec<u8>); 3] = [
        ("uniform", test_data::uniform),
        ("random", test_data::random),
        ("repetitive", test_data::repetitive),
    ];
    for (name, generate) in patterns {
        let data = generate(SIZE);
        for level in [1u32, 4] {
            group.bench_with_input(
                BenchmarkId::new(name, level),
                &data,
                |b, data| b.iter(|| compress_bytes(black_box(data), level).unwrap()),
            );
        }
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");
    group.throughput(Throughput::Bytes(SIZE as u64));
    let patterns: [(&str, fn(usize) -> Vec<u8>); 3] = [
        ("uniform", test_data::uniform),
        ("random", test_data::random),
        ("repetitive", test_data::repetitive),
    ];
    for (name, generate) in patterns {
        let compressed = compress_bytes(&generate(SIZE), 4).unwrap();
        group.bench_with_input(BenchmarkId::new(name, 4), &compressed, |b, compressed| {
            b.iter(|| decompress_bytes(black_box(compressed)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress);
criterion_main!(benches);
