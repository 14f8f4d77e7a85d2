//! End-to-end round-trip tests for the `.lzma` stream format.

use ruzma::{
    compress, compress_bytes, compress_level, decompress_bytes, EncoderOptions, LzmaError,
    MatchFinderKind,
};

/// Deterministic pseudorandom bytes (64-bit LCG).
fn random_bytes(len: usize, mut seed: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    for _ in 0..len {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        data.push((seed >> 56) as u8);
    }
    data
}

/// English-ish filler built from a small vocabulary.
fn text_corpus(len: usize) -> Vec<u8> {
    const WORDS: &[&str] = &[
        "the", "archive", "window", "stream", "dictionary", "probability", "range", "coder",
        "match", "literal", "distance", "length", "position", "packet", "history", "buffer",
    ];
    let mut out = Vec::with_capacity(len + 16);
    let mut seed = 0xDEADBEEFu64;
    while out.len() < len {
        seed = seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
        let word = WORDS[(seed >> 33) as usize % WORDS.len()];
        out.extend_from_slice(word.as_bytes());
        out.push(if seed & 0x400 == 0 { b' ' } else { b'.' });
    }
    out.truncate(len);
    out
}

#[test]
fn empty_input_known_size() {
    let compressed = compress_bytes(b"", 4).unwrap();
    // 13-byte header: props byte 93 (lc=3 lp=0 pb=2), dictionary size
    // little-endian, size zero, then the range coder's five seed bytes.
    assert_eq!(compressed.len(), 18);
    assert_eq!(compressed[0], 93);
    assert_eq!(&compressed[1..5], &(1u32 << 22).to_le_bytes());
    assert_eq!(&compressed[5..13], &[0u8; 8]);
    assert_eq!(decompress_bytes(&compressed).unwrap(), b"");
}

#[test]
fn empty_input_unknown_size() {
    let mut compressed = Vec::new();
    compress_level(&b""[..], &mut compressed, -1, 4).unwrap();
    assert_eq!(&compressed[5..13], &[0xFF; 8]);
    assert_eq!(decompress_bytes(&compressed).unwrap(), b"");
}

#[test]
fn single_byte() {
    for level in [1, 4] {
        let compressed = compress_bytes(b"A", level).unwrap();
        assert_eq!(decompress_bytes(&compressed).unwrap(), b"A");
    }
}

#[test]
fn lzma_lzma_lzma_known_size() {
    let data = b"lzmalzmalzma";
    let compressed = compress_bytes(data, 4).unwrap();
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn lzma_lzma_lzma_unknown_size() {
    let data = b"lzmalzmalzma";
    let mut unknown = Vec::new();
    compress_level(&data[..], &mut unknown, -1, 4).unwrap();
    assert_eq!(decompress_bytes(&unknown).unwrap(), data);

    // The unknown-size stream carries the end marker on top of the same
    // packet sequence, so it must be strictly longer.
    let known = compress_bytes(data, 4).unwrap();
    assert!(unknown.len() > known.len());
}

#[test]
fn zeros_compress_and_roundtrip() {
    let data = vec![0u8; 4096];
    let compressed = compress_bytes(&data, 4).unwrap();
    assert!(compressed.len() < data.len());
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn one_mebibyte_of_zeros() {
    let data = vec![0u8; 1 << 20];
    let compressed = compress_bytes(&data, 4).unwrap();
    assert!(compressed.len() < data.len() / 100);
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn one_mebibyte_of_random_bytes() {
    let data = random_bytes(1 << 20, 0x0123_4567_89AB_CDEF);
    let compressed = compress_bytes(&data, 4).unwrap();
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn text_corpus_exceeding_dictionary() {
    // Level 1 uses a 64 KiB dictionary; push three times that through it.
    let data = text_corpus(192 * 1024);
    let compressed = compress_bytes(&data, 1).unwrap();
    assert!(compressed.len() < data.len());
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn all_low_levels_roundtrip() {
    let data = text_corpus(20 * 1024);
    for level in 1..=6 {
        let compressed = compress_bytes(&data, level).unwrap();
        assert_eq!(
            decompress_bytes(&compressed).unwrap(),
            data,
            "level {level}"
        );
    }
}

#[test]
#[ignore = "levels 7-9 allocate multi-hundred-megabyte dictionaries"]
fn high_levels_roundtrip() {
    let data = text_corpus(20 * 1024);
    for level in 7..=9 {
        let compressed = compress_bytes(&data, level).unwrap();
        assert_eq!(
            decompress_bytes(&compressed).unwrap(),
            data,
            "level {level}"
        );
    }
}

#[test]
fn bt2_match_finder_roundtrip() {
    let mut opts = EncoderOptions::from_level(4).unwrap();
    opts.match_finder = MatchFinderKind::Bt2;
    let data = text_corpus(32 * 1024);
    let mut compressed = Vec::new();
    compress(&data[..], &mut compressed, data.len() as i64, &opts).unwrap();
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn custom_props_roundtrip() {
    // Non-default lc/lp/pb exercise the literal and pos-state contexts.
    let mut opts = EncoderOptions::from_level(2).unwrap();
    opts.lc = 0;
    opts.lp = 2;
    opts.pb = 0;
    let data = text_corpus(8 * 1024);
    let mut compressed = Vec::new();
    compress(&data[..], &mut compressed, data.len() as i64, &opts).unwrap();
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}

#[test]
fn corrupted_payload_never_panics() {
    let data = vec![0u8; 4096];
    let compressed = compress_bytes(&data, 4).unwrap();
    // Flip a bit in every early payload byte (including the range coder
    // seed bytes right after the header) and in a few spread positions.
    let positions: Vec<usize> = (13..compressed.len().min(48))
        .chain([compressed.len() / 2, compressed.len() - 1])
        .collect();
    for &i in &positions {
        let mut corrupted = compressed.clone();
        corrupted[i] ^= 0x01;
        match decompress_bytes(&corrupted) {
            // The decoder must never emit more than the declared size.
            Ok(out) => assert!(out.len() <= data.len(), "flip at {i}"),
            Err(
                LzmaError::CorruptStream { .. }
                | LzmaError::UnexpectedEof { .. }
                | LzmaError::InvalidHeader { .. },
            ) => {}
            Err(e) => panic!("unexpected error kind for flip at {i}: {e}"),
        }
    }
}

#[test]
fn truncated_payload_is_eof_or_corrupt() {
    let data = text_corpus(4096);
    let compressed = compress_bytes(&data, 4).unwrap();
    // Cutting the stream in half guarantees the decoder runs out of
    // payload before reaching the declared size.
    let truncated = &compressed[..compressed.len() / 2];
    match decompress_bytes(truncated) {
        Err(LzmaError::UnexpectedEof { .. } | LzmaError::CorruptStream { .. }) => {}
        other => panic!("expected EOF or corruption, got {other:?}"),
    }
}

#[test]
fn header_out_of_range_property_byte() {
    // d = 225 is the first illegal properties byte.
    let mut stream = vec![225u8];
    stream.extend_from_slice(&(1u32 << 16).to_le_bytes());
    stream.extend_from_slice(&0i64.to_le_bytes());
    stream.extend_from_slice(&[0u8; 5]);
    match decompress_bytes(&stream) {
        Err(LzmaError::InvalidHeader { .. }) => {}
        other => panic!("expected InvalidHeader, got {other:?}"),
    }
}

#[test]
fn binary_structured_data_roundtrip() {
    // Interleaved record-like data with both short and long periods.
    let mut data = Vec::new();
    for i in 0..20_000u32 {
        data.extend_from_slice(&i.to_le_bytes());
        data.push((i % 3) as u8);
    }
    let compressed = compress_bytes(&data, 4).unwrap();
    assert!(compressed.len() < data.len());
    assert_eq!(decompress_bytes(&compressed).unwrap(), data);
}
