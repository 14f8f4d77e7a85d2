//! # ruzma
//!
//! Streaming LZMA1 compression and decompression in pure Rust.
//!
//! `ruzma` reads and writes the classic `.lzma` container: a 13-byte
//! header (properties byte, dictionary size, uncompressed size) followed
//! by a range-coded payload, optionally terminated by an end-of-stream
//! marker when the size is declared unknown.
//!
//! The implementation follows the reference LZMA design:
//!
//! - a binary range coder with adaptive 11-bit probability models,
//! - context modelling of literals by previous byte and position,
//! - a binary-tree match finder (BT4, optionally BT2) over a sliding
//!   dictionary,
//! - an optimal parser that picks packets by minimising bit prices over
//!   a lookahead horizon.
//!
//! ## Decompression
//!
//! ```
//! use ruzma::{compress_bytes, decompress_bytes};
//!
//! let compressed = compress_bytes(b"lzmalzmalzma", 4).unwrap();
//! let original = decompress_bytes(&compressed).unwrap();
//! assert_eq!(original, b"lzmalzmalzma");
//! ```
//!
//! ## Streaming
//!
//! The streaming entry points pull from any [`Read`] and push to any
//! [`Write`]; wrap slow sources and sinks in buffered adapters.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{BufReader, BufWriter};
//!
//! let input = BufReader::new(File::open("data.bin")?);
//! let output = BufWriter::new(File::create("data.bin.lzma")?);
//! ruzma::compress_level(input, output, -1, 6)?;
//! # Ok::<(), ruzma::LzmaError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod len_coder;
pub mod lit_coder;
pub mod match_finder;
pub mod price;
pub mod range_coder;
pub mod state;
pub mod tree;
pub mod window;

mod optimal;

pub use config::{
    EncoderOptions, MatchFinderKind, BEST_COMPRESSION, BEST_SPEED, DEFAULT_COMPRESSION,
};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{LzmaError, Result};

use std::io::{Read, Write};

/// Compress `reader` into `writer` with explicit options.
///
/// `size` is the exact number of bytes `reader` will yield, or -1 when
/// unknown; -1 arms the end-of-stream marker.
pub fn compress<R: Read, W: Write>(
    reader: R,
    writer: W,
    size: i64,
    opts: &EncoderOptions,
) -> Result<()> {
    Encoder::new(reader, writer, size, *opts)?.run()
}

/// Compress `reader` into `writer` at a compression level in `[1, 9]`.
pub fn compress_level<R: Read, W: Write>(reader: R, writer: W, size: i64, level: u32) -> Result<()> {
    compress(reader, writer, size, &EncoderOptions::from_level(level)?)
}

/// Compress a byte slice at a compression level in `[1, 9]`, declaring
/// its exact size in the header.
pub fn compress_bytes(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    compress_level(data, &mut out, data.len() as i64, level)?;
    Ok(out)
}

/// Decompress an `.lzma` stream from `reader` into `writer`.
///
/// Returns the number of bytes produced.
pub fn decompress<R: Read, W: Write>(reader: R, writer: W) -> Result<u64> {
    Decoder::new(reader, writer)?.run()
}

/// Decompress an `.lzma` stream held in a byte slice.
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decompress(data, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_roundtrip() {
        let data = b"Hello, LZMA world! Hello, LZMA world! Hello, LZMA world!";
        let compressed = compress_bytes(data, 4).unwrap();
        assert_eq!(decompress_bytes(&compressed).unwrap(), data);
    }

    #[test]
    fn test_streaming_matches_bytes_api() {
        let data: Vec<u8> = (0..2000u32).map(|i| (i % 97) as u8).collect();
        let by_slice = compress_bytes(&data, 2).unwrap();
        let mut by_stream = Vec::new();
        compress_level(&data[..], &mut by_stream, data.len() as i64, 2).unwrap();
        assert_eq!(by_slice, by_stream);
    }

    #[test]
    fn test_bad_level_is_invalid_option() {
        assert!(matches!(
            compress_bytes(b"x", 0),
            Err(LzmaError::InvalidOption { .. })
        ));
    }
}
