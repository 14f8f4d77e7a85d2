//! Range coder: the arithmetic bit source and sink shared by the
//! decoder and encoder.
//!
//! A probability is an 11-bit value (2048 = certainty of a zero bit),
//! adapted after every coded bit by moving 1/32 of the distance towards
//! the observed outcome. The coder renormalises whenever the range drops
//! below 2^24, one byte at a time.

use std::io::{self, Read, Write};

use crate::error::{LzmaError, Result};
use crate::price::{BIT_MODEL_TOTAL, NUM_BIT_MODEL_TOTAL_BITS, NUM_MOVE_BITS, PROB_INIT};

const TOP_MASK: u32 = 0xFF00_0000;

/// Allocate a probability model array, initialised to one half.
pub fn new_bit_models(len: usize) -> Vec<u16> {
    vec![PROB_INIT; len]
}

/// Range decoder over a byte reader.
#[derive(Debug)]
pub struct RangeDecoder<R: Read> {
    reader: R,
    range: u32,
    code: u32,
}

impl<R: Read> RangeDecoder<R> {
    /// Create a decoder, consuming the 5 seed bytes of the payload.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; 5];
        reader
            .read_exact(&mut buf)
            .map_err(|e| map_eof(e, buf.len()))?;
        let code = buf.iter().fold(0u32, |code, &b| (code << 8) | u32::from(b));
        Ok(Self {
            reader,
            range: u32::MAX,
            code,
        })
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf).map_err(|e| map_eof(e, 1))?;
        Ok(buf[0])
    }

    #[inline]
    fn normalize(&mut self) -> Result<()> {
        if self.range & TOP_MASK == 0 {
            let b = self.read_byte()?;
            self.code = (self.code << 8) | u32::from(b);
            self.range <<= 8;
        }
        Ok(())
    }

    /// Decode one bit against `probs[index]`, adapting the model.
    pub fn decode_bit(&mut self, probs: &mut [u16], index: usize) -> Result<u32> {
        let prob = probs[index];
        let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * u32::from(prob);
        if self.code < bound {
            self.range = bound;
            probs[index] = prob + ((BIT_MODEL_TOTAL as u16 - prob) >> NUM_MOVE_BITS);
            self.normalize()?;
            Ok(0)
        } else {
            self.code -= bound;
            self.range -= bound;
            probs[index] = prob - (prob >> NUM_MOVE_BITS);
            self.normalize()?;
            Ok(1)
        }
    }

    /// Decode `num_bits` bits at fixed even odds, MSB first.
    pub fn decode_direct_bits(&mut self, num_bits: u32) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..num_bits {
            self.range >>= 1;
            let t = self.code.wrapping_sub(self.range) >> 31;
            self.code -= self.range & t.wrapping_sub(1);
            result = (result << 1) | (1 - t);
            self.normalize()?;
        }
        Ok(result)
    }
}

fn map_eof(e: io::Error, expected: usize) -> LzmaError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        LzmaError::unexpected_eof(expected)
    } else {
        LzmaError::Io(e)
    }
}

/// Range encoder over a byte writer.
///
/// `low` is a 33-bit accumulator; the byte above bit 32 is the pending
/// carry. `cache` holds the top output byte until the carry for it is
/// known, and `cache_size` counts the 0xFF bytes queued behind it.
#[derive(Debug)]
pub struct RangeEncoder<W: Write> {
    writer: W,
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u32,
    pos: u64,
}

impl<W: Write> RangeEncoder<W> {
    /// Create an encoder writing the payload to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            low: 0,
            range: u32::MAX,
            cache: 0,
            cache_size: 1,
            pos: 0,
        }
    }

    fn shift_low(&mut self) -> Result<()> {
        let low_hi = (self.low >> 32) as u8;
        if low_hi != 0 || self.low < 0xFF00_0000 {
            self.pos += u64::from(self.cache_size);
            let mut temp = self.cache;
            loop {
                self.writer.write_all(&[temp.wrapping_add(low_hi)])?;
                temp = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
        Ok(())
    }

    /// Encode `symbol` (0 or 1) against `probs[index]`, adapting the model.
    pub fn encode(&mut self, probs: &mut [u16], index: usize, symbol: u32) -> Result<()> {
        let prob = probs[index];
        let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * u32::from(prob);
        if symbol == 0 {
            self.range = bound;
            probs[index] = prob + ((BIT_MODEL_TOTAL as u16 - prob) >> NUM_MOVE_BITS);
        } else {
            self.low += u64::from(bound);
            self.range -= bound;
            probs[index] = prob - (prob >> NUM_MOVE_BITS);
        }
        if self.range & TOP_MASK == 0 {
            self.range <<= 8;
            self.shift_low()?;
        }
        Ok(())
    }

    /// Encode the low `num_bits` bits of `v` at fixed even odds, MSB first.
    pub fn encode_direct_bits(&mut self, v: u32, num_bits: u32) -> Result<()> {
        for i in (0..num_bits).rev() {
            self.range >>= 1;
            if (v >> i) & 1 == 1 {
                self.low += u64::from(self.range);
            }
            if self.range & TOP_MASK == 0 {
                self.range <<= 8;
                self.shift_low()?;
            }
        }
        Ok(())
    }

    /// Drain the remaining state and flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        for _ in 0..5 {
            self.shift_low()?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Total payload bytes this encoder accounts for so far.
    pub fn processed_size(&self) -> u64 {
        u64::from(self.cache_size) + self.pos + 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bit_roundtrip_even_odds() {
        let mut out = Vec::new();
        let mut enc = RangeEncoder::new(&mut out);
        let mut probs = new_bit_models(1);
        let bits = [0u32, 1, 1, 0, 1, 0, 0, 1, 1, 1, 0];
        for &b in &bits {
            enc.encode(&mut probs, 0, b).unwrap();
        }
        enc.flush().unwrap();

        let mut dec = RangeDecoder::new(Cursor::new(out)).unwrap();
        let mut probs = new_bit_models(1);
        for &b in &bits {
            assert_eq!(dec.decode_bit(&mut probs, 0).unwrap(), b);
        }
    }

    #[test]
    fn test_bit_roundtrip_pseudorandom() {
        // Longer sequence exercising renormalisation and the carry path.
        let mut seed = 0x1234_5678_9abc_def0u64;
        let mut bits = Vec::new();
        for _ in 0..4096 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            bits.push((seed >> 63) as u32);
        }

        let mut out = Vec::new();
        let mut enc = RangeEncoder::new(&mut out);
        let mut probs = new_bit_models(4);
        for (i, &b) in bits.iter().enumerate() {
            enc.encode(&mut probs, i & 3, b).unwrap();
        }
        enc.flush().unwrap();

        let mut dec = RangeDecoder::new(Cursor::new(out)).unwrap();
        let mut probs = new_bit_models(4);
        for (i, &b) in bits.iter().enumerate() {
            assert_eq!(dec.decode_bit(&mut probs, i & 3).unwrap(), b, "bit {i}");
        }
    }

    #[test]
    fn test_direct_bits_roundtrip() {
        let values = [(0u32, 1u32), (1, 1), (0x2A, 6), (0xFFFF, 16), (0x1234_5678, 30)];
        let mut out = Vec::new();
        let mut enc = RangeEncoder::new(&mut out);
        for &(v, n) in &values {
            enc.encode_direct_bits(v, n).unwrap();
        }
        enc.flush().unwrap();

        let mut dec = RangeDecoder::new(Cursor::new(out)).unwrap();
        for &(v, n) in &values {
            assert_eq!(dec.decode_direct_bits(n).unwrap(), v);
        }
    }

    #[test]
    fn test_probability_stays_in_bounds() {
        let mut out = Vec::new();
        let mut enc = RangeEncoder::new(&mut out);
        let mut probs = new_bit_models(1);
        for _ in 0..10_000 {
            enc.encode(&mut probs, 0, 1).unwrap();
            assert!(probs[0] >= 1 && probs[0] < 2048);
        }
        for _ in 0..10_000 {
            enc.encode(&mut probs, 0, 0).unwrap();
            assert!(probs[0] >= 1 && probs[0] < 2048);
        }
    }

    #[test]
    fn test_processed_size_tracks_output() {
        let mut out = Vec::new();
        let mut enc = RangeEncoder::new(&mut out);
        // The decoder consumes five seed bytes before the first decision,
        // so the account starts at five.
        assert_eq!(enc.processed_size(), 5);
        let mut probs = new_bit_models(1);
        for i in 0..1000u32 {
            enc.encode(&mut probs, 0, i & 1).unwrap();
        }
        enc.flush().unwrap();
        let processed = enc.processed_size();
        drop(enc);
        assert_eq!(processed, out.len() as u64 + 5);
    }

    #[test]
    fn test_decoder_needs_five_seed_bytes() {
        let err = RangeDecoder::new(Cursor::new(vec![0u8; 3])).unwrap_err();
        assert!(matches!(err, LzmaError::UnexpectedEof { .. }));
    }
}
