//! Bit-tree coders: fixed-width symbols over a binary tree of
//! probability models.
//!
//! The tree is stored as a flat slice addressed from index 1 by the
//! running bit prefix. The forward variants walk MSB-first; the reverse
//! variants walk LSB-first and are used for the alignment bits and the
//! near-distance footer. The `*_index` free functions address a window
//! inside a larger shared model slice.

use std::io::{Read, Write};

use crate::error::Result;
use crate::price::get_price;
use crate::range_coder::{new_bit_models, RangeDecoder, RangeEncoder};

/// A bit tree of `1 << num_bits` probability models.
#[derive(Debug, Clone)]
pub struct BitTree {
    models: Vec<u16>,
    num_bits: u32,
}

impl BitTree {
    /// Create a tree coding `num_bits`-wide symbols.
    pub fn new(num_bits: u32) -> Self {
        Self {
            models: new_bit_models(1 << num_bits),
            num_bits,
        }
    }

    /// Decode a symbol MSB-first.
    pub fn decode<R: Read>(&mut self, rd: &mut RangeDecoder<R>) -> Result<u32> {
        let mut m = 1u32;
        for _ in 0..self.num_bits {
            m = (m << 1) + rd.decode_bit(&mut self.models, m as usize)?;
        }
        Ok(m - (1 << self.num_bits))
    }

    /// Decode a symbol LSB-first.
    pub fn reverse_decode<R: Read>(&mut self, rd: &mut RangeDecoder<R>) -> Result<u32> {
        reverse_decode_index(rd, &mut self.models, 0, self.num_bits)
    }

    /// Encode a symbol MSB-first.
    pub fn encode<W: Write>(&mut self, re: &mut RangeEncoder<W>, symbol: u32) -> Result<()> {
        let mut m = 1u32;
        for bit_index in (0..self.num_bits).rev() {
            let bit = (symbol >> bit_index) & 1;
            re.encode(&mut self.models, m as usize, bit)?;
            m = (m << 1) | bit;
        }
        Ok(())
    }

    /// Encode a symbol LSB-first.
    pub fn reverse_encode<W: Write>(&mut self, re: &mut RangeEncoder<W>, symbol: u32) -> Result<()> {
        reverse_encode_index(re, &mut self.models, 0, self.num_bits, symbol)
    }

    /// Price of encoding `symbol` MSB-first. Does not adapt the models.
    pub fn price(&self, symbol: u32) -> u32 {
        let mut price = 0u32;
        let mut m = 1u32;
        for bit_index in (0..self.num_bits).rev() {
            let bit = (symbol >> bit_index) & 1;
            price += get_price(u32::from(self.models[m as usize]), bit);
            m = (m << 1) + bit;
        }
        price
    }

    /// Price of encoding `symbol` LSB-first. Does not adapt the models.
    pub fn reverse_price(&self, symbol: u32) -> u32 {
        reverse_price_index(&self.models, 0, self.num_bits, symbol)
    }
}

/// LSB-first decode over `models[start + 1..]`.
///
/// `start` may be -1: the walk only ever touches `start + m` for `m >= 1`.
pub fn reverse_decode_index<R: Read>(
    rd: &mut RangeDecoder<R>,
    models: &mut [u16],
    start: i32,
    num_bits: u32,
) -> Result<u32> {
    let mut m = 1u32;
    let mut symbol = 0u32;
    for bit_index in 0..num_bits {
        let bit = rd.decode_bit(models, (start + m as i32) as usize)?;
        m = (m << 1) + bit;
        symbol |= bit << bit_index;
    }
    Ok(symbol)
}

/// LSB-first encode over `models[start + 1..]`.
pub fn reverse_encode_index<W: Write>(
    re: &mut RangeEncoder<W>,
    models: &mut [u16],
    start: i32,
    num_bits: u32,
    mut symbol: u32,
) -> Result<()> {
    let mut m = 1u32;
    for _ in 0..num_bits {
        let bit = symbol & 1;
        re.encode(models, (start + m as i32) as usize, bit)?;
        m = (m << 1) | bit;
        symbol >>= 1;
    }
    Ok(())
}

/// LSB-first price over `models[start + 1..]`. Does not adapt the models.
pub fn reverse_price_index(models: &[u16], start: i32, num_bits: u32, mut symbol: u32) -> u32 {
    let mut price = 0u32;
    let mut m = 1u32;
    for _ in 0..num_bits {
        let bit = symbol & 1;
        symbol >>= 1;
        price += get_price(u32::from(models[(start + m as i32) as usize]), bit);
        m = (m << 1) | bit;
    }
    price
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_forward_roundtrip() {
        let mut out = Vec::new();
        let mut enc = RangeEncoder::new(&mut out);
        let mut tree = BitTree::new(6);
        let symbols = [0u32, 63, 17, 42, 1, 62, 33, 33, 33];
        for &s in &symbols {
            tree.encode(&mut enc, s).unwrap();
        }
        enc.flush().unwrap();

        let mut dec = RangeDecoder::new(Cursor::new(out)).unwrap();
        let mut tree = BitTree::new(6);
        for &s in &symbols {
            assert_eq!(tree.decode(&mut dec).unwrap(), s);
        }
    }

    #[test]
    fn test_reverse_roundtrip() {
        let mut out = Vec::new();
        let mut enc = RangeEncoder::new(&mut out);
        let mut tree = BitTree::new(4);
        for s in 0..16u32 {
            tree.reverse_encode(&mut enc, s).unwrap();
        }
        enc.flush().unwrap();

        let mut dec = RangeDecoder::new(Cursor::new(out)).unwrap();
        let mut tree = BitTree::new(4);
        for s in 0..16u32 {
            assert_eq!(tree.reverse_decode(&mut dec).unwrap(), s);
        }
    }

    #[test]
    fn test_indexed_reverse_roundtrip() {
        // A window starting at -1 inside a shared model slice, the way the
        // distance footer models are addressed.
        let mut models = new_bit_models(32);
        let mut out = Vec::new();
        let mut enc = RangeEncoder::new(&mut out);
        for s in [5u32, 0, 7, 3] {
            reverse_encode_index(&mut enc, &mut models, -1, 3, s).unwrap();
        }
        enc.flush().unwrap();

        let mut models = new_bit_models(32);
        let mut dec = RangeDecoder::new(Cursor::new(out)).unwrap();
        for s in [5u32, 0, 7, 3] {
            assert_eq!(reverse_decode_index(&mut dec, &mut models, -1, 3).unwrap(), s);
        }
    }

    #[test]
    fn test_price_matches_fresh_tree_cost() {
        // On a fresh tree every bit is even odds, so any 6-bit symbol
        // prices at exactly six bits.
        let tree = BitTree::new(6);
        assert_eq!(tree.price(0), 6 * 64);
        assert_eq!(tree.price(63), 6 * 64);
        assert_eq!(tree.reverse_price(21), 6 * 64);
    }
}
