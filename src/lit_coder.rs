//! Literal coding with context from the previous byte and position.
//!
//! The coder owns `1 << (lc + lp)` sub-coders of 768 probabilities each.
//! A literal is coded bit by bit, MSB first, walking the sub-coder like a
//! bit tree. When the previous packet was a match, the byte at distance
//! rep0 steers the model selection ("matched" coding) until the first
//! mismatch, after which the walk falls back to the plain models.

use std::io::{Read, Write};

use crate::error::Result;
use crate::price::get_price;
use crate::range_coder::{new_bit_models, RangeDecoder, RangeEncoder};

const NUM_LIT_PROBS: usize = 0x300;

/// One literal context: 768 probabilities.
#[derive(Debug)]
pub struct LitSubCoder {
    probs: Vec<u16>,
}

impl LitSubCoder {
    fn new() -> Self {
        Self {
            probs: new_bit_models(NUM_LIT_PROBS),
        }
    }

    /// Decode a literal in the plain branch.
    pub fn decode_normal<R: Read>(&mut self, rd: &mut RangeDecoder<R>) -> Result<u8> {
        let mut symbol = 1u32;
        while symbol < 0x100 {
            let bit = rd.decode_bit(&mut self.probs, symbol as usize)?;
            symbol = (symbol << 1) | bit;
        }
        Ok(symbol as u8)
    }

    /// Decode a literal steered by `match_byte` (the byte at distance rep0).
    pub fn decode_matched<R: Read>(
        &mut self,
        rd: &mut RangeDecoder<R>,
        mut match_byte: u8,
    ) -> Result<u8> {
        let mut symbol = 1u32;
        while symbol < 0x100 {
            let match_bit = u32::from(match_byte >> 7) & 1;
            match_byte <<= 1;
            let bit = rd.decode_bit(&mut self.probs, (((1 + match_bit) << 8) + symbol) as usize)?;
            symbol = (symbol << 1) | bit;
            if match_bit != bit {
                while symbol < 0x100 {
                    let bit = rd.decode_bit(&mut self.probs, symbol as usize)?;
                    symbol = (symbol << 1) | bit;
                }
                break;
            }
        }
        Ok(symbol as u8)
    }

    /// Encode a literal in the plain branch.
    pub fn encode<W: Write>(&mut self, re: &mut RangeEncoder<W>, symbol: u8) -> Result<()> {
        let mut context = 1u32;
        for i in (0..8).rev() {
            let bit = u32::from(symbol >> i) & 1;
            re.encode(&mut self.probs, context as usize, bit)?;
            context = (context << 1) | bit;
        }
        Ok(())
    }

    /// Encode a literal steered by `match_byte` until the first mismatch.
    pub fn encode_matched<W: Write>(
        &mut self,
        re: &mut RangeEncoder<W>,
        match_byte: u8,
        symbol: u8,
    ) -> Result<()> {
        let mut context = 1u32;
        let mut same = true;
        for i in (0..8).rev() {
            let bit = u32::from(symbol >> i) & 1;
            let mut state = context;
            if same {
                let match_bit = u32::from(match_byte >> i) & 1;
                state += (1 + match_bit) << 8;
                same = match_bit == bit;
            }
            re.encode(&mut self.probs, state as usize, bit)?;
            context = (context << 1) | bit;
        }
        Ok(())
    }

    /// Price of encoding `symbol`, replaying the matched/plain branch
    /// structure. Does not adapt the models.
    pub fn price(&self, match_mode: bool, match_byte: u8, symbol: u8) -> u32 {
        let mut price = 0u32;
        let mut context = 1u32;
        let mut i = 7i32;
        if match_mode {
            while i >= 0 {
                let match_bit = u32::from(match_byte >> i) & 1;
                let bit = u32::from(symbol >> i) & 1;
                price += get_price(
                    u32::from(self.probs[(((1 + match_bit) << 8) + context) as usize]),
                    bit,
                );
                context = (context << 1) | bit;
                if match_bit != bit {
                    i -= 1;
                    break;
                }
                i -= 1;
            }
        }
        while i >= 0 {
            let bit = u32::from(symbol >> i) & 1;
            price += get_price(u32::from(self.probs[context as usize]), bit);
            context = (context << 1) | bit;
            i -= 1;
        }
        price
    }
}

/// Literal coder: a table of sub-coders selected by position and
/// previous byte.
#[derive(Debug)]
pub struct LitCoder {
    coders: Vec<LitSubCoder>,
    num_prev_bits: u32,
    pos_mask: u32,
}

impl LitCoder {
    /// Create a literal coder for `lp` position bits and `lc` context bits.
    pub fn new(num_pos_bits: u32, num_prev_bits: u32) -> Self {
        let num_states = 1usize << (num_prev_bits + num_pos_bits);
        Self {
            coders: (0..num_states).map(|_| LitSubCoder::new()).collect(),
            num_prev_bits,
            pos_mask: (1 << num_pos_bits) - 1,
        }
    }

    #[inline]
    fn index(&self, pos: u32, prev_byte: u8) -> usize {
        (((pos & self.pos_mask) << self.num_prev_bits)
            + (u32::from(prev_byte) >> (8 - self.num_prev_bits))) as usize
    }

    /// Sub-coder for stream position `pos` and previous byte `prev_byte`.
    #[inline]
    pub fn sub_coder(&mut self, pos: u32, prev_byte: u8) -> &mut LitSubCoder {
        let index = self.index(pos, prev_byte);
        &mut self.coders[index]
    }

    /// Shared view of the sub-coder, for price queries.
    #[inline]
    pub fn sub_coder_ref(&self, pos: u32, prev_byte: u8) -> &LitSubCoder {
        &self.coders[self.index(pos, prev_byte)]
    }
}
