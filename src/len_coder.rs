//! Match length coding in three tiers.
//!
//! Lengths 2..=9 go through a per-pos-state 3-bit low tree, 10..=17
//! through a per-pos-state 3-bit mid tree, and everything up to 273
//! through a shared 8-bit high tree. Two `choice` bits select the tier.
//! Symbols here are zero-based: the caller adds/subtracts
//! [`MATCH_MIN_LEN`](crate::state::MATCH_MIN_LEN).

use std::io::{Read, Write};

use crate::error::Result;
use crate::price::{get_price0, get_price1};
use crate::range_coder::{new_bit_models, RangeDecoder, RangeEncoder};
use crate::state::{
    NUM_HIGH_LEN_BITS, NUM_LEN_SYMBOLS, NUM_LOW_LEN_BITS, NUM_LOW_LEN_SYMBOLS, NUM_MID_LEN_BITS,
    NUM_MID_LEN_SYMBOLS, NUM_POS_STATES_BITS_MAX, NUM_POS_STATES_MAX,
};
use crate::tree::BitTree;

/// Three-tier length coder.
#[derive(Debug)]
pub struct LenCoder {
    choice: Vec<u16>,
    low: Vec<BitTree>,
    mid: Vec<BitTree>,
    high: BitTree,
}

impl LenCoder {
    /// Create a length coder for `num_pos_states` position states.
    pub fn new(num_pos_states: usize) -> Self {
        Self {
            choice: new_bit_models(2),
            low: (0..num_pos_states)
                .map(|_| BitTree::new(NUM_LOW_LEN_BITS))
                .collect(),
            mid: (0..num_pos_states)
                .map(|_| BitTree::new(NUM_MID_LEN_BITS))
                .collect(),
            high: BitTree::new(NUM_HIGH_LEN_BITS),
        }
    }

    /// Decode a zero-based length symbol.
    pub fn decode<R: Read>(&mut self, rd: &mut RangeDecoder<R>, pos_state: usize) -> Result<u32> {
        if rd.decode_bit(&mut self.choice, 0)? == 0 {
            return self.low[pos_state].decode(rd);
        }
        if rd.decode_bit(&mut self.choice, 1)? == 0 {
            Ok(NUM_LOW_LEN_SYMBOLS + self.mid[pos_state].decode(rd)?)
        } else {
            Ok(NUM_LOW_LEN_SYMBOLS + NUM_MID_LEN_SYMBOLS + self.high.decode(rd)?)
        }
    }

    /// Encode a zero-based length symbol.
    pub fn encode<W: Write>(
        &mut self,
        re: &mut RangeEncoder<W>,
        mut symbol: u32,
        pos_state: usize,
    ) -> Result<()> {
        if symbol < NUM_LOW_LEN_SYMBOLS {
            re.encode(&mut self.choice, 0, 0)?;
            self.low[pos_state].encode(re, symbol)?;
        } else {
            symbol -= NUM_LOW_LEN_SYMBOLS;
            re.encode(&mut self.choice, 0, 1)?;
            if symbol < NUM_MID_LEN_SYMBOLS {
                re.encode(&mut self.choice, 1, 0)?;
                self.mid[pos_state].encode(re, symbol)?;
            } else {
                re.encode(&mut self.choice, 1, 1)?;
                self.high.encode(re, symbol - NUM_MID_LEN_SYMBOLS)?;
            }
        }
        Ok(())
    }

    fn set_prices(&self, prices: &mut [u32], pos_state: usize, num_symbols: u32, st: usize) {
        let a0 = get_price0(u32::from(self.choice[0]));
        let a1 = get_price1(u32::from(self.choice[0]));
        let b0 = a1 + get_price0(u32::from(self.choice[1]));
        let b1 = a1 + get_price1(u32::from(self.choice[1]));
        let mut i = 0u32;
        while i < NUM_LOW_LEN_SYMBOLS {
            if i >= num_symbols {
                return;
            }
            prices[st + i as usize] = a0 + self.low[pos_state].price(i);
            i += 1;
        }
        while i < NUM_LOW_LEN_SYMBOLS + NUM_MID_LEN_SYMBOLS {
            if i >= num_symbols {
                return;
            }
            prices[st + i as usize] = b0 + self.mid[pos_state].price(i - NUM_LOW_LEN_SYMBOLS);
            i += 1;
        }
        while i < num_symbols {
            prices[st + i as usize] =
                b1 + self.high.price(i - NUM_LOW_LEN_SYMBOLS - NUM_MID_LEN_SYMBOLS);
            i += 1;
        }
    }
}

/// Length coder with a cached price table per position state.
///
/// Prices are recomputed for a position state after `table_size` symbols
/// have been encoded under it, so they lag the adaptive models by a
/// bounded amount.
#[derive(Debug)]
pub struct LenPriceTableCoder {
    coder: LenCoder,
    prices: Vec<u32>,
    counters: [u32; NUM_POS_STATES_MAX],
    table_size: u32,
}

impl LenPriceTableCoder {
    /// Create a coder pricing symbols below `table_size`.
    pub fn new(table_size: u32, num_pos_states: usize) -> Self {
        let mut coder = Self {
            coder: LenCoder::new(num_pos_states),
            prices: vec![0u32; (NUM_LEN_SYMBOLS as usize) << NUM_POS_STATES_BITS_MAX],
            counters: [0; NUM_POS_STATES_MAX],
            table_size,
        };
        for pos_state in 0..num_pos_states {
            coder.update_table(pos_state);
        }
        coder
    }

    fn update_table(&mut self, pos_state: usize) {
        let st = pos_state * NUM_LEN_SYMBOLS as usize;
        self.coder
            .set_prices(&mut self.prices, pos_state, self.table_size, st);
        self.counters[pos_state] = self.table_size;
    }

    /// Cached price of a zero-based length symbol.
    #[inline]
    pub fn price(&self, symbol: u32, pos_state: usize) -> u32 {
        self.prices[pos_state * NUM_LEN_SYMBOLS as usize + symbol as usize]
    }

    /// Decode a zero-based length symbol.
    pub fn decode<R: Read>(&mut self, rd: &mut RangeDecoder<R>, pos_state: usize) -> Result<u32> {
        self.coder.decode(rd, pos_state)
    }

    /// Encode a zero-based length symbol, refreshing the price table when
    /// the counter for `pos_state` expires.
    pub fn encode<W: Write>(
        &mut self,
        re: &mut RangeEncoder<W>,
        symbol: u32,
        pos_state: usize,
    ) -> Result<()> {
        self.coder.encode(re, symbol, pos_state)?;
        self.counters[pos_state] -= 1;
        if self.counters[pos_state] == 0 {
            self.update_table(pos_state);
        }
        Ok(())
    }
}
