//! LZMA stream encoder.
//!
//! Emits the 13-byte header, then drives the optimal parser over the
//! match finder's candidates: for each position the parser relaxes a
//! price table over a lookahead horizon, considering literals, short
//! reps, the four rep distances and every new-distance match, including
//! the "match, literal, rep0" macros. The committed packets are emitted
//! through the range encoder, mirroring the decoder's model layout.

use std::io::{Read, Write};

use crate::config::EncoderOptions;
use crate::error::{LzmaError, Result};
use crate::len_coder::LenPriceTableCoder;
use crate::lit_coder::LitCoder;
use crate::match_finder::BinTree;
use crate::optimal::{pos_slot, pos_slot2, Optimal, NUM_OPTS};
use crate::price::{
    get_price, get_price0, get_price1, INFINITY_PRICE, NUM_BIT_PRICE_SHIFT_BITS,
};
use crate::range_coder::{new_bit_models, RangeEncoder};
use crate::state::{
    len_to_pos_state, State, ALIGN_MASK, ALIGN_TABLE_SIZE, END_POS_MODEL_INDEX, MATCH_MAX_LEN,
    MATCH_MIN_LEN, NUM_ALIGN_BITS, NUM_FULL_DISTANCES, NUM_LEN_TO_POS_STATES, NUM_POS_SLOT_BITS,
    NUM_POS_STATES_BITS_MAX, NUM_REP_DISTANCES, NUM_STATES, START_POS_MODEL_INDEX,
};
use crate::tree::{reverse_encode_index, reverse_price_index, BitTree};

const HEADER_SIZE: usize = 13;
/// Match packets between refills of the distance price tables.
const MATCH_PRICE_REFILL: u32 = 1 << 7;

/// Streaming LZMA encoder.
#[derive(Debug)]
pub struct Encoder<R: Read, W: Write> {
    rc: RangeEncoder<W>,
    mf: BinTree<R>,
    opts: EncoderOptions,
    write_end_mark: bool,

    state: State,
    prev_byte: u8,
    rep_distances: [u32; NUM_REP_DISTANCES],

    optimum: Vec<Optimal>,
    is_match: Vec<u16>,
    is_rep: Vec<u16>,
    is_rep_g0: Vec<u16>,
    is_rep_g1: Vec<u16>,
    is_rep_g2: Vec<u16>,
    is_rep0_long: Vec<u16>,
    pos_slot_coders: Vec<BitTree>,
    pos_encoders: Vec<u16>,
    pos_align_coder: BitTree,
    len_coder: LenPriceTableCoder,
    rep_len_coder: LenPriceTableCoder,
    lit_coder: LitCoder,

    match_distances: Vec<i32>,
    num_distance_pairs: usize,
    longest_match_len: u32,
    longest_match_found: bool,
    additional_offset: u32,
    optimum_end_index: u32,
    optimum_current_index: u32,

    pos_slot_prices: Vec<u32>,
    distances_prices: Vec<u32>,
    align_prices: [u32; ALIGN_TABLE_SIZE],
    align_price_count: u32,
    match_price_count: u32,
    dist_table_size: u32,
    pos_state_mask: u32,
    now_pos: u64,
}

impl<R: Read, W: Write> Encoder<R, W> {
    /// Validate the options, write the header, and set up the models.
    ///
    /// `size` is the number of bytes that will be read from `reader`;
    /// -1 declares the size unknown and arms the end-of-stream marker.
    pub fn new(reader: R, mut writer: W, size: i64, opts: EncoderOptions) -> Result<Self> {
        opts.validate()?;
        if size < -1 {
            return Err(LzmaError::invalid_option(format!("illegal size: {size}")));
        }
        log::debug!(
            "lzma encoder: dict_bits={} fast_bytes={} lc={} lp={} pb={} size={}",
            opts.dict_bits,
            opts.fast_bytes,
            opts.lc,
            opts.lp,
            opts.pb,
            size
        );

        let mut header = [0u8; HEADER_SIZE];
        header[0] = ((opts.pb * 5 + opts.lp) * 9 + opts.lc) as u8;
        header[1..5].copy_from_slice(&opts.dict_size().to_le_bytes());
        header[5..13].copy_from_slice(&(size as u64).to_le_bytes());
        writer.write_all(&header)?;

        let mf = BinTree::new(
            reader,
            opts.dict_size() as i32,
            NUM_OPTS as i32,
            opts.fast_bytes as i32,
            (MATCH_MAX_LEN + 1) as i32,
            opts.match_finder,
        )?;

        let num_pos_states = 1usize << opts.pb;
        let table_size = opts.fast_bytes + 1 - MATCH_MIN_LEN;

        let mut enc = Self {
            rc: RangeEncoder::new(writer),
            mf,
            opts,
            write_end_mark: size == -1,
            state: State::new(),
            prev_byte: 0,
            rep_distances: [0; NUM_REP_DISTANCES],
            optimum: vec![Optimal::default(); NUM_OPTS],
            is_match: new_bit_models(NUM_STATES << NUM_POS_STATES_BITS_MAX),
            is_rep: new_bit_models(NUM_STATES),
            is_rep_g0: new_bit_models(NUM_STATES),
            is_rep_g1: new_bit_models(NUM_STATES),
            is_rep_g2: new_bit_models(NUM_STATES),
            is_rep0_long: new_bit_models(NUM_STATES << NUM_POS_STATES_BITS_MAX),
            pos_slot_coders: (0..NUM_LEN_TO_POS_STATES)
                .map(|_| BitTree::new(NUM_POS_SLOT_BITS))
                .collect(),
            pos_encoders: new_bit_models((NUM_FULL_DISTANCES - END_POS_MODEL_INDEX) as usize),
            pos_align_coder: BitTree::new(NUM_ALIGN_BITS),
            len_coder: LenPriceTableCoder::new(table_size, num_pos_states),
            rep_len_coder: LenPriceTableCoder::new(table_size, num_pos_states),
            lit_coder: LitCoder::new(opts.lp, opts.lc),
            match_distances: vec![0i32; (MATCH_MAX_LEN * 2 + 2) as usize],
            num_distance_pairs: 0,
            longest_match_len: 0,
            longest_match_found: false,
            additional_offset: 0,
            optimum_end_index: 0,
            optimum_current_index: 0,
            pos_slot_prices: vec![0u32; 1usize << (NUM_POS_SLOT_BITS + 2)],
            distances_prices: vec![0u32; (NUM_FULL_DISTANCES as usize) * NUM_LEN_TO_POS_STATES],
            align_prices: [0; ALIGN_TABLE_SIZE],
            align_price_count: 0,
            match_price_count: 0,
            dist_table_size: opts.dict_bits * 2,
            pos_state_mask: (1 << opts.pb) - 1,
            now_pos: 0,
        };
        enc.fill_distances_prices();
        enc.fill_align_prices();
        Ok(enc)
    }

    /// Encode the whole input stream and flush the range coder.
    pub fn run(&mut self) -> Result<()> {
        if self.now_pos == 0 {
            if self.mf.available() == 0 {
                return self.finish();
            }
            // The first byte has no history to match against; emit it as a
            // plain literal so the parser always sees at least one byte of
            // context.
            self.read_match_distances()?;
            let pos_state = (self.now_pos as u32) & self.pos_state_mask;
            let complex = (self.state.index() << NUM_POS_STATES_BITS_MAX) + pos_state as usize;
            self.rc.encode(&mut self.is_match, complex, 0)?;
            let cur_byte = self.mf.index_byte(-(self.additional_offset as i32));
            self.lit_coder
                .sub_coder(self.now_pos as u32, self.prev_byte)
                .encode(&mut self.rc, cur_byte)?;
            self.prev_byte = cur_byte;
            self.additional_offset -= 1;
            self.state.update_char();
            self.now_pos += 1;
        }
        if self.mf.available() == 0 {
            return self.finish();
        }
        loop {
            let (len, pos) = self.get_optimum(self.now_pos as u32)?;
            let pos_state = (self.now_pos as u32) & self.pos_state_mask;
            let complex = (self.state.index() << NUM_POS_STATES_BITS_MAX) + pos_state as usize;

            if len == 1 && pos == Optimal::LITERAL {
                self.rc.encode(&mut self.is_match, complex, 0)?;
                let cur_byte = self.mf.index_byte(-(self.additional_offset as i32));
                if self.state.is_char() {
                    self.lit_coder
                        .sub_coder(self.now_pos as u32, self.prev_byte)
                        .encode(&mut self.rc, cur_byte)?;
                } else {
                    let match_byte = self.mf.index_byte(
                        -(self.rep_distances[0] as i32) - 1 - self.additional_offset as i32,
                    );
                    self.lit_coder
                        .sub_coder(self.now_pos as u32, self.prev_byte)
                        .encode_matched(&mut self.rc, match_byte, cur_byte)?;
                }
                self.prev_byte = cur_byte;
                self.state.update_char();
            } else {
                self.rc.encode(&mut self.is_match, complex, 1)?;
                if (pos as usize) < NUM_REP_DISTANCES {
                    self.rc.encode(&mut self.is_rep, self.state.index(), 1)?;
                    if pos == 0 {
                        self.rc.encode(&mut self.is_rep_g0, self.state.index(), 0)?;
                        let bit = u32::from(len != 1);
                        self.rc.encode(&mut self.is_rep0_long, complex, bit)?;
                    } else {
                        self.rc.encode(&mut self.is_rep_g0, self.state.index(), 1)?;
                        if pos == 1 {
                            self.rc.encode(&mut self.is_rep_g1, self.state.index(), 0)?;
                        } else {
                            self.rc.encode(&mut self.is_rep_g1, self.state.index(), 1)?;
                            self.rc
                                .encode(&mut self.is_rep_g2, self.state.index(), pos - 2)?;
                        }
                    }
                    if len == 1 {
                        self.state.update_short_rep();
                    } else {
                        self.rep_len_coder.encode(
                            &mut self.rc,
                            len - MATCH_MIN_LEN,
                            pos_state as usize,
                        )?;
                        self.state.update_rep();
                    }
                    let distance = self.rep_distances[pos as usize];
                    if pos != 0 {
                        for i in (1..=pos as usize).rev() {
                            self.rep_distances[i] = self.rep_distances[i - 1];
                        }
                        self.rep_distances[0] = distance;
                    }
                } else {
                    self.rc.encode(&mut self.is_rep, self.state.index(), 0)?;
                    self.state.update_match();
                    self.len_coder
                        .encode(&mut self.rc, len - MATCH_MIN_LEN, pos_state as usize)?;
                    let pos = pos - NUM_REP_DISTANCES as u32;
                    let slot = pos_slot(pos);
                    self.pos_slot_coders[len_to_pos_state(len)].encode(&mut self.rc, slot)?;
                    if slot >= START_POS_MODEL_INDEX {
                        let footer_bits = (slot >> 1) - 1;
                        let base_val = (2 | (slot & 1)) << footer_bits;
                        let pos_reduced = pos - base_val;
                        if slot < END_POS_MODEL_INDEX {
                            reverse_encode_index(
                                &mut self.rc,
                                &mut self.pos_encoders,
                                base_val as i32 - slot as i32 - 1,
                                footer_bits,
                                pos_reduced,
                            )?;
                        } else {
                            self.rc.encode_direct_bits(
                                pos_reduced >> NUM_ALIGN_BITS,
                                footer_bits - NUM_ALIGN_BITS,
                            )?;
                            self.pos_align_coder
                                .reverse_encode(&mut self.rc, pos_reduced & ALIGN_MASK)?;
                            self.align_price_count += 1;
                        }
                    }
                    for i in (1..NUM_REP_DISTANCES).rev() {
                        self.rep_distances[i] = self.rep_distances[i - 1];
                    }
                    self.rep_distances[0] = pos;
                    self.match_price_count += 1;
                }
                self.prev_byte = self
                    .mf
                    .index_byte(len as i32 - 1 - self.additional_offset as i32);
            }

            self.additional_offset -= len;
            self.now_pos += u64::from(len);
            if self.additional_offset == 0 {
                if self.match_price_count >= MATCH_PRICE_REFILL {
                    self.fill_distances_prices();
                }
                if self.align_price_count >= ALIGN_TABLE_SIZE as u32 {
                    self.fill_align_prices();
                }
                if self.mf.available() == 0 {
                    return self.finish();
                }
            }
        }
    }

    /// Write the end marker if armed, then flush the range coder.
    fn finish(&mut self) -> Result<()> {
        self.write_end_marker()?;
        self.rc.flush()?;
        log::debug!("lzma encoder finished, {} payload bytes", self.rc.processed_size());
        Ok(())
    }

    /// End marker: a match with the all-ones distance.
    fn write_end_marker(&mut self) -> Result<()> {
        if !self.write_end_mark {
            return Ok(());
        }
        let pos_state = (self.now_pos as u32) & self.pos_state_mask;
        let complex = (self.state.index() << NUM_POS_STATES_BITS_MAX) + pos_state as usize;
        self.rc.encode(&mut self.is_match, complex, 1)?;
        self.rc.encode(&mut self.is_rep, self.state.index(), 0)?;
        self.state.update_match();
        let len = MATCH_MIN_LEN;
        self.len_coder
            .encode(&mut self.rc, len - MATCH_MIN_LEN, pos_state as usize)?;
        let slot = (1 << NUM_POS_SLOT_BITS) - 1;
        self.pos_slot_coders[len_to_pos_state(len)].encode(&mut self.rc, slot)?;
        let footer_bits = 30;
        let pos_reduced = (1u32 << footer_bits) - 1;
        self.rc
            .encode_direct_bits(pos_reduced >> NUM_ALIGN_BITS, footer_bits - NUM_ALIGN_BITS)?;
        self.pos_align_coder
            .reverse_encode(&mut self.rc, pos_reduced & ALIGN_MASK)?;
        Ok(())
    }

    fn read_match_distances(&mut self) -> Result<u32> {
        let mut len_res = 0u32;
        self.num_distance_pairs = self.mf.get_matches(&mut self.match_distances)?;
        if self.num_distance_pairs > 0 {
            len_res = self.match_distances[self.num_distance_pairs - 2] as u32;
            if len_res == self.opts.fast_bytes {
                len_res += self.mf.match_len(
                    len_res as i32 - 1,
                    self.match_distances[self.num_distance_pairs - 1],
                    (MATCH_MAX_LEN - len_res) as i32,
                ) as u32;
            }
        }
        self.additional_offset += 1;
        Ok(len_res)
    }

    fn move_pos(&mut self, num: u32) -> Result<()> {
        if num > 0 {
            self.mf.skip(num as i32)?;
            self.additional_offset += num;
        }
        Ok(())
    }

    #[inline]
    fn is_match_price(&self, state: State, pos_state: u32, bit: u32) -> u32 {
        let index = (state.index() << NUM_POS_STATES_BITS_MAX) + pos_state as usize;
        get_price(u32::from(self.is_match[index]), bit)
    }

    fn rep_len1_price(&self, state: State, pos_state: u32) -> u32 {
        let complex = (state.index() << NUM_POS_STATES_BITS_MAX) + pos_state as usize;
        get_price0(u32::from(self.is_rep_g0[state.index()]))
            + get_price0(u32::from(self.is_rep0_long[complex]))
    }

    fn pure_rep_price(&self, rep_index: u32, state: State, pos_state: u32) -> u32 {
        let complex = (state.index() << NUM_POS_STATES_BITS_MAX) + pos_state as usize;
        if rep_index == 0 {
            get_price0(u32::from(self.is_rep_g0[state.index()]))
                + get_price1(u32::from(self.is_rep0_long[complex]))
        } else {
            let mut price = get_price1(u32::from(self.is_rep_g0[state.index()]));
            if rep_index == 1 {
                price + get_price0(u32::from(self.is_rep_g1[state.index()]))
            } else {
                price += get_price1(u32::from(self.is_rep_g1[state.index()]));
                price + get_price(u32::from(self.is_rep_g2[state.index()]), rep_index - 2)
            }
        }
    }

    fn rep_price(&self, rep_index: u32, len: u32, state: State, pos_state: u32) -> u32 {
        self.rep_len_coder.price(len - MATCH_MIN_LEN, pos_state as usize)
            + self.pure_rep_price(rep_index, state, pos_state)
    }

    fn pos_len_price(&self, pos: u32, len: u32, pos_state: u32) -> u32 {
        let lps = len_to_pos_state(len);
        let price = if pos < NUM_FULL_DISTANCES {
            self.distances_prices[lps * NUM_FULL_DISTANCES as usize + pos as usize]
        } else {
            self.pos_slot_prices[(lps << NUM_POS_SLOT_BITS) + pos_slot2(pos) as usize]
                + self.align_prices[(pos & ALIGN_MASK) as usize]
        };
        price + self.len_coder.price(len - MATCH_MIN_LEN, pos_state as usize)
    }

    fn fill_distances_prices(&mut self) {
        let mut temp_prices = [0u32; NUM_FULL_DISTANCES as usize];
        for i in START_POS_MODEL_INDEX..NUM_FULL_DISTANCES {
            let slot = pos_slot(i);
            let footer_bits = (slot >> 1) - 1;
            let base_val = (2 | (slot & 1)) << footer_bits;
            temp_prices[i as usize] = reverse_price_index(
                &self.pos_encoders,
                base_val as i32 - slot as i32 - 1,
                footer_bits,
                i - base_val,
            );
        }
        for lps in 0..NUM_LEN_TO_POS_STATES {
            let st = lps << NUM_POS_SLOT_BITS;
            for slot in 0..self.dist_table_size {
                self.pos_slot_prices[st + slot as usize] =
                    self.pos_slot_coders[lps].price(slot);
            }
            for slot in END_POS_MODEL_INDEX..self.dist_table_size {
                self.pos_slot_prices[st + slot as usize] +=
                    ((slot >> 1) - 1 - NUM_ALIGN_BITS) << NUM_BIT_PRICE_SHIFT_BITS;
            }
            let st2 = lps * NUM_FULL_DISTANCES as usize;
            for i in 0..START_POS_MODEL_INDEX {
                self.distances_prices[st2 + i as usize] = self.pos_slot_prices[st + i as usize];
            }
            for i in START_POS_MODEL_INDEX..NUM_FULL_DISTANCES {
                self.distances_prices[st2 + i as usize] =
                    self.pos_slot_prices[st + pos_slot(i) as usize] + temp_prices[i as usize];
            }
        }
        self.match_price_count = 0;
    }

    fn fill_align_prices(&mut self) {
        for i in 0..ALIGN_TABLE_SIZE {
            self.align_prices[i] = self.pos_align_coder.reverse_price(i as u32);
        }
        self.align_price_count = 0;
    }

    /// Pick the next packet: returns `(length, back_code)` where the back
    /// code is a rep index, a distance plus [`NUM_REP_DISTANCES`], or
    /// [`Optimal::LITERAL`].
    fn get_optimum(&mut self, mut position: u32) -> Result<(u32, u32)> {
        if self.optimum_end_index != self.optimum_current_index {
            let cur = self.optimum_current_index as usize;
            let len_res = self.optimum[cur].pos_prev - self.optimum_current_index;
            let back_res = self.optimum[cur].back_prev;
            self.optimum_current_index = self.optimum[cur].pos_prev;
            return Ok((len_res, back_res));
        }
        self.optimum_current_index = 0;
        self.optimum_end_index = 0;

        let len_main = if self.longest_match_found {
            self.longest_match_found = false;
            self.longest_match_len
        } else {
            self.read_match_distances()?
        };
        let mut num_distance_pairs = self.num_distance_pairs;

        if self.mf.available() == 0 {
            return Ok((1, Optimal::LITERAL));
        }

        let mut reps = [0u32; NUM_REP_DISTANCES];
        let mut rep_lens = [0u32; NUM_REP_DISTANCES];
        let mut rep_max_index = 0usize;
        for i in 0..NUM_REP_DISTANCES {
            reps[i] = self.rep_distances[i];
            rep_lens[i] = self.mf.match_len(-1, reps[i] as i32, MATCH_MAX_LEN as i32) as u32;
            if rep_lens[i] > rep_lens[rep_max_index] {
                rep_max_index = i;
            }
        }
        if rep_lens[rep_max_index] >= self.opts.fast_bytes {
            let len_res = rep_lens[rep_max_index];
            self.move_pos(len_res - 1)?;
            return Ok((len_res, rep_max_index as u32));
        }
        if len_main >= self.opts.fast_bytes {
            let back_res =
                self.match_distances[num_distance_pairs - 1] as u32 + NUM_REP_DISTANCES as u32;
            self.move_pos(len_main - 1)?;
            return Ok((len_main, back_res));
        }

        let mut current_byte = self.mf.index_byte(-1);
        let mut match_byte = self.mf.index_byte(-(self.rep_distances[0] as i32) - 1 - 1);

        if len_main < 2 && current_byte != match_byte && rep_lens[rep_max_index] < 2 {
            return Ok((1, Optimal::LITERAL));
        }

        self.optimum[0].state = self.state;
        let mut pos_state = position & self.pos_state_mask;

        self.optimum[1].price = self.is_match_price(self.state, pos_state, 0)
            + self
                .lit_coder
                .sub_coder_ref(position, self.prev_byte)
                .price(!self.state.is_char(), match_byte, current_byte);
        self.optimum[1].make_as_char();

        let mut match_price = self.is_match_price(self.state, pos_state, 1);
        let mut rep_match_price = match_price + get_price1(u32::from(self.is_rep[self.state.index()]));

        if match_byte == current_byte {
            let short_rep_price = rep_match_price + self.rep_len1_price(self.state, pos_state);
            if short_rep_price < self.optimum[1].price {
                self.optimum[1].price = short_rep_price;
                self.optimum[1].make_as_short_rep();
            }
        }

        let mut len_end = len_main.max(rep_lens[rep_max_index]);
        if len_end < 2 {
            return Ok((1, self.optimum[1].back_prev));
        }
        self.optimum[1].pos_prev = 0;
        self.optimum[0].backs = reps;

        let mut len = len_end;
        loop {
            self.optimum[len as usize].price = INFINITY_PRICE;
            if len == 2 {
                break;
            }
            len -= 1;
        }

        for i in 0..NUM_REP_DISTANCES {
            let mut rep_len = rep_lens[i];
            if rep_len < 2 {
                continue;
            }
            let price = rep_match_price + self.pure_rep_price(i as u32, self.state, pos_state);
            loop {
                let cur_and_len_price =
                    price + self.rep_len_coder.price(rep_len - 2, pos_state as usize);
                let o = &mut self.optimum[rep_len as usize];
                if cur_and_len_price < o.price {
                    o.price = cur_and_len_price;
                    o.pos_prev = 0;
                    o.back_prev = i as u32;
                    o.prev1_is_char = false;
                }
                rep_len -= 1;
                if rep_len < 2 {
                    break;
                }
            }
        }

        let mut normal_match_price =
            match_price + get_price0(u32::from(self.is_rep[self.state.index()]));
        let mut len = if rep_lens[0] >= 2 { rep_lens[0] + 1 } else { 2 };
        if len <= len_main {
            let mut offs = 0usize;
            while len > self.match_distances[offs] as u32 {
                offs += 2;
            }
            loop {
                let distance = self.match_distances[offs + 1] as u32;
                let cur_and_len_price =
                    normal_match_price + self.pos_len_price(distance, len, pos_state);
                let o = &mut self.optimum[len as usize];
                if cur_and_len_price < o.price {
                    o.price = cur_and_len_price;
                    o.pos_prev = 0;
                    o.back_prev = distance + NUM_REP_DISTANCES as u32;
                    o.prev1_is_char = false;
                }
                if len == self.match_distances[offs] as u32 {
                    if len == len_main {
                        break;
                    }
                    offs += 2;
                }
                len += 1;
            }
        }

        let mut cur = 0u32;
        loop {
            cur += 1;
            if cur == len_end {
                return Ok(self.backward(cur));
            }
            let mut new_len = self.read_match_distances()?;
            num_distance_pairs = self.num_distance_pairs;
            if new_len >= self.opts.fast_bytes {
                self.longest_match_len = new_len;
                self.longest_match_found = true;
                return Ok(self.backward(cur));
            }
            position += 1;

            // Reconstruct the state and rep set implied by the back-pointer
            // chain that reaches this slot.
            let mut pos_prev = self.optimum[cur as usize].pos_prev;
            let mut state;
            if self.optimum[cur as usize].prev1_is_char {
                pos_prev -= 1;
                if self.optimum[cur as usize].prev2 {
                    state = self.optimum[self.optimum[cur as usize].pos_prev2 as usize].state;
                    if self.optimum[cur as usize].back_prev2 < NUM_REP_DISTANCES as u32 {
                        state.update_rep();
                    } else {
                        state.update_match();
                    }
                } else {
                    state = self.optimum[pos_prev as usize].state;
                }
                state.update_char();
            } else {
                state = self.optimum[pos_prev as usize].state;
            }
            if pos_prev == cur - 1 {
                if self.optimum[cur as usize].is_short_rep() {
                    state.update_short_rep();
                } else {
                    state.update_char();
                }
            } else {
                let back;
                if self.optimum[cur as usize].prev1_is_char && self.optimum[cur as usize].prev2 {
                    pos_prev = self.optimum[cur as usize].pos_prev2;
                    back = self.optimum[cur as usize].back_prev2;
                    state.update_rep();
                } else {
                    back = self.optimum[cur as usize].back_prev;
                    if back < NUM_REP_DISTANCES as u32 {
                        state.update_rep();
                    } else {
                        state.update_match();
                    }
                }
                let opt = self.optimum[pos_prev as usize];
                if back < NUM_REP_DISTANCES as u32 {
                    reps = match back {
                        0 => [opt.backs[0], opt.backs[1], opt.backs[2], opt.backs[3]],
                        1 => [opt.backs[1], opt.backs[0], opt.backs[2], opt.backs[3]],
                        2 => [opt.backs[2], opt.backs[0], opt.backs[1], opt.backs[3]],
                        _ => [opt.backs[3], opt.backs[0], opt.backs[1], opt.backs[2]],
                    };
                } else {
                    reps = [
                        back - NUM_REP_DISTANCES as u32,
                        opt.backs[0],
                        opt.backs[1],
                        opt.backs[2],
                    ];
                }
            }
            self.optimum[cur as usize].state = state;
            self.optimum[cur as usize].backs = reps;

            let cur_price = self.optimum[cur as usize].price;
            current_byte = self.mf.index_byte(-1);
            match_byte = self.mf.index_byte(-(reps[0] as i32) - 1 - 1);
            pos_state = position & self.pos_state_mask;

            let cur_and_1_price = cur_price
                + self.is_match_price(state, pos_state, 0)
                + self
                    .lit_coder
                    .sub_coder_ref(position, self.mf.index_byte(-2))
                    .price(!state.is_char(), match_byte, current_byte);

            let mut next_is_char = false;
            {
                let next = &mut self.optimum[(cur + 1) as usize];
                if cur_and_1_price < next.price {
                    next.price = cur_and_1_price;
                    next.pos_prev = cur;
                    next.make_as_char();
                    next_is_char = true;
                }
            }

            match_price = cur_price + self.is_match_price(state, pos_state, 1);
            rep_match_price = match_price + get_price1(u32::from(self.is_rep[state.index()]));

            if match_byte == current_byte
                && !(self.optimum[(cur + 1) as usize].pos_prev < cur
                    && self.optimum[(cur + 1) as usize].back_prev == 0)
            {
                let short_rep_price = rep_match_price + self.rep_len1_price(state, pos_state);
                let next = &mut self.optimum[(cur + 1) as usize];
                if short_rep_price <= next.price {
                    next.price = short_rep_price;
                    next.pos_prev = cur;
                    next.make_as_short_rep();
                    next_is_char = true;
                }
            }

            let num_available_full =
                (self.mf.available() as u32 + 1).min(NUM_OPTS as u32 - 1 - cur);
            let mut num_available = num_available_full;
            if num_available < 2 {
                continue;
            }
            if num_available > self.opts.fast_bytes {
                num_available = self.opts.fast_bytes;
            }

            // Literal, then rep0: worth trying when the literal is forced.
            if !next_is_char && match_byte != current_byte {
                let t = (num_available_full - 1).min(self.opts.fast_bytes);
                let len_test2 = self.mf.match_len(0, reps[0] as i32, t as i32) as u32;
                if len_test2 >= 2 {
                    let mut state2 = state;
                    state2.update_char();
                    let pos_state_next = (position + 1) & self.pos_state_mask;
                    let next_rep_match_price = cur_and_1_price
                        + self.is_match_price(state2, pos_state_next, 1)
                        + get_price1(u32::from(self.is_rep[state2.index()]));
                    let offset = cur + 1 + len_test2;
                    while len_end < offset {
                        len_end += 1;
                        self.optimum[len_end as usize].price = INFINITY_PRICE;
                    }
                    let cur_and_len_price = next_rep_match_price
                        + self.rep_price(0, len_test2, state2, pos_state_next);
                    let o = &mut self.optimum[offset as usize];
                    if cur_and_len_price < o.price {
                        o.price = cur_and_len_price;
                        o.pos_prev = cur + 1;
                        o.back_prev = 0;
                        o.prev1_is_char = true;
                        o.prev2 = false;
                    }
                }
            }

            let mut start_len = 2u32;
            for rep_index in 0..NUM_REP_DISTANCES as u32 {
                let len_test_full =
                    self.mf.match_len(-1, reps[rep_index as usize] as i32, num_available as i32)
                        as u32;
                if len_test_full < 2 {
                    continue;
                }
                let mut len_test = len_test_full;
                loop {
                    while len_end < cur + len_test {
                        len_end += 1;
                        self.optimum[len_end as usize].price = INFINITY_PRICE;
                    }
                    let cur_and_len_price =
                        rep_match_price + self.rep_price(rep_index, len_test, state, pos_state);
                    let o = &mut self.optimum[(cur + len_test) as usize];
                    if cur_and_len_price < o.price {
                        o.price = cur_and_len_price;
                        o.pos_prev = cur;
                        o.back_prev = rep_index;
                        o.prev1_is_char = false;
                    }
                    len_test -= 1;
                    if len_test < 2 {
                        break;
                    }
                }
                let len_test = len_test_full;
                if rep_index == 0 {
                    start_len = len_test + 1;
                }

                // Rep, literal, rep0 macro ending two steps later.
                if len_test < num_available_full {
                    let t = (num_available_full - 1 - len_test).min(self.opts.fast_bytes);
                    let len_test2 = self
                        .mf
                        .match_len(len_test as i32, reps[rep_index as usize] as i32, t as i32)
                        as u32;
                    if len_test2 >= 2 {
                        let mut state2 = state;
                        state2.update_rep();
                        let pos_state_next = (position + len_test) & self.pos_state_mask;
                        let cur_and_len_char_price = rep_match_price
                            + self.rep_price(rep_index, len_test, state, pos_state)
                            + self.is_match_price(state2, pos_state_next, 0)
                            + self
                                .lit_coder
                                .sub_coder_ref(
                                    position + len_test,
                                    self.mf.index_byte(len_test as i32 - 1 - 1),
                                )
                                .price(
                                    true,
                                    self.mf.index_byte(
                                        len_test as i32
                                            - 1
                                            - (reps[rep_index as usize] as i32 + 1),
                                    ),
                                    self.mf.index_byte(len_test as i32 - 1),
                                );
                        state2.update_char();
                        let pos_state_next = (position + len_test + 1) & self.pos_state_mask;
                        let next_rep_match_price = cur_and_len_char_price
                            + self.is_match_price(state2, pos_state_next, 1)
                            + get_price1(u32::from(self.is_rep[state2.index()]));
                        let offset = len_test + 1 + len_test2;
                        while len_end < cur + offset {
                            len_end += 1;
                            self.optimum[len_end as usize].price = INFINITY_PRICE;
                        }
                        let cur_and_len_price = next_rep_match_price
                            + self.rep_price(0, len_test2, state2, pos_state_next);
                        let o = &mut self.optimum[(cur + offset) as usize];
                        if cur_and_len_price < o.price {
                            o.price = cur_and_len_price;
                            o.pos_prev = cur + len_test + 1;
                            o.back_prev = 0;
                            o.prev1_is_char = true;
                            o.prev2 = true;
                            o.pos_prev2 = cur;
                            o.back_prev2 = rep_index;
                        }
                    }
                }
            }

            if new_len > num_available {
                new_len = num_available;
                num_distance_pairs = 0;
                while new_len > self.match_distances[num_distance_pairs] as u32 {
                    num_distance_pairs += 2;
                }
                self.match_distances[num_distance_pairs] = new_len as i32;
                num_distance_pairs += 2;
            }
            if new_len >= start_len {
                normal_match_price =
                    match_price + get_price0(u32::from(self.is_rep[state.index()]));
                while len_end < cur + new_len {
                    len_end += 1;
                    self.optimum[len_end as usize].price = INFINITY_PRICE;
                }
                let mut offs = 0usize;
                while start_len > self.match_distances[offs] as u32 {
                    offs += 2;
                }
                let mut len_test = start_len;
                loop {
                    let cur_back = self.match_distances[offs + 1] as u32;
                    let cur_and_len_price =
                        normal_match_price + self.pos_len_price(cur_back, len_test, pos_state);
                    {
                        let o = &mut self.optimum[(cur + len_test) as usize];
                        if cur_and_len_price < o.price {
                            o.price = cur_and_len_price;
                            o.pos_prev = cur;
                            o.back_prev = cur_back + NUM_REP_DISTANCES as u32;
                            o.prev1_is_char = false;
                        }
                    }
                    if len_test == self.match_distances[offs] as u32 {
                        // Match, literal, rep0 macro ending two steps later.
                        if len_test < num_available_full {
                            let t = (num_available_full - 1 - len_test).min(self.opts.fast_bytes);
                            let len_test2 =
                                self.mf.match_len(len_test as i32, cur_back as i32, t as i32) as u32;
                            if len_test2 >= 2 {
                                let mut state2 = state;
                                state2.update_match();
                                let pos_state_next = (position + len_test) & self.pos_state_mask;
                                let cur_and_len_char_price = cur_and_len_price
                                    + self.is_match_price(state2, pos_state_next, 0)
                                    + self
                                        .lit_coder
                                        .sub_coder_ref(
                                            position + len_test,
                                            self.mf.index_byte(len_test as i32 - 1 - 1),
                                        )
                                        .price(
                                            true,
                                            self.mf.index_byte(
                                                len_test as i32 - (cur_back as i32 + 1) - 1,
                                            ),
                                            self.mf.index_byte(len_test as i32 - 1),
                                        );
                                state2.update_char();
                                let pos_state_next =
                                    (position + len_test + 1) & self.pos_state_mask;
                                let next_rep_match_price = cur_and_len_char_price
                                    + self.is_match_price(state2, pos_state_next, 1)
                                    + get_price1(u32::from(self.is_rep[state2.index()]));
                                let offset = len_test + 1 + len_test2;
                                while len_end < cur + offset {
                                    len_end += 1;
                                    self.optimum[len_end as usize].price = INFINITY_PRICE;
                                }
                                let cur_and_len_price2 = next_rep_match_price
                                    + self.rep_price(0, len_test2, state2, pos_state_next);
                                let o = &mut self.optimum[(cur + offset) as usize];
                                if cur_and_len_price2 < o.price {
                                    o.price = cur_and_len_price2;
                                    o.pos_prev = cur + len_test + 1;
                                    o.back_prev = 0;
                                    o.prev1_is_char = true;
                                    o.prev2 = true;
                                    o.pos_prev2 = cur;
                                    o.back_prev2 = cur_back + NUM_REP_DISTANCES as u32;
                                }
                            }
                        }
                        offs += 2;
                        if offs == num_distance_pairs {
                            break;
                        }
                    }
                    len_test += 1;
                }
            }
        }
    }

    /// Reverse the back-pointer chain into forward order and hand out the
    /// first committed packet.
    fn backward(&mut self, mut cur: u32) -> (u32, u32) {
        self.optimum_end_index = cur;
        let mut pos_mem = self.optimum[cur as usize].pos_prev;
        let mut back_mem = self.optimum[cur as usize].back_prev;
        loop {
            if self.optimum[cur as usize].prev1_is_char {
                self.optimum[pos_mem as usize].make_as_char();
                self.optimum[pos_mem as usize].pos_prev = pos_mem - 1;
                if self.optimum[cur as usize].prev2 {
                    let pos_prev2 = self.optimum[cur as usize].pos_prev2;
                    let back_prev2 = self.optimum[cur as usize].back_prev2;
                    let o = &mut self.optimum[(pos_mem - 1) as usize];
                    o.prev1_is_char = false;
                    o.pos_prev = pos_prev2;
                    o.back_prev = back_prev2;
                }
            }
            let pos_prev = pos_mem;
            let back_cur = back_mem;
            back_mem = self.optimum[pos_prev as usize].back_prev;
            pos_mem = self.optimum[pos_prev as usize].pos_prev;
            self.optimum[pos_prev as usize].back_prev = back_cur;
            self.optimum[pos_prev as usize].pos_prev = cur;
            cur = pos_prev;
            if cur == 0 {
                break;
            }
        }
        self.optimum_current_index = self.optimum[0].pos_prev;
        (self.optimum_current_index, self.optimum[0].back_prev)
    }
}
