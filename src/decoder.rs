//! LZMA stream decoder.
//!
//! Parses the 13-byte `.lzma` header, then runs the packet loop: each
//! packet is a literal, a short rep, a rep match or a new-distance match,
//! decoded against the adaptive models and materialised through the
//! output window. Decoding stops at the declared uncompressed size, or
//! on the end-of-stream marker when the size is unknown.

use std::io::{ErrorKind, Read, Write};

use crate::error::{LzmaError, Result};
use crate::len_coder::LenCoder;
use crate::lit_coder::LitCoder;
use crate::range_coder::{new_bit_models, RangeDecoder};
use crate::state::{
    len_to_pos_state, State, END_POS_MODEL_INDEX, MATCH_MIN_LEN, NUM_ALIGN_BITS,
    NUM_FULL_DISTANCES, NUM_LEN_TO_POS_STATES, NUM_POS_SLOT_BITS, NUM_POS_STATES_BITS_MAX,
    NUM_STATES, START_POS_MODEL_INDEX,
};
use crate::tree::{reverse_decode_index, BitTree};
use crate::window::OutWindow;

const HEADER_SIZE: usize = 13;
const PROPS_LIMIT: u8 = 9 * 5 * 5;
const MIN_WIN_SIZE: u32 = 1 << 12;

/// Decoded header properties.
#[derive(Debug, Clone, Copy)]
struct Props {
    lc: u32,
    lp: u32,
    pb: u32,
    dict_size: u32,
}

fn decode_props(header: &[u8]) -> Result<Props> {
    let d = header[0];
    if d >= PROPS_LIMIT {
        return Err(LzmaError::invalid_header(format!(
            "property byte out of range: {d}"
        )));
    }
    let lc = u32::from(d % 9);
    let d = u32::from(d) / 9;
    let lp = d % 5;
    let pb = d / 5;
    if lc > 8 || lp > 4 || pb > 4 {
        return Err(LzmaError::invalid_header(format!(
            "illegal lc/lp/pb: {lc}/{lp}/{pb}"
        )));
    }
    let dict_size = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
    Ok(Props {
        lc,
        lp,
        pb,
        dict_size,
    })
}

/// Streaming LZMA decoder.
#[derive(Debug)]
pub struct Decoder<R: Read, W: Write> {
    rd: RangeDecoder<R>,
    out: OutWindow<W>,
    unpack_size: i64,

    is_match: Vec<u16>,
    is_rep: Vec<u16>,
    is_rep_g0: Vec<u16>,
    is_rep_g1: Vec<u16>,
    is_rep_g2: Vec<u16>,
    is_rep0_long: Vec<u16>,
    pos_slot_decoders: Vec<BitTree>,
    pos_decoders: Vec<u16>,
    pos_align_decoder: BitTree,
    len_decoder: LenCoder,
    rep_len_decoder: LenCoder,
    lit_decoder: LitCoder,
    dict_size_check: u32,
    pos_state_mask: u32,
}

impl<R: Read, W: Write> Decoder<R, W> {
    /// Read and validate the 13-byte header, then seed the range decoder.
    pub fn new(mut reader: R, writer: W) -> Result<Self> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                LzmaError::unexpected_eof(HEADER_SIZE)
            } else {
                LzmaError::Io(e)
            }
        })?;
        let props = decode_props(&header)?;
        let unpack_size = i64::from_le_bytes([
            header[5], header[6], header[7], header[8], header[9], header[10], header[11],
            header[12],
        ]);
        log::debug!(
            "lzma header: lc={} lp={} pb={} dict={} size={}",
            props.lc,
            props.lp,
            props.pb,
            props.dict_size,
            unpack_size
        );

        let rd = RangeDecoder::new(reader)?;
        let dict_size_check = props.dict_size.max(1);
        let win_size = dict_size_check.max(MIN_WIN_SIZE);
        let num_pos_states = 1usize << props.pb;

        Ok(Self {
            rd,
            out: OutWindow::new(writer, win_size),
            unpack_size,
            is_match: new_bit_models(NUM_STATES << NUM_POS_STATES_BITS_MAX),
            is_rep: new_bit_models(NUM_STATES),
            is_rep_g0: new_bit_models(NUM_STATES),
            is_rep_g1: new_bit_models(NUM_STATES),
            is_rep_g2: new_bit_models(NUM_STATES),
            is_rep0_long: new_bit_models(NUM_STATES << NUM_POS_STATES_BITS_MAX),
            pos_slot_decoders: (0..NUM_LEN_TO_POS_STATES)
                .map(|_| BitTree::new(NUM_POS_SLOT_BITS))
                .collect(),
            pos_decoders: new_bit_models((NUM_FULL_DISTANCES - END_POS_MODEL_INDEX) as usize),
            pos_align_decoder: BitTree::new(NUM_ALIGN_BITS),
            len_decoder: LenCoder::new(num_pos_states),
            rep_len_decoder: LenCoder::new(num_pos_states),
            lit_decoder: LitCoder::new(props.lp, props.lc),
            dict_size_check,
            pos_state_mask: (1 << props.pb) - 1,
        })
    }

    /// Run the packet loop to completion. Returns the number of bytes
    /// produced.
    pub fn run(&mut self) -> Result<u64> {
        let mut state = State::new();
        let mut rep0 = 0u32;
        let mut rep1 = 0u32;
        let mut rep2 = 0u32;
        let mut rep3 = 0u32;
        let mut now_pos = 0i64;
        let mut prev_byte = 0u8;

        while self.unpack_size < 0 || now_pos < self.unpack_size {
            let pos_state = (now_pos as u32) & self.pos_state_mask;
            let complex = (state.index() << NUM_POS_STATES_BITS_MAX) + pos_state as usize;

            if self.rd.decode_bit(&mut self.is_match, complex)? == 0 {
                prev_byte = if state.is_char() {
                    self.lit_decoder
                        .sub_coder(now_pos as u32, prev_byte)
                        .decode_normal(&mut self.rd)?
                } else {
                    let match_byte = self.out.get_byte(rep0);
                    self.lit_decoder
                        .sub_coder(now_pos as u32, prev_byte)
                        .decode_matched(&mut self.rd, match_byte)?
                };
                self.out.put_byte(prev_byte)?;
                state.update_char();
                now_pos += 1;
                continue;
            }

            let len;
            if self.rd.decode_bit(&mut self.is_rep, state.index())? == 1 {
                // Rep family: reuse one of the four remembered distances.
                let mut rep_len = 0u32;
                if self.rd.decode_bit(&mut self.is_rep_g0, state.index())? == 0 {
                    if self.rd.decode_bit(&mut self.is_rep0_long, complex)? == 0 {
                        state.update_short_rep();
                        rep_len = 1;
                    }
                } else {
                    let distance;
                    if self.rd.decode_bit(&mut self.is_rep_g1, state.index())? == 0 {
                        distance = rep1;
                    } else {
                        if self.rd.decode_bit(&mut self.is_rep_g2, state.index())? == 0 {
                            distance = rep2;
                        } else {
                            distance = rep3;
                            rep3 = rep2;
                        }
                        rep2 = rep1;
                    }
                    rep1 = rep0;
                    rep0 = distance;
                }
                if rep_len == 0 {
                    rep_len =
                        self.rep_len_decoder.decode(&mut self.rd, pos_state as usize)? + MATCH_MIN_LEN;
                    state.update_rep();
                }
                len = rep_len;
            } else {
                rep3 = rep2;
                rep2 = rep1;
                rep1 = rep0;
                len = self.len_decoder.decode(&mut self.rd, pos_state as usize)? + MATCH_MIN_LEN;
                state.update_match();
                let pos_slot =
                    self.pos_slot_decoders[len_to_pos_state(len)].decode(&mut self.rd)?;
                if pos_slot >= START_POS_MODEL_INDEX {
                    let num_direct_bits = (pos_slot >> 1) - 1;
                    rep0 = (2 | (pos_slot & 1)) << num_direct_bits;
                    if pos_slot < END_POS_MODEL_INDEX {
                        let start = rep0 as i32 - pos_slot as i32 - 1;
                        rep0 += reverse_decode_index(
                            &mut self.rd,
                            &mut self.pos_decoders,
                            start,
                            num_direct_bits,
                        )?;
                    } else {
                        rep0 += self
                            .rd
                            .decode_direct_bits(num_direct_bits - NUM_ALIGN_BITS)?
                            << NUM_ALIGN_BITS;
                        rep0 += self.pos_align_decoder.reverse_decode(&mut self.rd)?;
                        if rep0 >= 0x8000_0000 {
                            if rep0 == u32::MAX {
                                // End-of-stream marker.
                                break;
                            }
                            return Err(LzmaError::corrupt(
                                now_pos as u64,
                                "direct-bit distance field overflowed",
                            ));
                        }
                    }
                } else {
                    rep0 = pos_slot;
                }
            }

            if i64::from(rep0) >= now_pos || rep0 >= self.dict_size_check {
                return Err(LzmaError::corrupt(
                    now_pos as u64,
                    format!("match distance {} references unwritten bytes", rep0),
                ));
            }
            if self.unpack_size >= 0 && now_pos + i64::from(len) > self.unpack_size {
                return Err(LzmaError::corrupt(
                    now_pos as u64,
                    "match crosses the declared stream end",
                ));
            }
            self.out.copy_block(rep0, len)?;
            now_pos += i64::from(len);
            prev_byte = self.out.get_byte(0);
        }

        self.out.flush()?;
        Ok(now_pos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_props_decoding_covers_byte_space() {
        for d in 0u8..=255 {
            let header = [d, 0, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
            let props = decode_props(&header);
            if d < PROPS_LIMIT {
                let p = props.unwrap();
                assert_eq!((p.pb * 5 + p.lp) * 9 + p.lc, u32::from(d));
                assert!(p.lc <= 8 && p.lp <= 4 && p.pb <= 4);
            } else {
                assert!(matches!(props, Err(LzmaError::InvalidHeader { .. })));
            }
        }
    }

    #[test]
    fn test_default_props_byte() {
        // lc=3, lp=0, pb=2 encodes to 0x5D.
        let header = [0x5D, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let p = decode_props(&header).unwrap();
        assert_eq!((p.lc, p.lp, p.pb), (3, 0, 2));
    }

    #[test]
    fn test_truncated_header_is_eof() {
        let data = vec![0x5D, 0, 0];
        let err = Decoder::new(Cursor::new(data), Vec::new()).unwrap_err();
        assert!(matches!(err, LzmaError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_missing_range_seed_is_eof() {
        // Valid header but no payload at all.
        let mut data = vec![0x5D, 0, 0, 0x10, 0];
        data.extend_from_slice(&0i64.to_le_bytes());
        let err = Decoder::new(Cursor::new(data), Vec::new()).unwrap_err();
        assert!(matches!(err, LzmaError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_zero_length_stream_decodes_empty() {
        let mut data = vec![0x5D, 0, 0, 0x10, 0];
        data.extend_from_slice(&0i64.to_le_bytes());
        data.extend_from_slice(&[0u8; 5]);
        let mut out = Vec::new();
        let n = Decoder::new(Cursor::new(data), &mut out).unwrap().run().unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }
}
