//! Binary-tree match finder over the input window.
//!
//! For every input position the finder reports candidate matches as
//! `(length, distance)` pairs with strictly increasing lengths, then
//! splices the position into a binary search tree ordered by the
//! lexicographic content of the suffixes. The tree lives in the flat
//! `son` pair-array indexed by cyclic buffer position; `hash` maps 2-,
//! 3- and N-byte prefixes (BT4) or 2-byte prefixes (BT2) to the most
//! recent position that carried them. Link values are absolute stream
//! positions with 0 reserved as "empty"; when positions approach the
//! `i32` normalization ceiling, a common offset is subtracted from every
//! link and the window counters.

use std::io::Read;

use crate::config::MatchFinderKind;
use crate::error::Result;
use crate::window::InWindow;

const HASH2_SIZE: i32 = 1 << 10;
const HASH3_SIZE: i32 = 1 << 16;
const BT2_HASH_SIZE: i32 = 1 << 16;
const START_MAX_LEN: i32 = 1;
const HASH3_OFFSET: i32 = HASH2_SIZE;
const EMPTY_HASH: i32 = 0;
const MAX_VAL_FOR_NORMALIZE: i32 = (1 << 30) - 1;

static CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut r = i as u32;
        let mut j = 0;
        while j < 8 {
            if r & 1 != 0 {
                r = (r >> 1) ^ 0xEDB8_8320;
            } else {
                r >>= 1;
            }
            j += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Binary-tree match finder (BT2 or BT4) owning the input window.
#[derive(Debug)]
pub struct BinTree<R: Read> {
    win: InWindow<R>,
    son: Vec<i32>,
    hash: Vec<i32>,
    cyclic_pos: i32,
    cyclic_size: i32,
    match_max_len: i32,
    cut_value: i32,
    hash_mask: i32,
    hash_size_sum: i32,
    num_hash_direct_bytes: i32,
    min_match_check: i32,
    fix_hash_size: i32,
    hash_array: bool,
}

impl<R: Read> BinTree<R> {
    /// Create a finder over `history_size` bytes of dictionary with the
    /// given extra space before and after for the caller's lookahead.
    pub fn new(
        reader: R,
        history_size: i32,
        keep_add_before: i32,
        match_max_len: i32,
        keep_add_after: i32,
        kind: MatchFinderKind,
    ) -> Result<Self> {
        let win_reserve = (history_size + keep_add_before + match_max_len + keep_add_after) / 2 + 256;
        let win = InWindow::new(
            reader,
            history_size + keep_add_before,
            match_max_len + keep_add_after,
            win_reserve,
        )?;

        let hash_array = kind == MatchFinderKind::Bt4;
        let (num_hash_direct_bytes, min_match_check, fix_hash_size) = if hash_array {
            (0, 4, HASH2_SIZE + HASH3_SIZE)
        } else {
            (2, 3, 0)
        };

        let mut hash_mask = 0;
        let mut hs = BT2_HASH_SIZE;
        if hash_array {
            hs = history_size - 1;
            hs |= hs >> 1;
            hs |= hs >> 2;
            hs |= hs >> 4;
            hs |= hs >> 8;
            hs >>= 1;
            hs |= 0xFFFF;
            if hs > 1 << 24 {
                hs >>= 1;
            }
            hash_mask = hs;
            hs += 1;
            hs += fix_hash_size;
        }

        let mut bt = Self {
            win,
            son: vec![EMPTY_HASH; ((history_size + 1) * 2) as usize],
            hash: vec![EMPTY_HASH; hs as usize],
            cyclic_pos: 0,
            cyclic_size: history_size + 1,
            match_max_len,
            cut_value: 16 + (match_max_len >> 1),
            hash_mask,
            hash_size_sum: hs,
            num_hash_direct_bytes,
            min_match_check,
            fix_hash_size,
            hash_array,
        };
        // Shift stream positions up by one so that 0 stays the empty link.
        bt.win.reduce_offsets(-1);
        Ok(bt)
    }

    /// Byte at signed offset `index` from the current position.
    #[inline]
    pub fn index_byte(&self, index: i32) -> u8 {
        self.win.index_byte(index)
    }

    /// Match length against the history at `distance`, capped at `limit`.
    #[inline]
    pub fn match_len(&self, index: i32, distance: i32, limit: i32) -> i32 {
        self.win.match_len(index, distance, limit)
    }

    /// Bytes of lookahead still available.
    #[inline]
    pub fn available(&self) -> i32 {
        self.win.available()
    }

    fn normalize(&mut self) {
        let sub_value = self.win.pos() - self.cyclic_size;
        log::debug!("match finder normalization, subtracting {sub_value}");
        normalize_links(&mut self.son, (self.cyclic_size * 2) as usize, sub_value);
        let hash_len = self.hash_size_sum as usize;
        normalize_links(&mut self.hash, hash_len, sub_value);
        self.win.reduce_offsets(sub_value);
    }

    fn move_pos(&mut self) -> Result<()> {
        self.cyclic_pos += 1;
        if self.cyclic_pos >= self.cyclic_size {
            self.cyclic_pos = 0;
        }
        self.win.move_pos()?;
        if self.win.pos() == MAX_VAL_FOR_NORMALIZE {
            self.normalize();
        }
        Ok(())
    }

    fn hash_values(&self) -> (i32, i32, i32) {
        let buf = self.win.buffer();
        let cur = self.win.cursor() as usize;
        if self.hash_array {
            let mut temp = CRC_TABLE[buf[cur] as usize] ^ u32::from(buf[cur + 1]);
            let hash2 = (temp & (HASH2_SIZE as u32 - 1)) as i32;
            temp ^= u32::from(buf[cur + 2]) << 8;
            let hash3 = (temp & (HASH3_SIZE as u32 - 1)) as i32;
            let hash = ((temp ^ (CRC_TABLE[buf[cur + 3] as usize] << 5)) & self.hash_mask as u32) as i32;
            (hash2, hash3, hash)
        } else {
            let hash = (u32::from(buf[cur]) ^ (u32::from(buf[cur + 1]) << 8)) as i32;
            (0, 0, hash)
        }
    }

    /// Collect matches at the current position into `distances` as
    /// `(length, distance)` pairs, then advance. Returns the number of
    /// `i32` slots filled (twice the number of pairs).
    pub fn get_matches(&mut self, distances: &mut [i32]) -> Result<usize> {
        let len_limit;
        if self.win.pos() + self.match_max_len <= self.win.stream_pos() {
            len_limit = self.match_max_len;
        } else {
            len_limit = self.win.stream_pos() - self.win.pos();
            if len_limit < self.min_match_check {
                self.move_pos()?;
                return Ok(0);
            }
        }

        let mut offset = 0usize;
        let match_min_pos = if self.win.pos() > self.cyclic_size {
            self.win.pos() - self.cyclic_size
        } else {
            0
        };
        let cur = self.win.cursor();
        let mut max_len = START_MAX_LEN;

        let (hash2, hash3, hash_value) = self.hash_values();
        let mut cur_match = self.hash[(self.fix_hash_size + hash_value) as usize];
        if self.hash_array {
            let mut cur_match2 = self.hash[hash2 as usize];
            let cur_match3 = self.hash[(HASH3_OFFSET + hash3) as usize];
            self.hash[hash2 as usize] = self.win.pos();
            self.hash[(HASH3_OFFSET + hash3) as usize] = self.win.pos();
            let buf = self.win.buffer();
            let buf_offset = self.win.buf_offset();
            if cur_match2 > match_min_pos
                && buf[(buf_offset + cur_match2) as usize] == buf[cur as usize]
            {
                max_len = 2;
                distances[offset] = max_len;
                distances[offset + 1] = self.win.pos() - cur_match2 - 1;
                offset += 2;
            }
            if cur_match3 > match_min_pos
                && buf[(buf_offset + cur_match3) as usize] == buf[cur as usize]
            {
                if cur_match3 == cur_match2 {
                    offset -= 2;
                }
                max_len = 3;
                distances[offset] = max_len;
                distances[offset + 1] = self.win.pos() - cur_match3 - 1;
                offset += 2;
                cur_match2 = cur_match3;
            }
            if offset != 0 && cur_match2 == cur_match {
                offset -= 2;
                max_len = START_MAX_LEN;
            }
        }

        self.hash[(self.fix_hash_size + hash_value) as usize] = self.win.pos();

        if self.num_hash_direct_bytes != 0 && cur_match > match_min_pos {
            let buf = self.win.buffer();
            let buf_offset = self.win.buf_offset();
            if buf[(buf_offset + cur_match + self.num_hash_direct_bytes) as usize]
                != buf[(cur + self.num_hash_direct_bytes) as usize]
            {
                max_len = self.num_hash_direct_bytes;
                distances[offset] = max_len;
                distances[offset + 1] = self.win.pos() - cur_match - 1;
                offset += 2;
            }
        }

        let mut ptr0 = (self.cyclic_pos << 1) + 1;
        let mut ptr1 = self.cyclic_pos << 1;
        let mut len0 = self.num_hash_direct_bytes;
        let mut len1 = self.num_hash_direct_bytes;
        let mut count = self.cut_value;

        loop {
            if cur_match <= match_min_pos || count == 0 {
                self.son[ptr1 as usize] = EMPTY_HASH;
                self.son[ptr0 as usize] = EMPTY_HASH;
                break;
            }
            count -= 1;

            let delta = self.win.pos() - cur_match;
            let cyclic_pos = if delta <= self.cyclic_pos {
                (self.cyclic_pos - delta) << 1
            } else {
                (self.cyclic_pos - delta + self.cyclic_size) << 1
            };
            let buf = self.win.buffer();
            let pby1 = self.win.buf_offset() + cur_match;
            let mut len = len0.min(len1);

            if buf[(pby1 + len) as usize] == buf[(cur + len) as usize] {
                len += 1;
                while len != len_limit && buf[(pby1 + len) as usize] == buf[(cur + len) as usize] {
                    len += 1;
                }
                if max_len < len {
                    max_len = len;
                    distances[offset] = max_len;
                    distances[offset + 1] = delta - 1;
                    offset += 2;
                    if len == len_limit {
                        self.son[ptr1 as usize] = self.son[cyclic_pos as usize];
                        self.son[ptr0 as usize] = self.son[(cyclic_pos + 1) as usize];
                        break;
                    }
                }
            }

            if buf[(pby1 + len) as usize] < buf[(cur + len) as usize] {
                self.son[ptr1 as usize] = cur_match;
                ptr1 = cyclic_pos + 1;
                cur_match = self.son[ptr1 as usize];
                len1 = len;
            } else {
                self.son[ptr0 as usize] = cur_match;
                ptr0 = cyclic_pos;
                cur_match = self.son[ptr0 as usize];
                len0 = len;
            }
        }

        self.move_pos()?;
        Ok(offset)
    }

    /// Advance `num` positions, maintaining the tree without reporting
    /// matches. Used after a multi-byte packet is committed.
    pub fn skip(&mut self, num: i32) -> Result<()> {
        for _ in 0..num {
            let len_limit;
            if self.win.pos() + self.match_max_len <= self.win.stream_pos() {
                len_limit = self.match_max_len;
            } else {
                len_limit = self.win.stream_pos() - self.win.pos();
                if len_limit < self.min_match_check {
                    self.move_pos()?;
                    continue;
                }
            }

            let match_min_pos = if self.win.pos() > self.cyclic_size {
                self.win.pos() - self.cyclic_size
            } else {
                0
            };
            let cur = self.win.cursor();

            let (hash2, hash3, hash_value) = self.hash_values();
            if self.hash_array {
                self.hash[hash2 as usize] = self.win.pos();
                self.hash[(HASH3_OFFSET + hash3) as usize] = self.win.pos();
            }
            let mut cur_match = self.hash[(self.fix_hash_size + hash_value) as usize];
            self.hash[(self.fix_hash_size + hash_value) as usize] = self.win.pos();

            let mut ptr0 = (self.cyclic_pos << 1) + 1;
            let mut ptr1 = self.cyclic_pos << 1;
            let mut len0 = self.num_hash_direct_bytes;
            let mut len1 = self.num_hash_direct_bytes;
            let mut count = self.cut_value;

            loop {
                if cur_match <= match_min_pos || count == 0 {
                    self.son[ptr1 as usize] = EMPTY_HASH;
                    self.son[ptr0 as usize] = EMPTY_HASH;
                    break;
                }
                count -= 1;

                let delta = self.win.pos() - cur_match;
                let cyclic_pos = if delta <= self.cyclic_pos {
                    (self.cyclic_pos - delta) << 1
                } else {
                    (self.cyclic_pos - delta + self.cyclic_size) << 1
                };
                let buf = self.win.buffer();
                let pby1 = self.win.buf_offset() + cur_match;
                let mut len = len0.min(len1);

                if buf[(pby1 + len) as usize] == buf[(cur + len) as usize] {
                    len += 1;
                    while len != len_limit && buf[(pby1 + len) as usize] == buf[(cur + len) as usize]
                    {
                        len += 1;
                    }
                    if len == len_limit {
                        self.son[ptr1 as usize] = self.son[cyclic_pos as usize];
                        self.son[ptr0 as usize] = self.son[(cyclic_pos + 1) as usize];
                        break;
                    }
                }

                if buf[(pby1 + len) as usize] < buf[(cur + len) as usize] {
                    self.son[ptr1 as usize] = cur_match;
                    ptr1 = cyclic_pos + 1;
                    cur_match = self.son[ptr1 as usize];
                    len1 = len;
                } else {
                    self.son[ptr0 as usize] = cur_match;
                    ptr0 = cyclic_pos;
                    cur_match = self.son[ptr0 as usize];
                    len0 = len;
                }
            }

            self.move_pos()?;
        }
        Ok(())
    }
}

fn normalize_links(items: &mut [i32], num_items: usize, sub_value: i32) {
    for item in items.iter_mut().take(num_items) {
        *item = if *item <= sub_value {
            EMPTY_HASH
        } else {
            *item - sub_value
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MATCH_PAIRS_CAP: usize = 273 * 2 + 2;

    fn collect_all(
        data: &[u8],
        kind: MatchFinderKind,
    ) -> Vec<Vec<(i32, i32)>> {
        let mut bt = BinTree::new(Cursor::new(data.to_vec()), 1 << 12, 16, 64, 274, kind).unwrap();
        let mut distances = [0i32; MATCH_PAIRS_CAP];
        let mut all = Vec::new();
        for _ in 0..data.len() {
            let n = bt.get_matches(&mut distances).unwrap();
            let pairs = distances[..n]
                .chunks(2)
                .map(|c| (c[0], c[1]))
                .collect::<Vec<_>>();
            all.push(pairs);
        }
        all
    }

    #[test]
    fn test_matches_are_sound_and_increasing() {
        let mut data = Vec::new();
        for i in 0..400u32 {
            data.push((i % 7) as u8 + b'a');
        }
        data.extend_from_slice(b"unique tail bytes!");
        for kind in [MatchFinderKind::Bt4, MatchFinderKind::Bt2] {
            let all = collect_all(&data, kind);
            for (pos, pairs) in all.iter().enumerate() {
                let mut prev_len = 0;
                for &(len, dist) in pairs {
                    assert!(len > prev_len, "lengths must strictly increase");
                    prev_len = len;
                    let src = pos as i32 - dist - 1;
                    assert!(src >= 0, "distance reaches before stream start");
                    for k in 0..len {
                        assert_eq!(
                            data[(src + k) as usize],
                            data[pos + k as usize],
                            "match content mismatch at pos {pos} len {len} dist {dist}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_finds_the_long_period_match() {
        let data = b"lzmalzmalzma".to_vec();
        let all = collect_all(&data, MatchFinderKind::Bt4);
        // At position 4 the finder must see the distance-3 match covering
        // the remaining 8 bytes.
        let best = all[4].iter().max_by_key(|&&(len, _)| len).copied();
        assert_eq!(best, Some((8, 3)));
    }

    #[test]
    fn test_no_matches_in_unique_data() {
        let data: Vec<u8> = (0..=255u8).collect();
        let all = collect_all(&data, MatchFinderKind::Bt4);
        for pairs in &all {
            assert!(pairs.is_empty());
        }
    }

    #[test]
    fn test_skip_keeps_tree_consistent() {
        // Interleave get_matches and skip; later matches must stay sound.
        let data: Vec<u8> = b"abcabcabcabcabcabcabcabc".to_vec();
        let mut bt =
            BinTree::new(Cursor::new(data.clone()), 1 << 12, 16, 64, 274, MatchFinderKind::Bt4)
                .unwrap();
        let mut distances = [0i32; MATCH_PAIRS_CAP];
        bt.get_matches(&mut distances).unwrap();
        bt.skip(5).unwrap();
        let n = bt.get_matches(&mut distances).unwrap();
        let pos = 6usize;
        for c in distances[..n].chunks(2) {
            let (len, dist) = (c[0], c[1]);
            let src = pos as i32 - dist - 1;
            for k in 0..len {
                assert_eq!(data[(src + k) as usize], data[pos + k as usize]);
            }
        }
    }
}
