//! Encoder configuration: compression levels and their parameter sets.

use crate::error::{LzmaError, Result};

/// Fastest compression level.
pub const BEST_SPEED: u32 = 1;
/// Default compression level.
pub const DEFAULT_COMPRESSION: u32 = 6;
/// Strongest compression level.
pub const BEST_COMPRESSION: u32 = 9;

/// Match finder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFinderKind {
    /// Binary tree over 2-byte hashes.
    Bt2,
    /// Binary tree over 4-byte hashes with auxiliary 2- and 3-byte tables.
    Bt4,
}

/// Encoder parameters.
///
/// Normally obtained from [`EncoderOptions::from_level`]; every field can
/// be overridden afterwards, subject to [`EncoderOptions::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Dictionary size as a power of two, in `[12, 30]`.
    pub dict_bits: u32,
    /// Match length past which the parser commits without searching,
    /// in `[5, 273]`.
    pub fast_bytes: u32,
    /// Literal context bits, in `[0, 8]`.
    pub lc: u32,
    /// Literal position bits, in `[0, 4]`.
    pub lp: u32,
    /// Position state bits, in `[0, 4]`.
    pub pb: u32,
    /// Match finder kind.
    pub match_finder: MatchFinderKind,
}

const LEVELS: [EncoderOptions; 9] = [
    EncoderOptions { dict_bits: 16, fast_bytes: 64, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
    EncoderOptions { dict_bits: 18, fast_bytes: 64, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
    EncoderOptions { dict_bits: 20, fast_bytes: 64, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
    EncoderOptions { dict_bits: 22, fast_bytes: 64, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
    EncoderOptions { dict_bits: 23, fast_bytes: 128, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
    EncoderOptions { dict_bits: 24, fast_bytes: 128, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
    EncoderOptions { dict_bits: 25, fast_bytes: 128, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
    EncoderOptions { dict_bits: 26, fast_bytes: 255, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
    EncoderOptions { dict_bits: 27, fast_bytes: 255, lc: 3, lp: 0, pb: 2, match_finder: MatchFinderKind::Bt4 },
];

impl EncoderOptions {
    /// Parameter set for a compression level in `[1, 9]`.
    pub fn from_level(level: u32) -> Result<Self> {
        if !(BEST_SPEED..=BEST_COMPRESSION).contains(&level) {
            return Err(LzmaError::invalid_option(format!(
                "compression level out of range: {level}"
            )));
        }
        Ok(LEVELS[(level - 1) as usize])
    }

    /// Check every parameter against its valid range.
    pub fn validate(&self) -> Result<()> {
        if !(12..=30).contains(&self.dict_bits) {
            return Err(LzmaError::invalid_option(format!(
                "dictionary bits out of range: {}",
                self.dict_bits
            )));
        }
        if !(5..=273).contains(&self.fast_bytes) {
            return Err(LzmaError::invalid_option(format!(
                "number of fast bytes out of range: {}",
                self.fast_bytes
            )));
        }
        if self.lc > 8 {
            return Err(LzmaError::invalid_option(format!(
                "literal context bits out of range: {}",
                self.lc
            )));
        }
        if self.lp > 4 {
            return Err(LzmaError::invalid_option(format!(
                "literal position bits out of range: {}",
                self.lp
            )));
        }
        if self.pb > 4 {
            return Err(LzmaError::invalid_option(format!(
                "position bits out of range: {}",
                self.pb
            )));
        }
        Ok(())
    }

    /// Dictionary size in bytes.
    #[inline]
    pub fn dict_size(&self) -> u32 {
        1 << self.dict_bits
    }
}

impl Default for EncoderOptions {
    fn default() -> Self {
        LEVELS[(DEFAULT_COMPRESSION - 1) as usize]
    }
}
