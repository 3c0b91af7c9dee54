//! Band selection and the public `fein` / `fynd` entry points.

use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::error::Error;
use crate::feistel::{Feistel, WORD};
use crate::CycleWalk;

/// Lower bound of the first scrambled band.
const WORD_LO: u64 = 0x1_0000;
const LOW_WORD: u64 = 0xffff_ffff;
const HIGH_WORD: u64 = !LOW_WORD;

/// `[0x1_0000, 2^32)`, offset to start at zero.
const WORD_PERM: CycleWalk<Feistel> = CycleWalk::new(LOW_WORD + 1 - WORD_LO, WORD);

/// A range of points sharing one transform.
///
/// Bands are disjoint and ordered by magnitude, and together they cover
/// every non-negative integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Band {
    /// `[0, 2^16)`: left unchanged.
    Identity,
    /// `[2^16, 2^32)`: permuted by the cycle-walked Feistel pass.
    Word,
    /// `[2^32, 2^64)`: the high 32 bits are kept and the low 32 bits are
    /// scrambled as a point of their own.
    DoubleWord,
    /// `[2^64, ∞)`: left unchanged.
    Beyond,
}

impl Band {
    pub const ALL: [Band; 4] = [Band::Identity, Band::Word, Band::DoubleWord, Band::Beyond];

    pub fn of(x: &BigUint) -> Band {
        match x.to_u64() {
            Some(x) => Band::of_u64(x),
            None => Band::Beyond,
        }
    }

    pub const fn of_u64(x: u64) -> Band {
        if x < WORD_LO {
            Band::Identity
        } else if x <= LOW_WORD {
            Band::Word
        } else {
            Band::DoubleWord
        }
    }

    /// Inclusive lower bound.
    pub const fn lo(self) -> u128 {
        match self {
            Band::Identity => 0,
            Band::Word => WORD_LO as u128,
            Band::DoubleWord => 1 << 32,
            Band::Beyond => 1 << 64,
        }
    }

    /// Exclusive upper bound, `None` for the last band.
    pub const fn hi(self) -> Option<u128> {
        match self {
            Band::Identity => Some(WORD_LO as u128),
            Band::Word => Some(1 << 32),
            Band::DoubleWord => Some(1 << 64),
            Band::Beyond => None,
        }
    }

    pub const fn is_identity(self) -> bool {
        matches!(self, Band::Identity | Band::Beyond)
    }
}

/// Scrambles a point that fits in 64 bits.
pub fn fein_u64(x: u64) -> u64 {
    match Band::of_u64(x) {
        Band::Identity | Band::Beyond => x,
        Band::Word => WORD_LO + WORD_PERM.get(x - WORD_LO),
        Band::DoubleWord => (x & HIGH_WORD) | fein_u64(x & LOW_WORD),
    }
}

/// Inverse of [`fein_u64`].
pub fn fynd_u64(y: u64) -> u64 {
    match Band::of_u64(y) {
        Band::Identity | Band::Beyond => y,
        Band::Word => WORD_LO + WORD_PERM.inverse(y - WORD_LO),
        Band::DoubleWord => (y & HIGH_WORD) | fynd_u64(y & LOW_WORD),
    }
}

/// Scrambles a point.
pub fn fein(x: &BigUint) -> BigUint {
    match x.to_u64() {
        Some(x) => BigUint::from(fein_u64(x)),
        None => x.clone(),
    }
}

/// Recovers the point that [`fein`] scrambled into `y`.
pub fn fynd(y: &BigUint) -> BigUint {
    match y.to_u64() {
        Some(y) => BigUint::from(fynd_u64(y)),
        None => y.clone(),
    }
}

/// Parses a point written as a non-negative decimal integer.
///
/// Only ASCII digits are accepted: no sign, whitespace, separators or radix
/// prefix.
pub fn parse_point(text: &str) -> Result<BigUint, Error> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidInput(text.into()));
    }
    BigUint::parse_bytes(text.as_bytes(), 10).ok_or_else(|| Error::InvalidInput(text.into()))
}

/// [`fein`] of a decimal string.
pub fn fein_str(text: &str) -> Result<BigUint, Error> {
    parse_point(text).map(|x| fein(&x))
}

/// [`fynd`] of a decimal string.
pub fn fynd_str(text: &str) -> Result<BigUint, Error> {
    parse_point(text).map(|y| fynd(&y))
}
