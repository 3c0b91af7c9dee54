//! Fein and Fynd: the reversible scrambler behind ship addresses.
//!
//! Points (address numbers) are issued sequentially, which would leak how
//! many exist and in which order they were handed out. [`fein`] maps a point
//! to a random-looking value of the same size, and [`fynd`] maps it back. The
//! pair is a bijection over all non-negative integers and reproduces the
//! reference scrambler bit for bit, so scrambled values can be exchanged
//! with other implementations.
//!
//! ```text
//! [0, 2^16)       identity
//! [2^16, 2^32)    0x1_0000 + cycle-walked 4-round Feistel pass (murmur3 rounds)
//! [2^32, 2^64)    high 32 bits kept, low 32 bits scrambled as above
//! [2^64, ..)      identity
//! ```
//!
//! ```
//! use num_bigint::BigUint;
//! use urbit_ob::{fein, fynd, fein_u64};
//!
//! assert_eq!(fein_u64(65536), 1111384255);
//!
//! let point = BigUint::from(14287616u32);
//! let public = fein(&point);
//! assert_eq!(public, BigUint::from(4126721504u32));
//! assert_eq!(fynd(&public), point);
//! ```
//!
//! Decimal text is accepted at the boundary:
//!
//! ```
//! assert_eq!(urbit_ob::fynd_str("1111384255").unwrap().to_string(), "65536");
//! assert!(urbit_ob::fein_str("abcdefg").is_err());
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod error;
mod feistel;
mod muk;
mod ob;
#[cfg(feature = "verify")]
pub mod verify;

pub use error::Error;
pub use ob::{fein, fein_str, fein_u64, fynd, fynd_str, fynd_u64, parse_point, Band};

/// A bijection on `[0..n)` for some fixed `n`, with its inverse.
pub(crate) trait Bijection {
    fn apply(&self, x: u64) -> u64;
    fn invert(&self, y: u64) -> u64;
}

/// Cycle-walking permutation on `[0..n)` built from a bijection on a
/// larger domain.
///
/// Both directions re-apply the underlying map until the value falls back
/// below `n`, so they walk the same cycle and stay inverse to each other.
/// There is no iteration cap: each walk ends because the underlying map is
/// a permutation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CycleWalk<B> {
    n: u64,
    bijection: B,
}

impl<B: Bijection> CycleWalk<B> {
    pub(crate) const fn new(n: u64, bijection: B) -> Self {
        assert!(n > 0, "n must be positive");
        Self { n, bijection }
    }

    pub(crate) fn get(&self, x: u64) -> u64 {
        assert!(x < self.n, "x must be less than n");
        let mut y = x;
        loop {
            y = self.bijection.apply(y);
            if y < self.n {
                return y;
            }
        }
    }

    pub(crate) fn inverse(&self, y: u64) -> u64 {
        assert!(y < self.n, "y must be less than n");
        let mut x = y;
        loop {
            x = self.bijection.invert(x);
            if x < self.n {
                return x;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> u64 {
        self.n
    }
}
