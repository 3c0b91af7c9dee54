//! Four-round Feistel pass over `[0..a * b)` with `b = a + 1`.
//!
//! A value `m` is split as `m = a * R + L` with `L < a` and `R < b`. Odd
//! rounds reduce modulo `a`, even rounds modulo `b`, so the two halves keep
//! their widths after each swap.
//!
//! The reference scrambler joins the halves back with the roles of `a` and
//! `b` exchanged, which only stays injective because the one right half that
//! does not fit (`R == a`) is routed through a separate layout. That layout
//! is part of the output format and is reproduced here as
//! [`Feistel::join_forward`] / [`Feistel::split_inverse`].

use crate::muk::muk;
use crate::Bijection;

/// Number of rounds of every pass.
pub(crate) const ROUNDS: usize = 4;

// The output layout below is the one for an even number of rounds.
const _: () = assert!(ROUNDS % 2 == 0);

/// Murmur seeds of the four rounds.
pub(crate) const RAKU: [u32; ROUNDS] = [0xb76d5eed, 0xee281300, 0x85bcae01, 0x4b387af7];

/// The pass used for 32-bit points: `a = 0xffff`, domain `[0..0xffff_0000)`.
pub(crate) const WORD: Feistel = Feistel::new(0xffff, RAKU);

#[derive(Clone, Copy, Debug)]
pub(crate) struct Feistel {
    a: u64,
    b: u64,
    keys: [u32; ROUNDS],
}

impl Feistel {
    pub(crate) const fn new(a: u16, keys: [u32; ROUNDS]) -> Self {
        assert!(a > 0, "a must be positive");
        let a = a as u64;
        Self {
            a,
            b: a + 1,
            keys,
        }
    }

    /// Size of the domain, `a * b`.
    pub(crate) const fn len(&self) -> u64 {
        self.a * self.b
    }

    #[inline(always)]
    fn modulus(&self, round: usize) -> u64 {
        // Rounds are numbered from 1 in the reference: odd rounds use `a`.
        if round % 2 == 0 {
            self.a
        } else {
            self.b
        }
    }

    #[inline(always)]
    fn eff(&self, round: usize, half: u64) -> u64 {
        debug_assert!(half <= u64::from(u16::MAX));
        u64::from(muk(self.keys[round], half as u16))
    }

    pub(crate) fn forward(&self, m: u64) -> u64 {
        debug_assert!(m < self.len());
        let mut ell = m % self.a;
        let mut arr = m / self.a;
        for round in 0..ROUNDS {
            let modulus = self.modulus(round);
            let next = (ell + self.eff(round, arr)) % modulus;
            ell = arr;
            arr = next;
        }
        self.join_forward(ell, arr)
    }

    pub(crate) fn inverse(&self, m: u64) -> u64 {
        debug_assert!(m < self.len());
        let (mut ell, mut arr) = self.split_inverse(m);
        for round in (0..ROUNDS).rev() {
            let modulus = self.modulus(round);
            let eff = self.eff(round, ell) % modulus;
            let next = (arr + modulus - eff) % modulus;
            arr = ell;
            ell = next;
        }
        self.a * arr + ell
    }

    /// Joins the halves after the last forward round.
    ///
    /// `ell < a` and `arr < b`. Compatibility rule: when `arr` equals `a`
    /// the halves are joined as `a * arr + ell`, otherwise as
    /// `a * ell + arr`. Issued identifiers depend on this exact layout.
    #[inline(always)]
    fn join_forward(&self, ell: u64, arr: u64) -> u64 {
        if arr == self.a {
            self.a * arr + ell
        } else {
            self.a * ell + arr
        }
    }

    /// Undoes [`Feistel::join_forward`], keyed on the same literal `a`.
    #[inline(always)]
    fn split_inverse(&self, m: u64) -> (u64, u64) {
        let ahh = m % self.a;
        let ale = m / self.a;
        if ale == self.a {
            (ahh, ale)
        } else {
            (ale, ahh)
        }
    }
}

impl Bijection for Feistel {
    #[inline]
    fn apply(&self, x: u64) -> u64 {
        self.forward(x)
    }

    #[inline]
    fn invert(&self, y: u64) -> u64 {
        self.inverse(y)
    }
}
