//! MurmurHash3 (x86, 32-bit), the round function of the Feistel passes.
//!
//! The scrambler only ever hashes two-byte keys, but the general routine is
//! kept so that it can be checked against the published MurmurHash3 vectors.

const C1: u32 = 0xcc9e2d51;
const C2: u32 = 0x1b873593;

/// Hashes a 16-bit value under `seed`.
///
/// The key is fed to MurmurHash3 as its two little-endian bytes.
#[inline]
pub(crate) fn muk(seed: u32, key: u16) -> u32 {
    murmur3_32(&key.to_le_bytes(), seed)
}

/// MurmurHash3_x86_32 of `data` with the given `seed`.
pub(crate) fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;

    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k |= u32::from(byte) << (8 * i);
        }
        h ^= mix_k(k);
    }

    // Only the low 32 bits of the length take part, as in the reference.
    h ^= data.len() as u32;
    fmix32(h)
}

#[inline(always)]
fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline(always)]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^ (h >> 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_vectors() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514e28b7);
        assert_eq!(murmur3_32(b"", 0xffffffff), 0x81f16f39);
        assert_eq!(murmur3_32(b"test", 0), 0xba6bd213);
        assert_eq!(murmur3_32(b"Hello, world!", 1234), 0xfaf6cdb3);
    }

    #[test]
    fn test_round_keys() {
        // First and last round seeds of the scrambler.
        assert_eq!(muk(0xb76d5eed, 0), 0xbe0423ff);
        assert_eq!(muk(0xb76d5eed, 1), 0x746267cc);
        assert_eq!(muk(0xb76d5eed, 0xffff), 0x77aadd30);
        assert_eq!(muk(0x4b387af7, 0), 0xa41fdaf0);
        assert_eq!(muk(0x4b387af7, 1), 0xd8368b1a);
        assert_eq!(muk(0x4b387af7, 0xffff), 0xad871a7e);
    }

    #[test]
    fn test_key_is_little_endian() {
        assert_eq!(muk(0xee281300, 0x0102), murmur3_32(&[0x02, 0x01], 0xee281300));
        assert_ne!(muk(0xee281300, 0x0102), muk(0xee281300, 0x0201));
    }
}
