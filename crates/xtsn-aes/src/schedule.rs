//! AES-128 key expansion.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::block::{Block, BLOCK_SIZE};
use crate::sbox::sbox;

/// Size of an AES-128 key in bytes.
pub const KEY_SIZE: usize = 16;

/// Number of round keys in an AES-128 schedule (initial whitening plus 10 rounds).
pub const ROUND_KEYS: usize = 11;

/// Size of the flattened schedule in bytes.
pub const SCHEDULE_SIZE: usize = ROUND_KEYS * BLOCK_SIZE;

const RCON: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1b, 0x36];

/// Expanded AES-128 round keys.
///
/// Round key 0 is the master key itself, which lets backends that key
/// themselves from raw key bytes share the same schedule value.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RoundKeySchedule([Block; ROUND_KEYS]);

impl RoundKeySchedule {
    /// Returns the round key at `round` (0..=10).
    #[inline]
    pub fn round_key(&self, round: usize) -> &Block {
        &self.0[round]
    }

    /// Returns the master key the schedule was expanded from.
    #[inline]
    pub fn master_key(&self) -> &Block {
        &self.0[0]
    }

    /// Returns the schedule as 176 contiguous bytes.
    pub fn to_bytes(&self) -> [u8; SCHEDULE_SIZE] {
        let mut out = [0u8; SCHEDULE_SIZE];
        for (dst, rk) in out.chunks_exact_mut(BLOCK_SIZE).zip(&self.0) {
            dst.copy_from_slice(rk);
        }
        out
    }
}

impl core::fmt::Debug for RoundKeySchedule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("RoundKeySchedule(..)")
    }
}

/// Expands a 16-byte key into the 11 AES-128 round keys.
pub fn expand_key(key: &[u8; KEY_SIZE]) -> RoundKeySchedule {
    let mut words = [[0u8; 4]; 4 * ROUND_KEYS];
    for (word, chunk) in words.iter_mut().zip(key.chunks_exact(4)) {
        word.copy_from_slice(chunk);
    }

    for i in 4..words.len() {
        let mut temp = words[i - 1];
        if i % 4 == 0 {
            temp.rotate_left(1);
            for byte in temp.iter_mut() {
                *byte = sbox(*byte);
            }
            temp[0] ^= RCON[i / 4 - 1];
        }
        for (j, byte) in temp.iter().enumerate() {
            words[i][j] = words[i - 4][j] ^ byte;
        }
    }

    let mut round_keys = [[0u8; BLOCK_SIZE]; ROUND_KEYS];
    for (rk, group) in round_keys.iter_mut().zip(words.chunks_exact(4)) {
        for (dst, word) in rk.chunks_exact_mut(4).zip(group) {
            dst.copy_from_slice(word);
        }
    }
    words.zeroize();

    RoundKeySchedule(round_keys)
}
