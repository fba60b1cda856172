//! Per-sector tweak derivation and GF(2^128) doubling.

use xtsn_aes::{xor_in_place, Block, RoundKeySchedule};

use crate::cipher::{BlockCipher, Direction};
use crate::error::Result;
use crate::sector::SectorOffset;

/// Reduction constant for `x^128 + x^7 + x^2 + x + 1`.
const GF_128_FEEDBACK: u64 = 0x87;

/// Tweak for the 16-byte unit currently being processed.
///
/// Stored as two little-endian 64-bit lanes: `lo` holds bytes 0..8 and `hi`
/// holds bytes 8..16 of the tweak block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tweak {
    lo: u64,
    hi: u64,
}

impl Tweak {
    /// Derives the initial tweak of `sector`.
    ///
    /// The plaintext is the sector index in big-endian order. Standard XTS
    /// uses little-endian here; existing images depend on this ordering.
    pub fn derive<C: BlockCipher + ?Sized>(
        sector: SectorOffset,
        schedule: &RoundKeySchedule,
        cipher: &mut C,
    ) -> Result<Self> {
        let mut block = sector.to_be_bytes();
        cipher.crypt_block(schedule, Direction::Encrypt, &mut block)?;
        Ok(Self::from_bytes(&block))
    }

    /// Interprets a raw 16-byte tweak block.
    pub fn from_bytes(block: &Block) -> Self {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&block[..8]);
        hi.copy_from_slice(&block[8..]);
        Self {
            lo: u64::from_le_bytes(lo),
            hi: u64::from_le_bytes(hi),
        }
    }

    /// Raw tweak block.
    pub fn to_bytes(&self) -> Block {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.lo.to_le_bytes());
        out[8..].copy_from_slice(&self.hi.to_le_bytes());
        out
    }

    /// Multiplies the tweak by `x` in GF(2^128).
    #[inline]
    pub fn double(&mut self) {
        let reduce = self.hi >> 63;
        self.hi = (self.hi << 1) | (self.lo >> 63);
        self.lo = (self.lo << 1) ^ (reduce * GF_128_FEEDBACK);
    }

    /// Doubles the tweak `times` times.
    pub fn advance(&mut self, times: u64) {
        for _ in 0..times {
            self.double();
        }
    }

    /// XORs the tweak into `block`.
    #[inline]
    pub fn apply(&self, block: &mut Block) {
        xor_in_place(block, &self.to_bytes());
    }
}
