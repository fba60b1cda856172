//! 128-bit sector counter.

use std::fmt;

/// Absolute sector index, held as two 64-bit lanes.
///
/// Arithmetic carries explicitly from the low lane into the high lane and
/// wraps at 2^128.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SectorOffset {
    lo: u64,
    hi: u64,
}

impl SectorOffset {
    /// Sector zero.
    pub const ZERO: Self = Self { lo: 0, hi: 0 };

    /// Builds an offset from its low and high 64-bit lanes.
    pub const fn from_lanes(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    /// Low 64 bits.
    pub const fn lo(&self) -> u64 {
        self.lo
    }

    /// High 64 bits.
    pub const fn hi(&self) -> u64 {
        self.hi
    }

    /// Advances to the next sector.
    #[inline]
    pub fn step(&mut self) {
        self.step_by(1);
    }

    /// Advances by `amount` sectors.
    #[inline]
    pub fn step_by(&mut self, amount: u64) {
        let (lo, carry) = self.lo.overflowing_add(amount);
        self.lo = lo;
        if carry {
            self.hi = self.hi.wrapping_add(1);
        }
    }

    /// Sector index in big-endian byte order, high lane first.
    ///
    /// This is the plaintext of the tweak block.
    pub fn to_be_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.hi.to_be_bytes());
        out[8..].copy_from_slice(&self.lo.to_be_bytes());
        out
    }
}

impl From<u128> for SectorOffset {
    fn from(value: u128) -> Self {
        Self::from_lanes(value as u64, (value >> 64) as u64)
    }
}

impl From<u64> for SectorOffset {
    fn from(value: u64) -> Self {
        Self::from_lanes(value, 0)
    }
}

impl From<SectorOffset> for u128 {
    fn from(offset: SectorOffset) -> Self {
        (u128::from(offset.hi) << 64) | u128::from(offset.lo)
    }
}

impl fmt::Display for SectorOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u128::from(*self))
    }
}
