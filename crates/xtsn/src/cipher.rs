//! Single-block cipher abstraction shared by the software and accelerated backends.

use xtsn_aes::{decrypt_in_place, encrypt_in_place, Block, RoundKeySchedule};

use crate::error::Result;

/// Direction of a cipher operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Forward AES transform.
    Encrypt,
    /// Inverse AES transform.
    Decrypt,
}

/// A primitive that transforms exactly one 16-byte block.
///
/// The engine calls this for every data unit and once per sector for the
/// tweak. Implementations may keep per-call state (a library context, a
/// cached key) but must produce the same bytes as [`SoftwareCipher`].
pub trait BlockCipher {
    /// Transforms `block` in place under `schedule`.
    fn crypt_block(
        &mut self,
        schedule: &RoundKeySchedule,
        direction: Direction,
        block: &mut Block,
    ) -> Result<()>;
}

/// The built-in AES-128 core. Never fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareCipher;

impl BlockCipher for SoftwareCipher {
    #[inline]
    fn crypt_block(
        &mut self,
        schedule: &RoundKeySchedule,
        direction: Direction,
        block: &mut Block,
    ) -> Result<()> {
        match direction {
            Direction::Encrypt => encrypt_in_place(block, schedule),
            Direction::Decrypt => decrypt_in_place(block, schedule),
        }
        Ok(())
    }
}
