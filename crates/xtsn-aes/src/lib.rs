//! Software AES-128 used as the always-available block cipher of the XTSN engine.
//!
//! The crate provides:
//! - The AES-128 key schedule, producing 176 bytes of round keys.
//! - Single-block encryption and decryption, by value or in place.
//!
//! Lookups are table based and not constant-time. The engine only uses this
//! core to transform container images offline, where that is acceptable.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod block;
mod cipher;
mod round;
mod sbox;
mod schedule;

pub use crate::block::{xor_in_place, Block, BLOCK_SIZE};
pub use crate::cipher::{decrypt_block, decrypt_in_place, encrypt_block, encrypt_in_place};
pub use crate::sbox::{inv_sbox, sbox};
pub use crate::schedule::{expand_key, RoundKeySchedule, KEY_SIZE, ROUND_KEYS, SCHEDULE_SIZE};
