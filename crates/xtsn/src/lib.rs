//! Nintendo AES-XTSN: sector-tweaked AES-128 as used by the Switch's BIS
//! NAND partitions.
//!
//! XTSN is XTS without ciphertext stealing, with one twist: the tweak block
//! is the sector index in big-endian byte order instead of little-endian.
//!
//! ```
//! use xtsn::{SectorParams, Xtsn};
//!
//! let xtsn = Xtsn::new(&[0x01; 16], &[0x02; 16])?;
//! let plain = vec![0u8; 0x400];
//! let sealed = xtsn.encrypt(&plain, 0x10u64, SectorParams::default())?;
//! assert_eq!(xtsn.decrypt(&sealed, 0x10u64, SectorParams::default())?, plain);
//! # Ok::<(), xtsn::Error>(())
//! ```
//!
//! [`XtsnStream`] layers unaligned random access over a seekable image.
//!
//! Block encryption runs on the built-in software AES unless a libcrypto of
//! at least 1.1.0 can be loaded at runtime; see [`backend`].

#![deny(missing_docs)]

pub mod backend;
mod cipher;
mod engine;
mod error;
mod sector;
mod stream;
mod tweak;

pub use crate::backend::Backend;
pub use crate::cipher::{BlockCipher, Direction, SoftwareCipher};
pub use crate::engine::{SectorParams, Xtsn};
pub use crate::error::{Error, KeyRole, Result};
pub use crate::sector::SectorOffset;
pub use crate::stream::XtsnStream;
pub use crate::tweak::Tweak;
pub use xtsn_aes::{Block, RoundKeySchedule};
