//! Error and result types for the XTSN engine.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Which of the two session keys a key error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRole {
    /// Key applied to the data blocks.
    Crypt,
    /// Key used to derive per-sector tweaks.
    Tweak,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyRole::Crypt => "crypt",
            KeyRole::Tweak => "tweak",
        })
    }
}

/// Errors the engine can report.
///
/// Validation variants are raised before any buffer is allocated or
/// transformed. [`Error::Backend`] means the accelerated primitive failed
/// midway and the partial output was discarded.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A key was not exactly 16 bytes long.
    #[error("{role} key must be 16 bytes, got {len}")]
    KeyLength {
        /// Which key was rejected.
        role: KeyRole,
        /// Length that was supplied.
        len: usize,
    },
    /// The buffer length is not a multiple of 16.
    #[error("buffer length {0} is not divisible by 16")]
    MisalignedLength(usize),
    /// The skip-byte count is not a multiple of 16.
    #[error("skipped bytes {0} not divisible by 16")]
    MisalignedSkip(u64),
    /// The sector size is zero.
    #[error("sector size must not be 0")]
    ZeroSectorSize,
    /// The sector size is not a multiple of 16.
    #[error("sector size {0} not divisible by 16")]
    MisalignedSectorSize(u64),
    /// The working buffer could not be allocated.
    #[error("could not allocate a {0}-byte working buffer")]
    Allocation(usize),
    /// The accelerated AES primitive reported a failure.
    #[error("unexpected error from the accelerated AES backend")]
    Backend,
    /// Reading or writing the underlying stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors caused by caller-supplied parameters.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::KeyLength { .. }
                | Error::MisalignedLength(_)
                | Error::MisalignedSkip(_)
                | Error::ZeroSectorSize
                | Error::MisalignedSectorSize(_)
        )
    }
}
