//! Random access to an XTSN-encrypted region of a seekable stream.

use std::io::{self, Read, Seek, SeekFrom, Write};

use xtsn_aes::BLOCK_SIZE;

use crate::engine::{SectorParams, Xtsn};
use crate::error::{Error, Result};
use crate::sector::SectorOffset;

const UNIT: u64 = BLOCK_SIZE as u64;

/// An encrypted region inside `inner`, addressed by plaintext offset.
///
/// The region starts at byte `base` of the stream and its first byte lies at
/// the start of sector `first_sector`. Reads and writes may start and end
/// anywhere; partial units at either edge are widened to 16 bytes.
#[derive(Debug)]
pub struct XtsnStream<S> {
    inner: S,
    xtsn: Xtsn,
    base: u64,
    first_sector: SectorOffset,
    sector_size: u64,
}

impl<S> XtsnStream<S> {
    /// Wraps `inner`. The region starts at sector zero, at stream offset zero.
    pub fn new(inner: S, xtsn: Xtsn, sector_size: u64) -> Self {
        Self {
            inner,
            xtsn,
            base: 0,
            first_sector: SectorOffset::ZERO,
            sector_size,
        }
    }

    /// Places the region at byte `base` of the stream.
    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Numbers the region's first sector `sector`.
    pub fn with_first_sector(mut self, sector: impl Into<SectorOffset>) -> Self {
        self.first_sector = sector.into();
        self
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn params(&self, aligned_offset: u64) -> SectorParams {
        SectorParams::new(self.sector_size).with_skip(aligned_offset)
    }

    /// Stream position of plaintext offset `offset`.
    fn position(&self, offset: u64) -> io::Result<u64> {
        self.base
            .checked_add(offset)
            .ok_or_else(|| out_of_range("region offset"))
    }
}

fn out_of_range(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{what} overflows"))
}

impl<S: Read + Seek> XtsnStream<S> {
    /// Decrypts `len` bytes starting at plaintext offset `offset`.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let before = offset % UNIT;
        let aligned = offset - before;
        let wanted = (before as usize)
            .checked_add(len)
            .ok_or_else(|| out_of_range("read length"))?;
        let padded = wanted
            .checked_next_multiple_of(BLOCK_SIZE)
            .ok_or_else(|| out_of_range("read length"))?;
        let start = self.position(aligned)?;

        let mut raw = Vec::new();
        raw.try_reserve_exact(padded)
            .map_err(|_| Error::Allocation(padded))?;
        raw.resize(padded, 0);
        self.inner.seek(SeekFrom::Start(start))?;
        self.inner.read_exact(&mut raw)?;

        let plain = self
            .xtsn
            .decrypt(&raw, self.first_sector, self.params(aligned))?;
        Ok(plain[before as usize..wanted].to_vec())
    }
}

impl<S: Read + Write + Seek> XtsnStream<S> {
    /// Encrypts `data` in place at plaintext offset `offset`.
    ///
    /// Unaligned edges are completed from the current contents, which must
    /// therefore already exist.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| out_of_range("write length"))?;
        let before = offset % UNIT;
        let after = (UNIT - end % UNIT) % UNIT;
        let aligned = offset - before;

        let head = self.read_at(aligned, before as usize)?;
        let tail = self.read_at(end, after as usize)?;
        let mut plain = Vec::with_capacity(head.len() + data.len() + tail.len());
        plain.extend_from_slice(&head);
        plain.extend_from_slice(data);
        plain.extend_from_slice(&tail);

        let sealed = self
            .xtsn
            .encrypt(&plain, self.first_sector, self.params(aligned))?;
        let start = self.position(aligned)?;
        self.inner.seek(SeekFrom::Start(start))?;
        self.inner.write_all(&sealed)?;
        Ok(())
    }
}
