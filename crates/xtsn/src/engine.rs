//! The XTSN streaming engine.
//!
//! Data is processed in sectors. Each sector gets a fresh tweak derived from
//! its index; every 16-byte unit inside it is XORed with the tweak, run
//! through AES under the crypt key, XORed again, and then the tweak is
//! doubled for the next unit. A non-zero `skip_bytes` starts the first
//! sector partway through, so any 16-byte-aligned range of an image can be
//! processed on its own.

use std::slice::ChunksExactMut;

use log::trace;
use xtsn_aes::{expand_key, Block, RoundKeySchedule, BLOCK_SIZE, KEY_SIZE};

use crate::backend::Backend;
use crate::cipher::{BlockCipher, Direction, SoftwareCipher};
use crate::error::{Error, KeyRole, Result};
use crate::sector::SectorOffset;
use crate::tweak::Tweak;

const UNIT: u64 = BLOCK_SIZE as u64;

/// Sector geometry of a single engine call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorParams {
    /// Bytes per sector. Non-zero multiple of 16.
    pub sector_size: u64,
    /// Bytes of the first sector that precede the buffer. Multiple of 16;
    /// may span several whole sectors.
    pub skip_bytes: u64,
}

impl SectorParams {
    /// Sector size used when none is given.
    pub const DEFAULT_SECTOR_SIZE: u64 = 0x200;

    /// Parameters with the given sector size and no skip.
    pub const fn new(sector_size: u64) -> Self {
        Self {
            sector_size,
            skip_bytes: 0,
        }
    }

    /// Returns a copy that skips `skip_bytes` into the first sector.
    pub const fn with_skip(self, skip_bytes: u64) -> Self {
        Self { skip_bytes, ..self }
    }

    fn validate(&self, len: usize) -> Result<()> {
        if len % BLOCK_SIZE != 0 {
            return Err(Error::MisalignedLength(len));
        }
        if self.skip_bytes % UNIT != 0 {
            return Err(Error::MisalignedSkip(self.skip_bytes));
        }
        if self.sector_size == 0 {
            return Err(Error::ZeroSectorSize);
        }
        if self.sector_size % UNIT != 0 {
            return Err(Error::MisalignedSectorSize(self.sector_size));
        }
        Ok(())
    }
}

impl Default for SectorParams {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SECTOR_SIZE)
    }
}

/// Walks a buffer one 16-byte unit at a time.
struct Cursor<'a> {
    blocks: ChunksExactMut<'a, u8>,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self {
            blocks: buf.chunks_exact_mut(BLOCK_SIZE),
        }
    }

    fn is_empty(&self) -> bool {
        self.blocks.len() == 0
    }

    fn next_block(&mut self) -> Option<&'a mut Block> {
        self.blocks.next().and_then(|chunk| chunk.try_into().ok())
    }
}

/// An AES-XTSN session: the expanded crypt and tweak keys.
///
/// Sessions are immutable after construction and may be shared between
/// threads.
#[derive(Clone, Debug)]
pub struct Xtsn {
    crypt: RoundKeySchedule,
    tweak: RoundKeySchedule,
}

impl Xtsn {
    /// Builds a session from two 16-byte keys.
    pub fn new(crypt_key: &[u8], tweak_key: &[u8]) -> Result<Self> {
        let crypt_key: &[u8; KEY_SIZE] = crypt_key.try_into().map_err(|_| Error::KeyLength {
            role: KeyRole::Crypt,
            len: crypt_key.len(),
        })?;
        let tweak_key: &[u8; KEY_SIZE] = tweak_key.try_into().map_err(|_| Error::KeyLength {
            role: KeyRole::Tweak,
            len: tweak_key.len(),
        })?;
        Ok(Self::from_keys(crypt_key, tweak_key))
    }

    /// Builds a session from keys already known to be 16 bytes.
    pub fn from_keys(crypt_key: &[u8; KEY_SIZE], tweak_key: &[u8; KEY_SIZE]) -> Self {
        Self {
            crypt: expand_key(crypt_key),
            tweak: expand_key(tweak_key),
        }
    }

    /// Encrypts `data` with the process-wide backend.
    pub fn encrypt(
        &self,
        data: &[u8],
        sector_offset: impl Into<SectorOffset>,
        params: SectorParams,
    ) -> Result<Vec<u8>> {
        self.crypt(&Backend::active(), Direction::Encrypt, data, sector_offset, params)
    }

    /// Decrypts `data` with the process-wide backend.
    pub fn decrypt(
        &self,
        data: &[u8],
        sector_offset: impl Into<SectorOffset>,
        params: SectorParams,
    ) -> Result<Vec<u8>> {
        self.crypt(&Backend::active(), Direction::Decrypt, data, sector_offset, params)
    }

    /// Transforms `data` on an explicit backend.
    pub fn crypt(
        &self,
        backend: &Backend,
        direction: Direction,
        data: &[u8],
        sector_offset: impl Into<SectorOffset>,
        params: SectorParams,
    ) -> Result<Vec<u8>> {
        match backend {
            Backend::Software => {
                self.crypt_with(&mut SoftwareCipher, direction, data, sector_offset, params)
            }
            Backend::Accelerated(library) => {
                if data.is_empty() {
                    return Ok(Vec::new());
                }
                params.validate(data.len())?;
                let mut cipher = library.cipher()?;
                self.crypt_with(&mut cipher, direction, data, sector_offset, params)
            }
        }
    }

    /// Transforms `data` with a caller-supplied block cipher.
    ///
    /// Returns a new buffer; `data` is never modified. On error nothing is
    /// returned, even if some units had already been transformed.
    pub fn crypt_with<C: BlockCipher + ?Sized>(
        &self,
        cipher: &mut C,
        direction: Direction,
        data: &[u8],
        sector_offset: impl Into<SectorOffset>,
        params: SectorParams,
    ) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        params.validate(data.len())?;

        let mut buf = working_copy(data)?;
        self.run(cipher, direction, &mut buf, sector_offset.into(), params)?;
        Ok(buf)
    }

    fn run<C: BlockCipher + ?Sized>(
        &self,
        cipher: &mut C,
        direction: Direction,
        buf: &mut [u8],
        mut sector: SectorOffset,
        params: SectorParams,
    ) -> Result<()> {
        trace!(
            "xtsn {direction:?}: sector offset {sector}, {} bytes, sector size {}, skipped {}",
            buf.len(),
            params.sector_size,
            params.skip_bytes
        );
        let mut cursor = Cursor::new(buf);

        let mut skip = params.skip_bytes;
        if skip != 0 {
            sector.step_by(skip / params.sector_size);
            skip %= params.sector_size;
            if skip != 0 {
                let mut tweak = Tweak::derive(sector, &self.tweak, cipher)?;
                tweak.advance(skip / UNIT);
                let units = (params.sector_size - skip) / UNIT;
                self.crypt_units(cipher, direction, &mut tweak, &mut cursor, units)?;
                sector.step();
            }
        }

        let units = params.sector_size / UNIT;
        while !cursor.is_empty() {
            let mut tweak = Tweak::derive(sector, &self.tweak, cipher)?;
            self.crypt_units(cipher, direction, &mut tweak, &mut cursor, units)?;
            sector.step();
        }
        Ok(())
    }

    fn crypt_units<C: BlockCipher + ?Sized>(
        &self,
        cipher: &mut C,
        direction: Direction,
        tweak: &mut Tweak,
        cursor: &mut Cursor<'_>,
        units: u64,
    ) -> Result<()> {
        for _ in 0..units {
            let Some(block) = cursor.next_block() else {
                break;
            };
            tweak.apply(block);
            cipher.crypt_block(&self.crypt, direction, block)?;
            tweak.apply(block);
            tweak.double();
        }
        Ok(())
    }
}

fn working_copy(data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(data.len())
        .map_err(|_| Error::Allocation(data.len()))?;
    buf.extend_from_slice(data);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Software AES that counts calls and can be told to fail.
    #[derive(Default)]
    struct Probe {
        calls: usize,
        fail_after: Option<usize>,
    }

    impl BlockCipher for Probe {
        fn crypt_block(
            &mut self,
            schedule: &RoundKeySchedule,
            direction: Direction,
            block: &mut Block,
        ) -> Result<()> {
            if self.fail_after == Some(self.calls) {
                return Err(Error::Backend);
            }
            self.calls += 1;
            SoftwareCipher.crypt_block(schedule, direction, block)
        }
    }

    fn session() -> Xtsn {
        Xtsn::from_keys(&[0x11; 16], &[0x22; 16])
    }

    #[test]
    fn empty_input_never_touches_the_cipher() {
        let mut probe = Probe::default();
        let out = session()
            .crypt_with(&mut probe, Direction::Encrypt, &[], 0u64, SectorParams::default())
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(probe.calls, 0);
    }

    #[test]
    fn empty_input_short_circuits_before_validation() {
        let out = session()
            .crypt(&Backend::Software, Direction::Decrypt, &[], 0u64, SectorParams::new(0))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn rejects_misaligned_parameters() {
        let xtsn = session();
        let mut probe = Probe::default();
        let data = [0u8; 32];

        let err = xtsn
            .crypt_with(&mut probe, Direction::Encrypt, &data[..17], 0u64, SectorParams::default())
            .unwrap_err();
        assert!(matches!(err, Error::MisalignedLength(17)));

        let err = xtsn
            .crypt_with(
                &mut probe,
                Direction::Encrypt,
                &data,
                0u64,
                SectorParams::default().with_skip(5),
            )
            .unwrap_err();
        assert!(matches!(err, Error::MisalignedSkip(5)));

        let err = xtsn
            .crypt_with(&mut probe, Direction::Encrypt, &data, 0u64, SectorParams::new(10))
            .unwrap_err();
        assert!(matches!(err, Error::MisalignedSectorSize(10)));

        let err = xtsn
            .crypt_with(&mut probe, Direction::Encrypt, &data, 0u64, SectorParams::new(0))
            .unwrap_err();
        assert!(matches!(err, Error::ZeroSectorSize));
        assert!(err.is_validation());

        assert_eq!(probe.calls, 0);
    }

    #[test]
    fn rejects_wrong_key_lengths() {
        let err = Xtsn::new(&[0u8; 15], &[0u8; 16]).unwrap_err();
        assert!(matches!(err, Error::KeyLength { role: KeyRole::Crypt, len: 15 }));
        let err = Xtsn::new(&[0u8; 16], &[0u8; 32]).unwrap_err();
        assert!(matches!(err, Error::KeyLength { role: KeyRole::Tweak, len: 32 }));
        assert_eq!(err.to_string(), "tweak key must be 16 bytes, got 32");
    }

    #[test]
    fn one_tweak_derivation_per_sector() {
        let mut probe = Probe::default();
        let data = vec![0u8; 1024];
        session()
            .crypt_with(&mut probe, Direction::Encrypt, &data, 0u64, SectorParams::default())
            .unwrap();
        // 64 data units plus one tweak per 512-byte sector.
        assert_eq!(probe.calls, 64 + 2);
    }

    #[test]
    fn backend_failure_discards_output() {
        let mut probe = Probe {
            fail_after: Some(10),
            ..Probe::default()
        };
        let data = vec![0xabu8; 512];
        let err = session()
            .crypt_with(&mut probe, Direction::Decrypt, &data, 3u64, SectorParams::default())
            .unwrap_err();
        assert!(matches!(err, Error::Backend));
        assert!(!err.is_validation());
        assert!(data.iter().all(|&b| b == 0xab));
    }

    #[test]
    fn skip_of_whole_sectors_only_moves_the_counter() {
        let xtsn = session();
        let data = vec![0x5au8; 512];
        let skipped = xtsn
            .crypt(
                &Backend::Software,
                Direction::Encrypt,
                &data,
                7u64,
                SectorParams::default().with_skip(1024),
            )
            .unwrap();
        let direct = xtsn
            .crypt(&Backend::Software, Direction::Encrypt, &data, 9u64, SectorParams::default())
            .unwrap();
        assert_eq!(skipped, direct);
    }

    #[test]
    fn cursor_yields_aligned_blocks() {
        let mut buf: Vec<u8> = (0..48).collect();
        let mut cursor = Cursor::new(&mut buf);
        assert!(!cursor.is_empty());
        assert_eq!(cursor.next_block().map(|b| b[0]), Some(0));
        assert_eq!(cursor.next_block().map(|b| b[0]), Some(16));
        assert_eq!(cursor.next_block().map(|b| b[15]), Some(47));
        assert!(cursor.is_empty());
        assert!(cursor.next_block().is_none());
    }
}
