//! Single-block AES-128 through OpenSSL's libcrypto EVP interface.

use std::ffi::{c_int, c_ulong, c_void, CStr};
use std::fmt;
use std::mem;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use xtsn_aes::{Block, RoundKeySchedule, BLOCK_SIZE, KEY_SIZE};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::loader::LoadedModule;
use crate::cipher::{BlockCipher, Direction};
use crate::error::{Error, Result};

/// Oldest accepted `OpenSSL_version_num()` value (1.1.0).
pub const MIN_VERSION: u64 = 0x1010_0000;

type CtxNewFn = unsafe extern "C" fn() -> *mut c_void;
type CtxFreeFn = unsafe extern "C" fn(*mut c_void);
type CipherFn = unsafe extern "C" fn() -> *const c_void;
type CipherInitFn = unsafe extern "C" fn(
    *mut c_void,
    *const c_void,
    *mut c_void,
    *const u8,
    *const u8,
    c_int,
) -> c_int;
type KeyLengthFn = unsafe extern "C" fn(*const c_void) -> c_int;
type SetPaddingFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type CipherUpdateFn =
    unsafe extern "C" fn(*mut c_void, *mut u8, *mut c_int, *const u8, c_int) -> c_int;
type CipherFinalFn = unsafe extern "C" fn(*mut c_void, *mut u8, *mut c_int) -> c_int;
type VersionNumFn = unsafe extern "C" fn() -> c_ulong;

/// Entry points bound from a libcrypto candidate.
#[derive(Clone, Copy)]
struct EvpApi {
    ctx_new: CtxNewFn,
    ctx_free: CtxFreeFn,
    aes_128_ecb: CipherFn,
    cipher_init: CipherInitFn,
    key_length: KeyLengthFn,
    set_padding: SetPaddingFn,
    cipher_update: CipherUpdateFn,
    cipher_final: CipherFinalFn,
    version_num: VersionNumFn,
}

/// Looks up the first of `names` exported by `module`.
///
/// # Safety
///
/// `F` must be an `extern "C"` function pointer type matching the real
/// signature of the symbol.
unsafe fn lookup<F: Copy>(
    module: &dyn LoadedModule,
    names: &[&'static CStr],
) -> std::result::Result<F, &'static CStr> {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut c_void>());
    names
        .iter()
        .find_map(|name| module.symbol(name))
        // SAFETY: upheld by the caller.
        .map(|addr| unsafe { mem::transmute_copy::<*mut c_void, F>(&addr.as_ptr()) })
        .ok_or(names[0])
}

impl EvpApi {
    fn bind(module: &dyn LoadedModule) -> std::result::Result<Self, &'static CStr> {
        // SAFETY: each type alias mirrors the prototype in OpenSSL's evp.h / crypto.h.
        unsafe {
            Ok(Self {
                ctx_new: lookup(module, &[c"EVP_CIPHER_CTX_new"])?,
                ctx_free: lookup(module, &[c"EVP_CIPHER_CTX_free"])?,
                aes_128_ecb: lookup(module, &[c"EVP_aes_128_ecb"])?,
                cipher_init: lookup(module, &[c"EVP_CipherInit_ex"])?,
                key_length: lookup(
                    module,
                    &[c"EVP_CIPHER_CTX_key_length", c"EVP_CIPHER_CTX_get_key_length"],
                )?,
                set_padding: lookup(module, &[c"EVP_CIPHER_CTX_set_padding"])?,
                cipher_update: lookup(module, &[c"EVP_CipherUpdate"])?,
                cipher_final: lookup(module, &[c"EVP_CipherFinal_ex"])?,
                version_num: lookup(module, &[c"OpenSSL_version_num"])?,
            })
        }
    }
}

/// Why a loaded candidate was not accepted.
#[derive(Debug)]
pub(crate) enum Rejection {
    MissingSymbol(&'static CStr),
    TooOld(u64),
}

/// A validated libcrypto, kept loaded for as long as this value lives.
pub struct EvpLibrary {
    api: EvpApi,
    version: u64,
    path: PathBuf,
    // Must outlive every use of `api`.
    _module: Box<dyn LoadedModule>,
}

impl EvpLibrary {
    /// Binds and version-checks a loaded candidate. Dropping the module on
    /// rejection unloads it.
    pub(crate) fn open(
        module: Box<dyn LoadedModule>,
        path: &Path,
    ) -> std::result::Result<Self, Rejection> {
        let api = EvpApi::bind(module.as_ref()).map_err(Rejection::MissingSymbol)?;
        // SAFETY: OpenSSL_version_num takes no arguments and has no preconditions.
        let version = u64::from(unsafe { (api.version_num)() });
        if version < MIN_VERSION {
            return Err(Rejection::TooOld(version));
        }
        Ok(Self {
            api,
            version,
            path: path.to_path_buf(),
            _module: module,
        })
    }

    /// Raw `OpenSSL_version_num()` of the library.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a cipher context for one engine call.
    pub fn cipher(&self) -> Result<EvpCipher<'_>> {
        // SAFETY: EVP_CIPHER_CTX_new has no preconditions; null means failure.
        let ctx = NonNull::new(unsafe { (self.api.ctx_new)() }).ok_or(Error::Backend)?;
        Ok(EvpCipher {
            api: &self.api,
            ctx,
            keyed: KeyCache::default(),
        })
    }
}

impl fmt::Debug for EvpLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvpLibrary")
            .field("path", &self.path)
            .field("version", &format_args!("{:#x}", self.version))
            .finish()
    }
}

/// Key and direction an `EVP_CIPHER_CTX` was last fully initialised with.
/// The key copy is wiped when cleared or dropped.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
struct KeyCache {
    key: [u8; KEY_SIZE],
    #[zeroize(skip)]
    direction: Option<Direction>,
}

impl KeyCache {
    fn holds(&self, key: &[u8; KEY_SIZE], direction: Direction) -> bool {
        self.direction == Some(direction) && self.key == *key
    }

    fn store(&mut self, key: &[u8; KEY_SIZE], direction: Direction) {
        self.key = *key;
        self.direction = Some(direction);
    }

    fn clear(&mut self) {
        self.zeroize();
        self.direction = None;
    }
}

/// An `EVP_CIPHER_CTX` bound to one engine call.
///
/// The context is keyed lazily: a full init only happens when the key or
/// direction changes, otherwise it is reset in place before each block.
pub struct EvpCipher<'a> {
    api: &'a EvpApi,
    ctx: NonNull<c_void>,
    keyed: KeyCache,
}

impl EvpCipher<'_> {
    fn init(&mut self, key: &[u8; KEY_SIZE], direction: Direction) -> Result<()> {
        let ctx = self.ctx.as_ptr();
        let enc = c_int::from(direction == Direction::Encrypt);
        let api = self.api;
        // SAFETY: `ctx` is a live context; key and IV pointers are either null
        // (keep the current key) or point at 16 readable bytes.
        unsafe {
            if self.keyed.holds(key, direction) {
                let status = (api.cipher_init)(
                    ctx,
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null(),
                    ptr::null(),
                    enc,
                );
                if status != 1 {
                    return Err(Error::Backend);
                }
            } else {
                self.keyed.clear();
                let ecb = (api.aes_128_ecb)();
                let status =
                    (api.cipher_init)(ctx, ecb, ptr::null_mut(), key.as_ptr(), ptr::null(), enc);
                if status != 1 {
                    return Err(Error::Backend);
                }
                if (api.key_length)(ctx) != KEY_SIZE as c_int {
                    return Err(Error::Backend);
                }
                self.keyed.store(key, direction);
            }
            (api.set_padding)(ctx, 0);
        }
        Ok(())
    }
}

impl BlockCipher for EvpCipher<'_> {
    fn crypt_block(
        &mut self,
        schedule: &RoundKeySchedule,
        direction: Direction,
        block: &mut Block,
    ) -> Result<()> {
        self.init(schedule.master_key(), direction)?;

        let ctx = self.ctx.as_ptr();
        // Update may write up to one extra block when padding is misconfigured.
        let mut out = [0u8; 2 * BLOCK_SIZE];
        let mut written: c_int = 0;
        let mut tail: c_int = 0;
        // SAFETY: `out` has room for 32 bytes and `block` holds 16 readable bytes.
        unsafe {
            let status = (self.api.cipher_update)(
                ctx,
                out.as_mut_ptr(),
                &mut written,
                block.as_ptr(),
                BLOCK_SIZE as c_int,
            );
            if status != 1 {
                return Err(Error::Backend);
            }
            let Ok(done) = usize::try_from(written) else {
                return Err(Error::Backend);
            };
            if done > BLOCK_SIZE {
                return Err(Error::Backend);
            }
            if (self.api.cipher_final)(ctx, out.as_mut_ptr().add(done), &mut tail) != 1 {
                return Err(Error::Backend);
            }
        }
        if written + tail != BLOCK_SIZE as c_int {
            return Err(Error::Backend);
        }
        block.copy_from_slice(&out[..BLOCK_SIZE]);
        Ok(())
    }
}

impl Drop for EvpCipher<'_> {
    fn drop(&mut self) {
        // SAFETY: the context was allocated by EVP_CIPHER_CTX_new and is freed once.
        unsafe { (self.api.ctx_free)(self.ctx.as_ptr()) }
    }
}
