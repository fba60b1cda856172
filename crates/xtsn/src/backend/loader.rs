//! Loadable-module abstraction and the platform loader behind it.

use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// A dynamically loaded library. Dropping it unloads the library.
pub trait LoadedModule: Send + Sync {
    /// Address of the exported symbol `name`, if present.
    fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>>;
}

/// Loads libraries by path or bare name.
pub trait ModuleLoader {
    /// Loads `path`. A bare file name goes through the platform's default
    /// library search path.
    fn load(&self, path: &Path) -> Option<Box<dyn LoadedModule>>;

    /// Directory containing the code of this crate, if it can be determined.
    fn own_directory(&self) -> Option<PathBuf>;
}

/// Library names probed for libcrypto, in order.
#[cfg(all(windows, target_pointer_width = "64"))]
pub const CANDIDATES: &[&str] = &[
    "libcrypto-3-x64.dll",
    "libcrypto-1_1-x64.dll",
    "libcrypto-x64.dll",
    "libcrypto-1_1.dll",
    "libcrypto.dll",
];

/// Library names probed for libcrypto, in order.
#[cfg(all(windows, not(target_pointer_width = "64")))]
pub const CANDIDATES: &[&str] = &["libcrypto-3.dll", "libcrypto-1_1.dll", "libcrypto.dll"];

/// Library names probed for libcrypto, in order.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub const CANDIDATES: &[&str] = &["libcrypto.3.dylib", "libcrypto.1.1.dylib", "libcrypto.dylib"];

/// Library names probed for libcrypto, in order.
#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
pub const CANDIDATES: &[&str] = &[
    "libcrypto.so",
    "libcrypto.so.3",
    "libcrypto.so.1.1",
    "libcrypto.so.111",
];

/// Library names probed for libcrypto, in order.
#[cfg(not(any(unix, windows)))]
pub const CANDIDATES: &[&str] = &[];

/// The loader for the current platform.
///
/// On Unix this wraps `dlopen`/`dlsym`/`dlclose`, on Windows
/// `LoadLibraryExW`/`GetProcAddress`/`FreeLibrary`. Elsewhere every load
/// fails, which leaves the software core in use.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLoader;

#[cfg(unix)]
mod dl {
    use std::ffi::{c_void, CStr, CString, OsStr};
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};
    use std::ptr::NonNull;

    use super::{LoadedModule, ModuleLoader, SystemLoader};

    /// Anchor whose address identifies the object file this crate lives in.
    static ANCHOR: u8 = 0;

    struct DlModule {
        handle: NonNull<c_void>,
    }

    // SAFETY: dlopen handles are process-global and dlsym/dlclose are thread-safe.
    unsafe impl Send for DlModule {}
    unsafe impl Sync for DlModule {}

    impl LoadedModule for DlModule {
        fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>> {
            // SAFETY: the handle stays open until drop and `name` is NUL-terminated.
            NonNull::new(unsafe { libc::dlsym(self.handle.as_ptr(), name.as_ptr()) })
        }
    }

    impl Drop for DlModule {
        fn drop(&mut self) {
            // SAFETY: the handle came from a successful dlopen and is closed once.
            unsafe {
                libc::dlclose(self.handle.as_ptr());
            }
        }
    }

    impl ModuleLoader for SystemLoader {
        fn load(&self, path: &Path) -> Option<Box<dyn LoadedModule>> {
            let name = CString::new(path.as_os_str().as_bytes()).ok()?;
            // SAFETY: `name` is a valid C string; RTLD_NOW resolves everything up front.
            let handle = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOW) };
            let handle = NonNull::new(handle)?;
            Some(Box::new(DlModule { handle }))
        }

        fn own_directory(&self) -> Option<PathBuf> {
            // SAFETY: Dl_info is plain data; dladdr fills it for any mapped address.
            let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
            let addr = std::ptr::addr_of!(ANCHOR).cast::<c_void>();
            if unsafe { libc::dladdr(addr, &mut info) } == 0 || info.dli_fname.is_null() {
                return None;
            }
            // SAFETY: dladdr returned a NUL-terminated file name owned by the loader.
            let fname = unsafe { CStr::from_ptr(info.dli_fname) };
            let path = std::fs::canonicalize(OsStr::from_bytes(fname.to_bytes())).ok()?;
            path.parent().map(Path::to_path_buf)
        }
    }
}

#[cfg(windows)]
mod win {
    use std::ffi::{c_void, CStr, OsString};
    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use std::path::{Path, PathBuf};
    use std::ptr::{self, NonNull};

    use windows_sys::Win32::Foundation::{FreeLibrary, HMODULE};
    use windows_sys::Win32::System::LibraryLoader::{
        GetModuleFileNameW, GetModuleHandleExW, GetProcAddress, LoadLibraryExW,
        GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS, GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
        LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
    };

    use super::{LoadedModule, ModuleLoader, SystemLoader};

    /// Longest path `GetModuleFileNameW` can report.
    const MAX_PATH_WIDE: usize = 32_768;

    /// Anchor whose address identifies the module this crate lives in.
    static ANCHOR: u8 = 0;

    struct WinModule {
        handle: HMODULE,
    }

    // SAFETY: module handles are process-global and GetProcAddress/FreeLibrary
    // are thread-safe.
    unsafe impl Send for WinModule {}
    unsafe impl Sync for WinModule {}

    impl LoadedModule for WinModule {
        fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>> {
            // SAFETY: the handle stays loaded until drop and `name` is NUL-terminated.
            let proc = unsafe { GetProcAddress(self.handle, name.as_ptr().cast()) }?;
            NonNull::new(proc as *mut c_void)
        }
    }

    impl Drop for WinModule {
        fn drop(&mut self) {
            // SAFETY: the handle came from a successful LoadLibraryExW and is freed once.
            unsafe {
                FreeLibrary(self.handle);
            }
        }
    }

    fn wide(path: &Path) -> Option<Vec<u16>> {
        let mut name: Vec<u16> = path.as_os_str().encode_wide().collect();
        if name.contains(&0) {
            return None;
        }
        name.push(0);
        Some(name)
    }

    impl ModuleLoader for SystemLoader {
        fn load(&self, path: &Path) -> Option<Box<dyn LoadedModule>> {
            let name = wide(path)?;
            // SAFETY: `name` is NUL-terminated UTF-16 and no file handle is passed.
            let handle = unsafe {
                LoadLibraryExW(name.as_ptr(), ptr::null_mut(), LOAD_LIBRARY_SEARCH_DEFAULT_DIRS)
            };
            if handle.is_null() {
                return None;
            }
            Some(Box::new(WinModule { handle }))
        }

        fn own_directory(&self) -> Option<PathBuf> {
            let mut module: HMODULE = ptr::null_mut();
            let flags = GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS
                | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT;
            let addr = ptr::addr_of!(ANCHOR).cast::<u16>();
            // SAFETY: FROM_ADDRESS treats `addr` as an address inside a mapped
            // module and UNCHANGED_REFCOUNT leaves nothing to release.
            if unsafe { GetModuleHandleExW(flags, addr, &mut module) } == 0 {
                return None;
            }
            let mut buf = vec![0u16; MAX_PATH_WIDE];
            // SAFETY: `buf` holds MAX_PATH_WIDE writable units.
            let len = unsafe { GetModuleFileNameW(module, buf.as_mut_ptr(), MAX_PATH_WIDE as u32) };
            let len = len as usize;
            if len == 0 || len >= MAX_PATH_WIDE {
                return None;
            }
            let path = PathBuf::from(OsString::from_wide(&buf[..len]));
            path.parent().map(Path::to_path_buf)
        }
    }
}

#[cfg(not(any(unix, windows)))]
impl ModuleLoader for SystemLoader {
    fn load(&self, _path: &Path) -> Option<Box<dyn LoadedModule>> {
        None
    }

    fn own_directory(&self) -> Option<PathBuf> {
        None
    }
}

/// Paths probed for `candidates`: every name under `own_dir` first, then
/// every bare name for the default search path.
pub(crate) fn search_paths(own_dir: Option<&Path>, candidates: &[&str]) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(candidates.len() * 2);
    if let Some(dir) = own_dir {
        paths.extend(candidates.iter().map(|name| dir.join(name)));
    }
    paths.extend(candidates.iter().map(PathBuf::from));
    paths
}
