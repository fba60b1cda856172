//! Block-cipher backend selection.
//!
//! The engine always has the software AES core. When a libcrypto of at
//! least version 1.1.0 can be found at runtime, its EVP interface is used
//! instead. Resolution happens once per process, on first use, and never
//! fails: every problem along the way falls back to software.
//!
//! Candidates are searched in two roots, the directory holding this code
//! and then the platform's default library path, trying each name from
//! [`CANDIDATES`] in order.

mod evp;
mod loader;

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info, warn};

pub use evp::{EvpCipher, EvpLibrary, MIN_VERSION};
pub use loader::{LoadedModule, ModuleLoader, SystemLoader, CANDIDATES};

use evp::Rejection;
use loader::search_paths;

/// Handle to the block cipher implementation an engine call runs on.
#[derive(Clone, Debug, Default)]
pub enum Backend {
    /// The built-in AES-128 core.
    #[default]
    Software,
    /// A dynamically loaded libcrypto.
    Accelerated(Arc<EvpLibrary>),
}

impl Backend {
    /// The process-wide backend, resolving it on first use.
    pub fn active() -> Self {
        resolve()
    }

    /// Returns true when this handle uses libcrypto.
    pub fn is_accelerated(&self) -> bool {
        matches!(self, Backend::Accelerated(_))
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Software => "software",
            Backend::Accelerated(_) => "libcrypto",
        }
    }
}

const UNINITIALIZED: u8 = 0;
const RESOLVED: u8 = 1;
const UNRESOLVED: u8 = 2;

/// Lazily resolved backend shared by every engine call in a process.
///
/// The status flag is written under `lock` and read without it. Once
/// resolved, calls also take the read side of `library` to clone the handle.
/// Readers never wait on each other, only on a concurrent teardown.
pub struct BackendState {
    status: AtomicU8,
    lock: Mutex<()>,
    library: RwLock<Option<Arc<EvpLibrary>>>,
}

impl BackendState {
    /// A state that has not been resolved yet.
    pub const fn new() -> Self {
        Self {
            status: AtomicU8::new(UNINITIALIZED),
            lock: Mutex::new(()),
            library: RwLock::new(None),
        }
    }

    /// The resolved backend, or `None` before resolution.
    pub fn current(&self) -> Option<Backend> {
        match self.status.load(Ordering::Acquire) {
            RESOLVED => {
                let slot = self.library.read().unwrap_or_else(PoisonError::into_inner);
                Some(slot.clone().map_or(Backend::Software, Backend::Accelerated))
            }
            UNRESOLVED => Some(Backend::Software),
            _ => None,
        }
    }

    /// Returns true once an accelerated library has been bound. Does not
    /// trigger resolution.
    pub fn is_accelerated(&self) -> bool {
        self.status.load(Ordering::Acquire) == RESOLVED
    }

    /// Resolves the backend with `loader`, probing `candidates`.
    ///
    /// Only the first caller does any work; concurrent callers wait on the
    /// lock and then observe its result.
    pub fn resolve_with(&self, loader: &dyn ModuleLoader, candidates: &[&str]) -> Backend {
        if let Some(backend) = self.current() {
            return backend;
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(backend) = self.current() {
            return backend;
        }

        match probe(loader, candidates) {
            Some(library) => {
                info!("using libcrypto from {}", library.path().display());
                *self.library.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::new(library));
                self.status.store(RESOLVED, Ordering::Release);
            }
            None => {
                info!("no usable libcrypto found, using software AES");
                self.status.store(UNRESOLVED, Ordering::Release);
            }
        }
        self.current().unwrap_or_default()
    }

    /// Releases a bound library and returns to the unresolved-yet state.
    ///
    /// Does nothing unless a library is bound, so repeated calls are
    /// harmless. Calls already holding a [`Backend`] keep the library loaded
    /// until they finish.
    pub fn teardown(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.status.load(Ordering::Acquire) != RESOLVED {
            return;
        }
        self.status.store(UNINITIALIZED, Ordering::Release);
        let released = self
            .library
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(library) = released {
            debug!("released libcrypto from {}", library.path().display());
        }
    }
}

impl Default for BackendState {
    fn default() -> Self {
        Self::new()
    }
}

static STATE: BackendState = BackendState::new();

/// Resolves the process-wide backend with the platform loader.
pub fn resolve() -> Backend {
    STATE.resolve_with(&SystemLoader, CANDIDATES)
}

/// Whether the process uses libcrypto, resolving first if needed.
pub fn is_accelerated() -> bool {
    resolve().is_accelerated()
}

/// Releases the process-wide libcrypto binding, if any.
pub fn shutdown() {
    STATE.teardown();
}

/// Searches for the first usable libcrypto among `candidates`.
pub fn probe(loader: &dyn ModuleLoader, candidates: &[&str]) -> Option<EvpLibrary> {
    let own_dir = loader.own_directory();
    search_paths(own_dir.as_deref(), candidates)
        .iter()
        .find_map(|path| open_candidate(loader, path))
}

fn open_candidate(loader: &dyn ModuleLoader, path: &Path) -> Option<EvpLibrary> {
    let Some(module) = loader.load(path) else {
        debug!("{}: not loadable", path.display());
        return None;
    };
    match EvpLibrary::open(module, path) {
        Ok(library) => Some(library),
        Err(Rejection::MissingSymbol(name)) => {
            debug!("{}: missing {}", path.display(), name.to_string_lossy());
            None
        }
        Err(Rejection::TooOld(version)) => {
            warn!(
                "found libcrypto at {} but its version {version:#x} is below 1.1.0, not using it",
                path.display()
            );
            None
        }
    }
}
