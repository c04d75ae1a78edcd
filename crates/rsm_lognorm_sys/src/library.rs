//! Dynamic loading of the normalization shim.
//!
//! The shim is loaded at most once per process and never unloaded. Every
//! context created through the wrapper calls into the same `LognormApi`.
//!
//! # Search order
//!
//! 1. `RSM_LOGNORM_LIBRARY` environment variable (path to the library file)
//! 2. `RSM_LOGNORM_PATH` environment variable (colon-separated directories)
//! 3. The platform's dynamic linker lookup of `librsmlognorm`
//!
//! # Lifetime Requirements
//!
//! The function pointers in a `LognormApi` point into the library's mapped
//! code. A `LognormApi` copied out of a `LoadedLibrary` must not be called
//! after that `LoadedLibrary` is dropped. `shared()` sidesteps this by
//! keeping the library in a process-lifetime static.

use std::ffi::{OsStr, OsString, c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libloading::Library;
use tracing::{debug, info};

use crate::LibraryError;
use crate::ffi::{NormalizedStruct, NotificationCallback, OptionsStruct};

/// Base name of the shim, without platform prefix or suffix.
pub const LIBRARY_NAME: &str = "rsmlognorm";

/// Environment variable naming the library file explicitly.
pub const LIBRARY_PATH_ENV: &str = "RSM_LOGNORM_LIBRARY";

/// Environment variable listing directories to search for the library.
pub const LIBRARY_SEARCH_PATH_ENV: &str = "RSM_LOGNORM_PATH";

/// Exported functions of the shim.
#[derive(Debug, Clone, Copy)]
pub struct LognormApi {
    pub version: unsafe extern "C" fn() -> *const c_char,
    pub init_ctx: unsafe extern "C" fn() -> *mut c_void,
    pub exit_ctx: unsafe extern "C" fn(ctx: *mut c_void) -> c_int,
    pub set_ctx_opts: unsafe extern "C" fn(ctx: *mut c_void, opts: *const OptionsStruct),
    pub has_advanced_stats: unsafe extern "C" fn() -> c_int,
    pub load_samples: unsafe extern "C" fn(ctx: *mut c_void, path: *const c_char) -> c_int,
    pub load_samples_from_string:
        unsafe extern "C" fn(ctx: *mut c_void, text: *const c_char) -> c_int,
    pub rulebase_version: unsafe extern "C" fn(ctx: *mut c_void) -> c_int,
    pub normalize: unsafe extern "C" fn(ctx: *mut c_void, text: *const c_char) -> NormalizedStruct,
    pub read_result: unsafe extern "C" fn(jref: *mut c_void) -> *const c_char,
    pub destroy_result: unsafe extern "C" fn(jref: *mut c_void),
    pub set_debug_cb:
        unsafe extern "C" fn(ctx: *mut c_void, cb: Option<NotificationCallback>) -> c_int,
    pub set_err_msg_cb:
        unsafe extern "C" fn(ctx: *mut c_void, cb: Option<NotificationCallback>) -> c_int,
}

/// An opened shim with its resolved exports.
///
/// The `_library` field keeps the code mapped; `api` points into it.
pub struct LoadedLibrary {
    _library: Library,
    api: LognormApi,
    path: PathBuf,
}

impl LoadedLibrary {
    /// Opens the library at `path` and resolves every export.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        // SAFETY: Opening a shared library runs its initialisers. The shim is
        // a thin C layer over liblognorm with no constructors of its own.
        let library = unsafe { Library::new(path) }.map_err(|source| LibraryError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let api = LognormApi {
            version: symbol(&library, "version")?,
            init_ctx: symbol(&library, "initCtx")?,
            exit_ctx: symbol(&library, "exitCtx")?,
            set_ctx_opts: symbol(&library, "setCtxOpts")?,
            has_advanced_stats: symbol(&library, "hasAdvancedStats")?,
            load_samples: symbol(&library, "loadSamples")?,
            load_samples_from_string: symbol(&library, "loadSamplesFromString")?,
            rulebase_version: symbol(&library, "rulebaseVersion")?,
            normalize: symbol(&library, "normalize")?,
            read_result: symbol(&library, "readResult")?,
            destroy_result: symbol(&library, "destroyResult")?,
            set_debug_cb: symbol(&library, "setDebugCB")?,
            set_err_msg_cb: symbol(&library, "setErrMsgCB")?,
        };

        info!("Loaded native normalization library: {}", path.display());

        Ok(Self {
            _library: library,
            api,
            path: path.to_path_buf(),
        })
    }

    /// Opens the first loadable candidate from `library_candidates()`.
    pub fn open_default() -> Result<Self, LibraryError> {
        Self::open_first(&library_candidates())
    }

    /// Opens the first candidate that loads.
    pub fn open_first(candidates: &[PathBuf]) -> Result<Self, LibraryError> {
        let mut tried = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match Self::open(candidate) {
                Ok(loaded) => return Ok(loaded),
                Err(e) => {
                    debug!("Skipping library candidate {}: {}", candidate.display(), e);
                    tried.push(candidate.display().to_string());
                }
            }
        }
        Err(LibraryError::NotFound { tried })
    }

    /// The resolved export table.
    pub fn api(&self) -> &LognormApi {
        &self.api
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T, LibraryError> {
    // SAFETY: `T` is the function pointer type declared for `name` in
    // `LognormApi`, which mirrors the shim's C prototypes.
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|sym| *sym)
        .map_err(|source| LibraryError::MissingSymbol { name, source })
}

/// Candidate library locations in search order.
pub fn library_candidates() -> Vec<PathBuf> {
    candidates_from(
        std::env::var_os(LIBRARY_PATH_ENV),
        std::env::var_os(LIBRARY_SEARCH_PATH_ENV),
    )
}

fn candidates_from(explicit: Option<OsString>, search: Option<OsString>) -> Vec<PathBuf> {
    let file_name = libloading::library_filename(LIBRARY_NAME);
    let mut paths = Vec::new();

    if let Some(explicit) = explicit.filter(|p| !p.is_empty()) {
        paths.push(PathBuf::from(explicit));
    }

    if let Some(search) = search {
        for dir in std::env::split_paths(&search) {
            if !dir.as_os_str().is_empty() {
                paths.push(dir.join(&file_name));
            }
        }
    }

    // Bare file name defers to the dynamic linker's own search.
    paths.push(PathBuf::from(OsStr::new(&file_name)));
    paths
}

static SHARED: OnceLock<LoadedLibrary> = OnceLock::new();

/// The process-wide shim, loaded on first use from the default candidates.
pub fn shared() -> Result<&'static LognormApi, LibraryError> {
    shared_with(LoadedLibrary::open_default)
}

/// The process-wide shim, loaded on first use from `path`.
///
/// If the shim is already loaded, the existing binding is returned and
/// `path` is ignored.
pub fn shared_from(path: impl AsRef<Path>) -> Result<&'static LognormApi, LibraryError> {
    shared_with(|| LoadedLibrary::open(path))
}

fn shared_with(
    open: impl FnOnce() -> Result<LoadedLibrary, LibraryError>,
) -> Result<&'static LognormApi, LibraryError> {
    if let Some(loaded) = SHARED.get() {
        return Ok(loaded.api());
    }

    let loaded = open()?;
    if let Err(duplicate) = SHARED.set(loaded) {
        debug!(
            "Native library already bound by another thread, dropping {}",
            duplicate.path().display()
        );
    }

    SHARED
        .get()
        .map(LoadedLibrary::api)
        .ok_or_else(|| LibraryError::NotFound { tried: Vec::new() })
}
