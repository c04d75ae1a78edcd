//! Process-wide binding to the native library.

use std::ffi::CStr;
use std::fmt;
use std::path::Path;

use rsm_lognorm_sys::LognormApi;
use tracing::error;

use crate::LognormError;

/// Handle to a bound export table.
///
/// Cheap to copy. Contexts are created and destroyed many times against the
/// one `Library` for the life of the process.
#[derive(Clone, Copy)]
pub struct Library {
    api: &'static LognormApi,
}

impl Library {
    /// Binds the shared library found on the default search path.
    pub fn system() -> Result<Self, LognormError> {
        rsm_lognorm_sys::shared()
            .map(Self::from_api)
            .map_err(bind_failed)
    }

    /// Binds the shared library at `path`.
    ///
    /// Only the first binding in a process takes effect.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LognormError> {
        rsm_lognorm_sys::shared_from(path)
            .map(Self::from_api)
            .map_err(bind_failed)
    }

    /// Wraps an already resolved export table.
    pub fn from_api(api: &'static LognormApi) -> Self {
        Self { api }
    }

    /// The in-process fake engine.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn fake() -> Self {
        Self::from_api(&rsm_lognorm_sys::test_utils::FAKE_API)
    }

    pub(crate) fn api(&self) -> &'static LognormApi {
        self.api
    }

    /// Version string of the underlying liblognorm.
    pub fn version(&self) -> String {
        // SAFETY: `version()` takes no arguments and returns a static string
        // or null.
        let raw = unsafe { (self.api.version)() };
        if raw.is_null() {
            return String::new();
        }
        // SAFETY: Non-null pointer to a NUL-terminated static string.
        unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned()
    }

    /// Whether the library was built with advanced statistics.
    pub fn has_advanced_stats(&self) -> bool {
        // SAFETY: No arguments, no ownership transfer.
        unsafe { (self.api.has_advanced_stats)() != 0 }
    }
}

fn bind_failed(err: rsm_lognorm_sys::LibraryError) -> LognormError {
    error!("Failed to bind the native normalization library: {}", err);
    err.into()
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("api", &(self.api as *const LognormApi))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_version() {
        assert_eq!(Library::fake().version(), "2.0.6");
    }

    #[test]
    fn test_fake_has_no_advanced_stats() {
        assert!(!Library::fake().has_advanced_stats());
    }

    #[test]
    fn test_open_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let result = Library::open(dir.path().join("missing.so"));
        assert!(matches!(result, Err(LognormError::Library(_))));
    }
}
