//! Library loading error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while binding the native library.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The shared library could not be opened.
    #[error("Failed to open native library '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// A required export is missing from the library.
    #[error("Native library is missing symbol '{name}': {source}")]
    MissingSymbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// None of the candidate locations held a loadable library.
    #[error("Native library not found (tried: {})", .tried.join(", "))]
    NotFound { tried: Vec<String> },
}
