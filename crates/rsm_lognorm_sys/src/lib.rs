//! # rsm_lognorm_sys
//!
//! Raw ABI surface of the liblognorm normalization shim.
//!
//! This crate provides:
//! - `#[repr(C)]` records shared with the native side (`OptionsStruct`, `NormalizedStruct`)
//! - The notification callback type used for debug and error messages
//! - `LognormApi`, a table of the shim's exported functions
//! - Process-wide dynamic loading of the shim (`shared()`)
//!
//! Nothing here is safe to call directly. The `rsm_lognorm` crate wraps the
//! table in owned handles that enforce the context lifecycle.
//!
//! ## Features
//!
//! - `test-utils`: an in-process fake engine exposing the same table, used by
//!   the wrapper's tests when the native library is not installed.

mod error;
mod ffi;
mod library;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use error::LibraryError;
pub use ffi::{
    EXPECTED_RULEBASE_VERSION, LN_WRONGPARSER, NormalizedStruct, NotificationCallback,
    OptionsStruct,
};
pub use library::{
    LIBRARY_NAME, LIBRARY_PATH_ENV, LIBRARY_SEARCH_PATH_ENV, LoadedLibrary, LognormApi,
    library_candidates, shared, shared_from,
};
