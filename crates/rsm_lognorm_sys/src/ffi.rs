//! C records and callback types shared with the shim.

use std::ffi::{c_char, c_int, c_void};

/// Status returned by `normalize` when no rule matched the input.
pub const LN_WRONGPARSER: c_int = -1000;

/// The only rulebase format version accepted after file loading.
pub const EXPECTED_RULEBASE_VERSION: c_int = 2;

/// Context options in the order the shim reads them.
///
/// The field order is the binary contract with the native side. Adding or
/// reordering fields breaks every shim build in the wild.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsStruct {
    pub allow_regex: c_int,
    pub add_exec_path: c_int,
    pub add_original_msg: c_int,
    pub add_rule: c_int,
    pub add_rule_location: c_int,
}

/// Outcome of a `normalize` call: status plus an opaque result reference.
///
/// `jref` may be null. When it is not, it must be passed to `destroyResult`
/// exactly once.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NormalizedStruct {
    pub rv: c_int,
    pub jref: *mut c_void,
}

/// Debug / error notification entry point.
///
/// Arguments are a correlation token chosen by the native side, the message
/// bytes and the message length. The token is opaque to the wrapper. The
/// message is only valid for the duration of the call.
pub type NotificationCallback =
    unsafe extern "C" fn(token: *mut c_void, msg: *const c_char, len: usize);
