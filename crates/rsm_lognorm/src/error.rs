//! Wrapper error types.

use std::ffi::c_int;

use thiserror::Error;

use crate::callback::CallbackChannel;

/// Errors surfaced by the context lifecycle, loading, and normalization.
///
/// Every non-zero status or null pointer returned by the native side is
/// converted into one of these at the call site.
#[derive(Debug, Error)]
pub enum LognormError {
    /// `initCtx()` returned a null handle.
    #[error(
        "initCtx() returned a null pointer, the native library failed to initialize the context"
    )]
    InitializationFailed,

    /// The context was never acquired or has already been released.
    #[error("Context not initialized or already released")]
    NotInitialized,

    /// `exitCtx()` returned a non-zero status.
    #[error("exitCtx() returned {code} instead of 0")]
    ReleaseFailed { code: c_int },

    /// Registering a notification callback returned a non-zero status.
    #[error("Registering the {channel} callback returned {code} instead of 0")]
    CallbackRegistrationFailed { channel: CallbackChannel, code: c_int },

    /// A rulebase load call returned a non-zero status.
    #[error("Rulebase loading returned {code} instead of 0")]
    LoadFailed { code: c_int },

    /// A file rulebase did not use the supported format version.
    #[error("Loaded rulebase is not using version 2 (reported version {found})")]
    UnsupportedRulebaseVersion { found: c_int },

    /// The native side reported errors through the error callback.
    #[error("<{count}> liblognorm errors have occurred, see logs for details")]
    AggregatedValidationFailed { count: usize, messages: Vec<String> },

    /// `normalize()` returned a non-zero status.
    #[error("Normalization failed with error code {code}")]
    ExtractionFailed {
        code: c_int,
        diagnostic: Option<String>,
    },

    /// `normalize()` returned neither a status nor a result reference.
    #[error("Normalization returned no result reference")]
    NullResult,

    /// The native library could not be bound.
    #[error("Native library error: {0}")]
    Library(String),

    /// An argument cannot be passed across the C boundary.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not allowed in the current loader state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LognormError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// The native status code carried by this error, if any.
    pub fn native_code(&self) -> Option<c_int> {
        match self {
            Self::ReleaseFailed { code }
            | Self::CallbackRegistrationFailed { code, .. }
            | Self::LoadFailed { code }
            | Self::ExtractionFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<rsm_lognorm_sys::LibraryError> for LognormError {
    fn from(err: rsm_lognorm_sys::LibraryError) -> Self {
        Self::Library(err.to_string())
    }
}
