//! Rulebase loading.
//!
//! Loading is a small state machine:
//!
//! ```text
//! Unloaded -> Loading -> Loaded
//!                    \-> Failed   (terminal; build a new context to retry)
//! ```
//!
//! The two sources are deliberately not unified. The native library reports
//! a rulebase version after file loading only, so only file loading checks
//! it. Both variants treat any error notification as failure even when the
//! load call returned 0.

use std::ffi::{CString, c_int};
use std::fmt;
use std::path::{Path, PathBuf};

use rsm_lognorm_sys::EXPECTED_RULEBASE_VERSION;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::LognormError;
use crate::handle::ContextHandle;

/// Where rules come from. Consumed by one load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// Inline rule text, e.g. `rule=:%all:rest%`.
    Text(String),
    /// Path to a rulebase file.
    File(PathBuf),
}

impl RuleSource {
    pub fn text(rules: impl Into<String>) -> Self {
        Self::Text(rules.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "inline rules ({} bytes)", text.len()),
            Self::File(path) => write!(f, "rulebase file {}", path.display()),
        }
    }
}

/// Loader state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Drives rule loading for one context.
#[derive(Debug, Default)]
pub struct RulebaseLoader {
    state: LoadState,
}

impl RulebaseLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Loads `source` into the context.
    ///
    /// Further sources may be loaded on top of a `Loaded` rulebase. Once a
    /// load has failed, the context is not reused.
    pub fn load(&mut self, handle: &ContextHandle, source: RuleSource) -> Result<(), LognormError> {
        let refusal = match self.state {
            LoadState::Failed => Some("a previous rulebase load failed; create a new context"),
            LoadState::Loading => Some("a rulebase load is already in progress"),
            LoadState::Unloaded | LoadState::Loaded => None,
        };
        if let Some(reason) = refusal {
            error!("Refusing to load {}: {}", source, reason);
            return Err(LognormError::invalid_state(reason));
        }

        info!("Loading {}", source);
        self.state = LoadState::Loading;
        let result = match &source {
            RuleSource::Text(text) => load_from_text(handle, text),
            RuleSource::File(path) => load_from_file(handle, path),
        };
        self.state = match result {
            Ok(()) => LoadState::Loaded,
            Err(_) => LoadState::Failed,
        };
        result
    }
}

/// Loads inline rule text.
pub fn load_from_text(handle: &ContextHandle, text: &str) -> Result<(), LognormError> {
    let ctx = handle.raw()?;
    let text = c_string(text, "rule text")?;
    let api = handle.library().api();

    handle.sink().reset_errors();
    let code = {
        let _scope = handle.sink().enter();
        // SAFETY: `ctx` is live and `text` outlives the call.
        unsafe { (api.load_samples_from_string)(ctx.as_ptr(), text.as_ptr()) }
    };
    check_status("loadSamplesFromString", code, handle)?;
    handle.sink().check_errors()?;

    debug!("Loaded inline rules");
    Ok(())
}

/// Loads a rulebase file and verifies its format version.
pub fn load_from_file(handle: &ContextHandle, path: &Path) -> Result<(), LognormError> {
    let ctx = handle.raw()?;
    let path_str = path.to_str().ok_or_else(|| {
        error!("Rulebase path is not UTF-8: {}", path.display());
        LognormError::invalid_argument(format!("rulebase path is not UTF-8: {}", path.display()))
    })?;
    let c_path = c_string(path_str, "rulebase path")?;
    let api = handle.library().api();

    handle.sink().reset_errors();
    let code = {
        let _scope = handle.sink().enter();
        // SAFETY: `ctx` is live and `c_path` outlives the call.
        unsafe { (api.load_samples)(ctx.as_ptr(), c_path.as_ptr()) }
    };
    check_status("loadSamples", code, handle)?;
    handle.sink().check_errors()?;

    let version = handle.rulebase_version()?;
    if version != EXPECTED_RULEBASE_VERSION {
        error!(
            "Rulebase {} reports version {}, expected {}",
            path.display(),
            version,
            EXPECTED_RULEBASE_VERSION
        );
        return Err(LognormError::UnsupportedRulebaseVersion { found: version });
    }

    debug!("Loaded rulebase file {}", path.display());
    Ok(())
}

/// Converts `value` for the C boundary, rejecting interior NUL bytes.
pub(crate) fn c_string(value: &str, what: &str) -> Result<CString, LognormError> {
    CString::new(value).map_err(|e| {
        error!("{} contains a NUL byte at offset {}", what, e.nul_position());
        LognormError::invalid_argument(format!("{what} contains a NUL byte"))
    })
}

fn check_status(call: &str, code: c_int, handle: &ContextHandle) -> Result<(), LognormError> {
    if code == 0 {
        return Ok(());
    }
    error!(
        "{}() returned error code <{}> with <{}> error notifications",
        call,
        code,
        handle.sink().error_count()
    );
    Err(LognormError::LoadFailed { code })
}
