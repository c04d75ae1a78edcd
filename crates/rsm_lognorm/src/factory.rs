//! Builds ready-to-use normalization sessions.

use std::path::PathBuf;

use tracing::debug;

use crate::callback::{
    CallbackSink, debug_enabled, register_debug_callback, register_error_callback,
};
use crate::handle::ContextHandle;
use crate::loader::{RuleSource, RulebaseLoader};
use crate::options::LognormOptions;
use crate::session::NormalizationSession;
use crate::{Library, LognormError};

/// Recipe for a `NormalizationSession`.
///
/// Each `build()` creates and configures a fresh context:
///
/// 1. acquire the context
/// 2. register the error callback (always) and the debug callback (when
///    debug logging is enabled, or when forced with `with_debug`)
/// 3. apply options
/// 4. load the rule source
///
/// Any failure releases the context before the error is returned.
///
/// # Example
///
/// ```rust,ignore
/// use rsm_lognorm::{LognormFactory, LognormOptions};
///
/// let factory = LognormFactory::from_text("rule=:%all:rest%")
///     .with_options(LognormOptions::new().with_original_msg(true));
/// let mut session = factory.build()?;
/// let json = session.normalize("offline")?;
/// ```
#[derive(Debug, Clone)]
pub struct LognormFactory {
    source: RuleSource,
    options: LognormOptions,
    library: Option<Library>,
    debug: Option<bool>,
}

impl LognormFactory {
    /// A factory with default options bound to the system library.
    pub fn new(source: RuleSource) -> Self {
        Self {
            source,
            options: LognormOptions::default(),
            library: None,
            debug: None,
        }
    }

    /// Inline rule text.
    pub fn from_text(rules: impl Into<String>) -> Self {
        Self::new(RuleSource::text(rules))
    }

    /// A rulebase file. Relative paths are made absolute against the
    /// current directory now, not at build time.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        Self::new(RuleSource::File(path))
    }

    pub fn with_options(mut self, options: LognormOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses `library` instead of the process-wide system binding.
    pub fn with_library(mut self, library: Library) -> Self {
        self.library = Some(library);
        self
    }

    /// Forces the debug callback on or off regardless of the log level.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = Some(enabled);
        self
    }

    pub fn source(&self) -> &RuleSource {
        &self.source
    }

    pub fn options(&self) -> LognormOptions {
        self.options
    }

    /// Creates, configures, and loads a new context.
    pub fn build(&self) -> Result<NormalizationSession, LognormError> {
        let library = match self.library {
            Some(library) => library,
            None => Library::system()?,
        };

        let handle = ContextHandle::acquire(library, CallbackSink::with_aggregator())?;
        register_error_callback(&handle)?;
        if self.debug.unwrap_or_else(debug_enabled) {
            register_debug_callback(&handle)?;
        }
        handle.set_options(self.options)?;

        let mut loader = RulebaseLoader::new();
        loader.load(&handle, self.source.clone())?;

        debug!("Normalization session ready ({})", self.source);
        Ok(NormalizationSession::new(handle, loader))
    }
}
