//! Normalization over a loaded context.

use std::ffi::{CStr, c_int, c_void};
use std::marker::PhantomData;
use std::ptr::NonNull;

use rsm_lognorm_sys::LognormApi;
use tracing::{debug, error};

use crate::handle::ContextHandle;
use crate::loader::{LoadState, RuleSource, RulebaseLoader, c_string};
use crate::{Library, LognormError};

/// A native result reference.
///
/// Owned and move-only: the only way to get text out is `into_string`, which
/// consumes the reference, so a result can be neither read twice nor
/// destroyed twice. Dropping without reading still destroys it.
struct NativeResult<'ctx> {
    api: &'static LognormApi,
    jref: NonNull<c_void>,
    _ctx: PhantomData<&'ctx ContextHandle>,
}

impl<'ctx> NativeResult<'ctx> {
    /// # Safety
    /// `jref` must be null or a result reference produced by `normalize` on
    /// `handle` that nothing else will destroy.
    unsafe fn from_raw(handle: &'ctx ContextHandle, jref: *mut c_void) -> Option<Self> {
        NonNull::new(jref).map(|jref| Self {
            api: handle.library().api(),
            jref,
            _ctx: PhantomData,
        })
    }

    /// Copies the result text out of native memory and destroys the result.
    fn into_string(self) -> String {
        // SAFETY: `jref` is live until `self` drops at the end of this call.
        let raw = unsafe { (self.api.read_result)(self.jref.as_ptr()) };
        if raw.is_null() {
            return String::new();
        }
        // SAFETY: `readResult` returns a NUL-terminated string owned by the
        // result, valid until `destroyResult`.
        unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned()
    }
}

impl Drop for NativeResult<'_> {
    fn drop(&mut self) {
        // SAFETY: The reference is owned by `self` and destroyed only here.
        unsafe { (self.api.destroy_result)(self.jref.as_ptr()) };
    }
}

/// A context with a loaded rulebase, ready to normalize.
///
/// Built by `LognormFactory`. The context is released by `close()` or on
/// drop, whichever comes first.
///
/// # Example
///
/// ```rust,ignore
/// use rsm_lognorm::{LognormFactory, RuleSource};
///
/// let mut session = LognormFactory::new(RuleSource::text("rule=:%all:rest%")).build()?;
/// assert_eq!(session.normalize("offline")?, r#"{ "all": "offline" }"#);
/// session.close()?;
/// ```
#[derive(Debug)]
pub struct NormalizationSession {
    handle: ContextHandle,
    loader: RulebaseLoader,
}

impl NormalizationSession {
    pub(crate) fn new(handle: ContextHandle, loader: RulebaseLoader) -> Self {
        Self { handle, loader }
    }

    /// Normalizes one line, returning the engine's JSON text unmodified.
    pub fn normalize(&mut self, text: &str) -> Result<String, LognormError> {
        let ctx = self.handle.raw()?;
        let api = self.handle.library().api();
        let c_text = c_string(text, "input text")?;

        self.handle.sink().reset_errors();
        let out = {
            let _scope = self.handle.sink().enter();
            // SAFETY: `ctx` is live and `c_text` outlives the call.
            unsafe { (api.normalize)(ctx.as_ptr(), c_text.as_ptr()) }
        };
        // SAFETY: The reference was just produced by `normalize` and is owned here.
        let result = unsafe { NativeResult::from_raw(&self.handle, out.jref) };

        match (out.rv, result) {
            (0, Some(result)) => Ok(result.into_string()),
            (0, None) => {
                error!("normalize() returned no result reference");
                Err(LognormError::NullResult)
            }
            (code, result) => {
                let diagnostic = result.map(NativeResult::into_string);
                error!(
                    "Failed to perform extraction with error code <{}>. \
                     Generated error information: <{}>",
                    code,
                    diagnostic.as_deref().unwrap_or("")
                );
                Err(LognormError::ExtractionFailed { code, diagnostic })
            }
        }
    }

    /// Normalizes one line and parses the result.
    pub fn normalize_value(&mut self, text: &str) -> Result<serde_json::Value, LognormError> {
        let json = self.normalize(text)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Loads additional rules into the session's context.
    pub fn load(&mut self, source: RuleSource) -> Result<(), LognormError> {
        self.loader.load(&self.handle, source)
    }

    pub fn load_state(&self) -> LoadState {
        self.loader.state()
    }

    /// Format version of the loaded rulebase.
    pub fn rulebase_version(&self) -> Result<c_int, LognormError> {
        self.handle.rulebase_version()
    }

    pub fn library(&self) -> Library {
        self.handle.library()
    }

    /// Whether the context has not been released.
    pub fn is_open(&self) -> bool {
        self.handle.is_live()
    }

    /// Releases the context. A second call fails with `NotInitialized`.
    pub fn close(&mut self) -> Result<(), LognormError> {
        debug!("Closing normalization session");
        self.handle.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{CallbackSink, register_debug_callback, register_error_callback};
    use crate::options::LognormOptions;
    use crate::test_support::{capture_logs, messages_at};
    use pretty_assertions::assert_eq;
    use rsm_lognorm_sys::LN_WRONGPARSER;
    use rsm_lognorm_sys::test_utils::{Faults, inject, live_contexts, live_results};
    use tracing::Level;

    fn session(rules: &str, options: LognormOptions) -> NormalizationSession {
        let handle =
            ContextHandle::acquire(Library::fake(), CallbackSink::with_aggregator()).unwrap();
        register_error_callback(&handle).unwrap();
        handle.set_options(options).unwrap();
        let mut loader = RulebaseLoader::new();
        loader.load(&handle, RuleSource::text(rules)).unwrap();
        NormalizationSession::new(handle, loader)
    }

    #[test]
    fn test_normalize() {
        let mut session = session("rule=:%all:rest%", LognormOptions::new());
        assert_eq!(session.normalize("offline").unwrap(), "{ \"all\": \"offline\" }");
    }

    #[test]
    fn test_normalize_releases_every_result() {
        let before = live_results();
        let mut session = session("rule=:ping", LognormOptions::new());
        session.normalize("ping").unwrap();
        let _ = session.normalize("pong");
        assert_eq!(live_results(), before);
    }

    #[test]
    fn test_extraction_failure_carries_diagnostic() {
        let mut session = session("rule=:ping", LognormOptions::new());

        let (result, events) = capture_logs(Level::ERROR, || session.normalize("pong"));
        match result {
            Err(LognormError::ExtractionFailed { code, diagnostic }) => {
                assert_eq!(code, LN_WRONGPARSER);
                assert_eq!(
                    diagnostic.as_deref(),
                    Some("{ \"originalmsg\": \"pong\", \"unparsed-data\": \"pong\" }")
                );
            }
            other => panic!("Expected ExtractionFailed, got {other:?}"),
        }
        let errors = messages_at(&events, Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("error code <-1000>"));
    }

    #[test]
    fn test_null_result() {
        let mut session = session("rule=:%all:rest%", LognormOptions::new());
        let _faults = inject(Faults {
            null_result: true,
            ..Default::default()
        });
        assert!(matches!(session.normalize("x"), Err(LognormError::NullResult)));
    }

    #[test]
    fn test_normalize_after_close() {
        let before = live_contexts();
        let mut session = session("rule=:%all:rest%", LognormOptions::new());
        session.close().unwrap();

        assert_eq!(live_contexts(), before);
        assert!(!session.is_open());
        let (result, events) = capture_logs(Level::ERROR, || session.normalize("offline"));
        assert!(matches!(result, Err(LognormError::NotInitialized)));
        assert_eq!(
            messages_at(&events, Level::ERROR),
            vec!["Context not initialized or already released".to_string()]
        );
        assert!(matches!(session.close(), Err(LognormError::NotInitialized)));
    }

    #[test]
    fn test_notifications_during_normalize_are_logged() {
        let handle =
            ContextHandle::acquire(Library::fake(), CallbackSink::with_aggregator()).unwrap();
        register_debug_callback(&handle).unwrap();
        let mut loader = RulebaseLoader::new();
        loader.load(&handle, RuleSource::text("rule=:%all:rest%")).unwrap();
        let mut session = NormalizationSession::new(handle, loader);

        let (result, events) = capture_logs(Level::DEBUG, || session.normalize("offline"));
        assert!(result.is_ok());
        assert!(
            messages_at(&events, Level::DEBUG)
                .contains(&"liblognorm: normalizing 'offline'".to_string())
        );
    }

    #[test]
    fn test_normalize_value() {
        let options = LognormOptions::new().with_original_msg(true);
        let mut session = session("rule=:%all:rest%", options);
        let value = session.normalize_value("offline").unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "all": "offline", "originalmsg": "offline" })
        );
    }

    #[test]
    fn test_load_more_rules() {
        let mut session = session("rule=:ping", LognormOptions::new());
        session.load(RuleSource::text("rule=:%all:rest%")).unwrap();
        assert_eq!(session.load_state(), LoadState::Loaded);
        assert_eq!(session.normalize("pong").unwrap(), "{ \"all\": \"pong\" }");
    }

    #[test]
    fn test_nul_input_rejected() {
        let mut session = session("rule=:%all:rest%", LognormOptions::new());
        let (result, events) = capture_logs(Level::ERROR, || session.normalize("a\0b"));

        assert!(matches!(result, Err(LognormError::InvalidArgument(_))));
        assert_eq!(
            messages_at(&events, Level::ERROR),
            vec!["input text contains a NUL byte at offset 1".to_string()]
        );
    }
}
