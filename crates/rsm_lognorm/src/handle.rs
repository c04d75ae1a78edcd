//! Owned native context.

use std::ffi::{c_int, c_void};
use std::fmt;
use std::ptr::NonNull;

use tracing::{debug, error, warn};

use crate::callback::CallbackSink;
use crate::options::LognormOptions;
use crate::{Library, LognormError};

/// Sole owner of one native context.
///
/// Not `Clone`. The context is released exactly once, either by `release()`
/// or when the handle is dropped. Every operation after release fails with
/// `NotInitialized`.
///
/// The handle also owns the context's `CallbackSink`. Native calls that may
/// raise notifications run with the sink entered on the calling thread.
pub struct ContextHandle {
    library: Library,
    ctx: Option<NonNull<c_void>>,
    sink: CallbackSink,
}

// SAFETY: The native context is not tied to the thread that created it; it
// only must not be used from two threads at once, which `!Sync` and `&mut`
// access already rule out.
unsafe impl Send for ContextHandle {}

impl ContextHandle {
    /// Creates a native context.
    pub fn acquire(library: Library, sink: CallbackSink) -> Result<Self, LognormError> {
        // SAFETY: `initCtx()` takes no arguments and returns an owned
        // context or null.
        let raw = unsafe { (library.api().init_ctx)() };
        let Some(ctx) = NonNull::new(raw) else {
            error!("initCtx() returned a null pointer, failed to initialize the context");
            return Err(LognormError::InitializationFailed);
        };
        debug!("Acquired native context {:p}", ctx);

        Ok(Self {
            library,
            ctx: Some(ctx),
            sink,
        })
    }

    /// Whether the context has not been released yet.
    pub fn is_live(&self) -> bool {
        self.ctx.is_some()
    }

    pub(crate) fn raw(&self) -> Result<NonNull<c_void>, LognormError> {
        self.ctx.ok_or_else(|| {
            error!("Context not initialized or already released");
            LognormError::NotInitialized
        })
    }

    pub fn library(&self) -> Library {
        self.library
    }

    pub fn sink(&self) -> &CallbackSink {
        &self.sink
    }

    /// Applies feature toggles. Must happen before any rule is loaded.
    pub fn set_options(&self, options: LognormOptions) -> Result<(), LognormError> {
        let ctx = self.raw()?;
        let native = options.to_native();
        // SAFETY: `ctx` is live; the record is only read during the call.
        unsafe { (self.library.api().set_ctx_opts)(ctx.as_ptr(), &native) };
        debug!("Applied context options {:?}", options);
        Ok(())
    }

    /// Format version of the loaded rulebase (0 when nothing is loaded).
    pub fn rulebase_version(&self) -> Result<c_int, LognormError> {
        let ctx = self.raw()?;
        // SAFETY: `ctx` is live.
        Ok(unsafe { (self.library.api().rulebase_version)(ctx.as_ptr()) })
    }

    /// Releases the native context.
    ///
    /// A second call fails with `NotInitialized`. The context is considered
    /// released even when the native side reports a non-zero status.
    pub fn release(&mut self) -> Result<(), LognormError> {
        let Some(ctx) = self.ctx.take() else {
            error!("Release requested for a context that is not initialized or already released");
            return Err(LognormError::NotInitialized);
        };
        // SAFETY: `ctx` was live and is no longer reachable through `self`.
        let code = unsafe { (self.library.api().exit_ctx)(ctx.as_ptr()) };
        if code != 0 {
            error!("exitCtx() returned error code <{}>", code);
            return Err(LognormError::ReleaseFailed { code });
        }
        debug!("Released native context {:p}", ctx);
        Ok(())
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        if self.ctx.is_some()
            && let Err(e) = self.release()
        {
            warn!("Failed to release native context on drop: {}", e);
        }
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("ctx", &self.ctx)
            .field("sink", &self.sink)
            .finish()
    }
}
