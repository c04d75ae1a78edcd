//! Native notification callbacks.
//!
//! The native library reports debug and error messages through two
//! independently registered callbacks. The token passed with each message
//! belongs to the native side and is never dereferenced here.
//!
//! Notifications arrive synchronously on the thread that is blocked in the
//! triggering native call. That call is bracketed by `CallbackSink::enter`,
//! which makes the sink the thread's active receiver. The trampolines only
//! copy the message out of native memory and hand it to the active sink.
//! They never unwind into native code.

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_void};
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use tracing::{Level, debug, error, warn};

use crate::aggregator::ErrorAggregator;
use crate::handle::ContextHandle;
use crate::LognormError;

/// Log target for messages originating in the native library.
pub const NATIVE_LOG_TARGET: &str = "rsm_lognorm::native";

/// The two native notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackChannel {
    Debug,
    Error,
}

impl fmt::Display for CallbackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => f.write_str("debug"),
            Self::Error => f.write_str("error"),
        }
    }
}

thread_local! {
    static ACTIVE_SINK: Cell<*const CallbackSink> = const { Cell::new(ptr::null()) };
}

/// Whether debug-level native notifications would be logged anywhere.
pub fn debug_enabled() -> bool {
    tracing::enabled!(target: NATIVE_LOG_TARGET, Level::DEBUG)
}

/// Receiver for native notifications of one context.
///
/// Every notification is logged. Error notifications are also appended to
/// the attached `ErrorAggregator`, if any.
#[derive(Debug, Default)]
pub struct CallbackSink {
    collector: Option<RefCell<ErrorAggregator>>,
}

impl CallbackSink {
    /// A sink that only logs.
    pub fn logging_only() -> Self {
        Self { collector: None }
    }

    /// A sink that logs and collects error notifications.
    pub fn with_aggregator() -> Self {
        Self {
            collector: Some(RefCell::new(ErrorAggregator::new())),
        }
    }

    pub fn on_debug(&self, message: &str) {
        debug!(target: NATIVE_LOG_TARGET, "liblognorm: {}", message);
    }

    pub fn on_error(&self, message: &str) {
        error!(target: NATIVE_LOG_TARGET, "liblognorm error: <{}>", message);
        if let Some(collector) = &self.collector {
            match collector.try_borrow_mut() {
                Ok(mut aggregator) => aggregator.record(message),
                Err(_) => warn!("Error notification arrived while the collector was in use"),
            }
        }
    }

    /// Clears collected errors before an operation.
    pub fn reset_errors(&self) {
        if let Some(collector) = &self.collector {
            collector.borrow_mut().reset();
        }
    }

    /// Number of errors collected since the last reset.
    pub fn error_count(&self) -> usize {
        self.collector
            .as_ref()
            .map_or(0, |collector| collector.borrow().len())
    }

    /// Fails if any error was collected since the last reset.
    pub fn check_errors(&self) -> Result<(), LognormError> {
        match &self.collector {
            Some(collector) => collector.borrow_mut().check(),
            None => Ok(()),
        }
    }

    /// Makes this sink the receiver of notifications raised on the current
    /// thread until the returned scope drops.
    pub(crate) fn enter(&self) -> SinkScope<'_> {
        let previous = ACTIVE_SINK.with(|active| active.replace(ptr::from_ref(self)));
        SinkScope {
            previous,
            _sink: PhantomData,
        }
    }
}

/// Active-sink registration for one native call. Restores the previous
/// receiver on drop.
pub(crate) struct SinkScope<'a> {
    previous: *const CallbackSink,
    _sink: PhantomData<&'a CallbackSink>,
}

impl Drop for SinkScope<'_> {
    fn drop(&mut self) {
        ACTIVE_SINK.with(|active| active.set(self.previous));
    }
}

/// Registers the error callback on `handle`.
///
/// Mandatory whenever errors are aggregated: several native validations are
/// reported only through this channel.
pub fn register_error_callback(handle: &ContextHandle) -> Result<(), LognormError> {
    register(handle, CallbackChannel::Error)
}

/// Registers the debug callback on `handle`.
pub fn register_debug_callback(handle: &ContextHandle) -> Result<(), LognormError> {
    register(handle, CallbackChannel::Debug)
}

fn register(handle: &ContextHandle, channel: CallbackChannel) -> Result<(), LognormError> {
    let ctx = handle.raw()?;
    let api = handle.library().api();

    // SAFETY: `ctx` is live and the trampolines are valid for the life of
    // the process.
    let code = unsafe {
        match channel {
            CallbackChannel::Debug => (api.set_debug_cb)(ctx.as_ptr(), Some(debug_trampoline)),
            CallbackChannel::Error => (api.set_err_msg_cb)(ctx.as_ptr(), Some(error_trampoline)),
        }
    };

    if code != 0 {
        error!("Registering the {} callback returned error code <{}>", channel, code);
        return Err(LognormError::CallbackRegistrationFailed { channel, code });
    }
    debug!("Registered {} callback", channel);
    Ok(())
}

/// Copies a native message into an owned string.
///
/// # Safety
/// `msg` must be null or valid for reads of `len` bytes.
unsafe fn copy_message(msg: *const c_char, len: usize) -> String {
    if msg.is_null() || len == 0 {
        return String::new();
    }
    // SAFETY: Guaranteed by the caller.
    let bytes = unsafe { std::slice::from_raw_parts(msg.cast::<u8>(), len) };
    String::from_utf8_lossy(bytes).into_owned()
}

fn dispatch(msg: *const c_char, len: usize, channel: CallbackChannel) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: The native side passes the message it owns for the
        // duration of this call.
        let message = unsafe { copy_message(msg, len) };
        let active = ACTIVE_SINK.with(Cell::get);
        // SAFETY: Non-null only while a `SinkScope` borrowing the sink is
        // alive on this thread.
        match unsafe { active.as_ref() } {
            Some(sink) => match channel {
                CallbackChannel::Debug => sink.on_debug(&message),
                CallbackChannel::Error => sink.on_error(&message),
            },
            None => match channel {
                CallbackChannel::Debug => {
                    debug!(target: NATIVE_LOG_TARGET, "liblognorm: {}", message);
                }
                CallbackChannel::Error => {
                    error!(target: NATIVE_LOG_TARGET, "liblognorm error: <{}>", message);
                }
            },
        }
    }));
    if outcome.is_err() {
        error!("Panic while handling a native {} notification", channel);
    }
}

unsafe extern "C" fn debug_trampoline(_token: *mut c_void, msg: *const c_char, len: usize) {
    dispatch(msg, len, CallbackChannel::Debug);
}

unsafe extern "C" fn error_trampoline(_token: *mut c_void, msg: *const c_char, len: usize) {
    dispatch(msg, len, CallbackChannel::Error);
}
