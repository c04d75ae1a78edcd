//! # rsm_lognorm
//!
//! Safe wrapper over the liblognorm normalization shim.
//!
//! This crate provides:
//! - Owned native contexts released exactly once (`ContextHandle`)
//! - Debug and error notifications routed into `tracing` and collected per
//!   operation (`CallbackSink`, `ErrorAggregator`)
//! - Rulebase loading from inline text or files (`RulebaseLoader`)
//! - Normalization of log lines into JSON text (`NormalizationSession`)
//! - Configuration loading and session pooling for parallel callers
//!
//! ## Example
//!
//! ```rust,ignore
//! use rsm_lognorm::{LognormFactory, LognormOptions};
//!
//! let mut session = LognormFactory::from_file("/etc/rsyslog.d/sample.rulebase")
//!     .with_options(LognormOptions::new().with_original_msg(true))
//!     .build()?;
//!
//! let json = session.normalize("user bob logged in")?;
//! println!("{json}");
//! ```
//!
//! ## Logging
//!
//! Native notifications are logged under the `rsm_lognorm::native` target:
//! debug messages at `DEBUG`, error messages at `ERROR`. The debug callback
//! is only registered when that target is enabled at `DEBUG`.

mod aggregator;
pub mod callback;
mod config;
mod error;
mod factory;
pub mod handle;
mod library;
pub mod loader;
mod options;
pub mod pool;
mod session;

#[cfg(test)]
mod test_support;

pub use aggregator::{ErrorAggregator, MAX_RETAINED_MESSAGES};
pub use callback::{
    CallbackChannel, CallbackSink, NATIVE_LOG_TARGET, debug_enabled, register_debug_callback,
    register_error_callback,
};
pub use config::NormalizerConfig;
pub use error::LognormError;
pub use factory::LognormFactory;
pub use handle::ContextHandle;
pub use library::Library;
pub use loader::{LoadState, RuleSource, RulebaseLoader, load_from_file, load_from_text};
pub use options::LognormOptions;
pub use pool::{PooledSession, SessionPool};
pub use session::NormalizationSession;
