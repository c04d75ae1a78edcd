//! Collection of native error notifications for one operation.
//!
//! The native engine may find several independent rule errors during a
//! single load call and still return status 0. Any recorded message turns
//! the operation into a failure.

use tracing::error;

use crate::LognormError;

/// Messages kept verbatim per operation. Further messages are only counted.
pub const MAX_RETAINED_MESSAGES: usize = 1024;

/// Ordered error messages collected since the last `reset()`.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    messages: Vec<String>,
    count: usize,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears collected messages before a new operation.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.count = 0;
    }

    /// Appends one message.
    pub fn record(&mut self, message: impl Into<String>) {
        self.count += 1;
        if self.messages.len() < MAX_RETAINED_MESSAGES {
            self.messages.push(message.into());
        }
    }

    /// Number of messages recorded since the last reset.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Retained messages in arrival order.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Fails with `AggregatedValidationFailed` if anything was recorded.
    ///
    /// The collected messages move into the error; the aggregator is left
    /// empty either way.
    pub fn check(&mut self) -> Result<(), LognormError> {
        if self.is_empty() {
            return Ok(());
        }
        let count = self.count;
        let messages = std::mem::take(&mut self.messages);
        self.count = 0;
        error!("<{}> liblognorm errors have occurred during loading", count);
        Err(LognormError::AggregatedValidationFailed { count, messages })
    }
}
