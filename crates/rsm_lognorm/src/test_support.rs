//! Log capture for unit tests.

use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

/// One captured event.
#[derive(Debug, Clone, PartialEq)]
pub struct Captured {
    pub level: Level,
    pub message: String,
}

struct CaptureLayer(Arc<Mutex<Vec<Captured>>>);

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0.lock().unwrap().push(Captured {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            use std::fmt::Write;
            let _ = write!(self.0, "{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        }
    }
}

/// Runs `f` with a thread-local subscriber that records every event at
/// `max_level` and above.
pub fn capture_logs<T>(max_level: Level, f: impl FnOnce() -> T) -> (T, Vec<Captured>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let filter = LevelFilter::from_level(max_level);
    let subscriber =
        tracing_subscriber::registry().with(CaptureLayer(events.clone()).with_filter(filter));
    let out = tracing::subscriber::with_default(subscriber, f);
    let events = events.lock().unwrap().clone();
    (out, events)
}

/// Messages logged at exactly `level`.
pub fn messages_at(events: &[Captured], level: Level) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.level == level)
        .map(|e| e.message.clone())
        .collect()
}
