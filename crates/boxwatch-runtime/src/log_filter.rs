#![forbid(unsafe_code)]

//! Structured-log containment layer.
//!
//! [`BenignFaultFilter`] is a `tracing-subscriber` layer that drops warn and
//! error events whose message is the resize-loop delivery notice. Every
//! other event, whatever its level, passes through to the rest of the
//! subscriber stack untouched, in order and with its fields intact.
//!
//! Hosts compose the filter into their subscriber at setup:
//!
//! ```ignore
//! use tracing_subscriber::prelude::*;
//!
//! tracing_subscriber::registry()
//!     .with(BenignFaultFilter::new())
//!     .with(my_format_layer)
//!     .init();
//! ```
//!
//! Only warn and error are gated: the recognized notice is only ever
//! reported at those levels, and narrowing the gate keeps deliberate
//! lower-level diagnostics (including this crate's own trace lines about
//! absorbed faults) visible.

use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use boxwatch_core::fault::is_benign_resize_fault;

/// Layer that suppresses resize-loop notices on the warn/error channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct BenignFaultFilter {
    _priv: (),
}

impl BenignFaultFilter {
    /// Create the filter layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Subscriber> Layer<S> for BenignFaultFilter {
    fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
        let level = *event.metadata().level();
        if level != Level::WARN && level != Level::ERROR {
            return true;
        }
        let mut visitor = MessageMatch::default();
        event.record(&mut visitor);
        !visitor.matched
    }
}

/// Visitor that classifies the conventional `message` field.
#[derive(Default)]
struct MessageMatch {
    matched: bool,
}

impl Visit for MessageMatch {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" && is_benign_resize_fault(value) {
            self.matched = true;
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" && is_benign_resize_fault(&format!("{value:?}")) {
            self.matched = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::prelude::*;

    /// Records the message text of every event that reaches it.
    #[derive(Clone, Default)]
    struct CaptureLayer {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl<S: Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = MessageText::default();
            event.record(&mut visitor);
            self.seen.lock().unwrap().push(visitor.text);
        }
    }

    #[derive(Default)]
    struct MessageText {
        text: String,
    }

    impl Visit for MessageText {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "message" {
                self.text = value.to_string();
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.text = format!("{value:?}");
            }
        }
    }

    fn run_with_filter(emit: impl FnOnce()) -> Vec<String> {
        let capture = CaptureLayer::default();
        let seen = Arc::clone(&capture.seen);
        let subscriber = tracing_subscriber::registry()
            .with(BenignFaultFilter::new())
            .with(capture);
        tracing::subscriber::with_default(subscriber, emit);
        let seen = seen.lock().unwrap();
        seen.clone()
    }

    #[test]
    fn drops_benign_warnings_and_errors() {
        let seen = run_with_filter(|| {
            tracing::warn!("ResizeObserver loop completed with undelivered notifications.");
            tracing::error!("ResizeObserver loop limit exceeded");
        });
        assert!(seen.is_empty());
    }

    #[test]
    fn passes_unrelated_events_through() {
        let seen = run_with_filter(|| {
            tracing::warn!("socket closed unexpectedly");
            tracing::error!("TypeError: x is not a function");
        });
        assert_eq!(
            seen,
            ["socket closed unexpectedly", "TypeError: x is not a function"]
        );
    }

    #[test]
    fn preserves_event_order_around_suppression() {
        let seen = run_with_filter(|| {
            tracing::warn!("before");
            tracing::warn!("ResizeObserver loop limit exceeded");
            tracing::warn!("after");
        });
        assert_eq!(seen, ["before", "after"]);
    }

    #[test]
    fn lower_levels_are_not_gated() {
        let seen = run_with_filter(|| {
            tracing::info!("ResizeObserver loop limit exceeded");
        });
        assert_eq!(seen, ["ResizeObserver loop limit exceeded"]);
    }

    #[test]
    fn formatted_messages_are_classified() {
        let count = 3;
        let seen = run_with_filter(|| {
            tracing::warn!("ResizeObserver loop completed with {count} undelivered notifications");
        });
        assert!(seen.is_empty());
    }
}
