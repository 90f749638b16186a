#![forbid(unsafe_code)]

//! Process-wide asynchronous fault channel.
//!
//! Background delivery threads (terminal event pumps, embedding bridges)
//! cannot surface failures through a return value; they report them here
//! instead. The hub dispatches every report to the currently installed
//! handler, falling back to a default that emits a structured error log.
//!
//! The handler slot is swapped whole, never mutated in place, so a wrapper
//! can take the previous handler and chain onto it the same way the global
//! guard chains the process panic hook.

use std::sync::{Arc, Mutex, PoisonError};

/// A fault reported from an asynchronous delivery path.
#[derive(Debug, Clone)]
pub struct AsyncFault {
    /// Human-readable fault message.
    pub message: String,
    /// Stack or backtrace text, when the reporting side has one.
    pub stack: Option<String>,
    /// Which subsystem reported the fault.
    pub origin: &'static str,
}

impl AsyncFault {
    /// Create a fault report.
    #[must_use]
    pub fn new(message: impl Into<String>, origin: &'static str) -> Self {
        Self {
            message: message.into(),
            stack: None,
            origin,
        }
    }

    /// Attach stack text to the report.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Handler invoked for every reported fault.
pub type FaultHandler = Arc<dyn Fn(&AsyncFault) + Send + Sync>;

static HANDLER: Mutex<Option<FaultHandler>> = Mutex::new(None);

/// Report a fault to the currently installed handler.
///
/// With no handler installed, [`default_handler`] runs. The handler is
/// cloned out of the slot before it is invoked, so a handler may itself
/// swap handlers without deadlocking.
pub fn report(fault: &AsyncFault) {
    let handler = HANDLER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match handler {
        Some(handler) => handler(fault),
        None => default_handler(fault),
    }
}

/// The fallback handler: emit the fault as a structured error log.
pub fn default_handler(fault: &AsyncFault) {
    tracing::error!(origin = fault.origin, "{}", fault.message);
}

/// Install a new handler, returning the previous one.
///
/// Passing `None` restores default handling.
pub fn swap_handler(handler: Option<FaultHandler>) -> Option<FaultHandler> {
    std::mem::replace(
        &mut *HANDLER.lock().unwrap_or_else(PoisonError::into_inner),
        handler,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // The handler slot is process-global, so this file keeps its coverage in
    // one test to stay independent of harness thread scheduling.
    #[test]
    fn handlers_chain_and_restore() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let previous = swap_handler(Some(Arc::new(move |fault: &AsyncFault| {
            sink.lock().unwrap().push(fault.message.clone());
        })));

        report(&AsyncFault::new("first", "test"));
        report(&AsyncFault::new("second", "test").with_stack("at delivery loop"));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["first".to_string(), "second".to_string()]
        );

        // Restore whatever was installed before this test ran.
        swap_handler(previous);
    }
}
