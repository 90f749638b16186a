//! Global guard installation behavior.
//!
//! Installation wraps process-global hooks, so this file owns a whole test
//! process and keeps every assertion in a single ordered sequence.

use std::panic::catch_unwind;
use std::sync::{Arc, Mutex};

use boxwatch_core::fault::panic_payload_message;
use boxwatch_runtime::fault_hub::{self, AsyncFault};
use boxwatch_runtime::guard::{self, GuardChannels, InstallOutcome};

#[test]
fn guard_contains_benign_faults_and_forwards_the_rest() {
    // Probe the panic path: replace the default hook before the guard wraps
    // it, so "previous behavior ran" is observable.
    let panics: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let panic_sink = Arc::clone(&panics);
    std::panic::set_hook(Box::new(move |info| {
        let message = panic_payload_message(info.payload())
            .unwrap_or("<opaque payload>")
            .to_string();
        panic_sink.lock().unwrap().push(message);
    }));

    // Probe the async path the same way.
    let faults: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let fault_sink = Arc::clone(&faults);
    fault_hub::swap_handler(Some(Arc::new(move |fault: &AsyncFault| {
        fault_sink.lock().unwrap().push(fault.message.clone());
    })));

    assert!(!guard::is_installed());
    assert_eq!(guard::install(), InstallOutcome::Installed);
    assert!(guard::is_installed());
    assert_eq!(guard::installed_channels(), Some(GuardChannels::all()));

    // A benign panic still unwinds, but its report is absorbed.
    let unwound = catch_unwind(|| {
        panic!("ResizeObserver loop completed with undelivered notifications.")
    });
    assert!(unwound.is_err());
    assert!(panics.lock().unwrap().is_empty());

    // An unrelated panic reaches the previous hook unchanged.
    let unwound = catch_unwind(|| panic!("boom"));
    assert!(unwound.is_err());
    assert_eq!(panics.lock().unwrap().as_slice(), ["boom".to_string()]);

    // A benign async fault reaches no handler.
    fault_hub::report(&AsyncFault::new(
        "ResizeObserver loop limit exceeded",
        "bridge",
    ));
    assert!(faults.lock().unwrap().is_empty());

    // Stack text alone is enough to classify a report.
    fault_hub::report(
        &AsyncFault::new("Error", "bridge").with_stack("at ResizeObserver loop delivery"),
    );
    assert!(faults.lock().unwrap().is_empty());

    // An unrelated async fault is forwarded to the previous handler.
    fault_hub::report(&AsyncFault::new("connection reset", "bridge"));
    assert_eq!(
        faults.lock().unwrap().as_slice(),
        ["connection reset".to_string()]
    );

    // Installing again changes nothing: no double wrap, no double handling.
    assert_eq!(guard::install(), InstallOutcome::AlreadyInstalled);
    assert_eq!(
        guard::install_channels(GuardChannels::PANIC_HOOK),
        InstallOutcome::AlreadyInstalled
    );
    assert_eq!(guard::installed_channels(), Some(GuardChannels::all()));

    let unwound = catch_unwind(|| panic!("ResizeObserver loop limit exceeded"));
    assert!(unwound.is_err());
    assert!(panics.lock().unwrap().is_empty());

    fault_hub::report(&AsyncFault::new("connection reset", "bridge"));
    assert_eq!(faults.lock().unwrap().len(), 2);
}
