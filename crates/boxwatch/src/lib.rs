#![forbid(unsafe_code)]

//! boxwatch public facade crate.
//!
//! Re-exports the stable surface of the core, runtime, and widgets crates,
//! and provides the process bootstrap entry points. The expected startup
//! sequence is:
//!
//! 1. [`install_containment`] once, before any observation starts.
//! 2. Compose [`BenignFaultFilter`] into the tracing subscriber.
//! 3. Build an observer ([`observer_with_fallback`] picks a backend) and
//!    start sessions as panes mount.

use std::fmt;
use std::time::Duration;

// --- Core re-exports -------------------------------------------------------

pub use boxwatch_core::driver::{
    BoxedDriver, ChannelDriver, DriverCaps, DriverError, MeasureError, SizeDriver, SizeFeed,
};
pub use boxwatch_core::event::{SizeEvent, TargetId};
pub use boxwatch_core::fault::{self, FaultClass, is_benign_resize_fault};
pub use boxwatch_core::geometry::{Measurement, Rect, Size};
pub use boxwatch_core::polling::{DEFAULT_POLL_INTERVAL, PollingDriver};
#[cfg(not(target_arch = "wasm32"))]
pub use boxwatch_core::terminal::TerminalDriver;

// --- Runtime re-exports ----------------------------------------------------

pub use boxwatch_runtime::fault_hub::{self, AsyncFault, FaultHandler};
pub use boxwatch_runtime::guard::{self, GuardChannels, InstallOutcome};
pub use boxwatch_runtime::log_filter::BenignFaultFilter;
pub use boxwatch_runtime::{
    DelayGrowth, ObservationSession, ObserveConfig, SessionHandle, SessionPhase, SizeObserver,
    SizeUpdate,
};

// --- Widget re-exports -----------------------------------------------------

pub use boxwatch_widgets::{
    Canvas, FaultBoundary, FaultDecision, FaultPolicy, ReadyGate, RenderFault, ResizeLoopPolicy,
    Widget,
};

// --- Errors ----------------------------------------------------------------

/// Top-level error type for boxwatch hosts.
#[derive(Debug)]
pub enum Error {
    /// No observation backend could be acquired.
    Driver(DriverError),
    /// I/O failure outside a driver.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Standard result type for boxwatch APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bootstrap -------------------------------------------------------------

/// Install the process-wide containment guard.
///
/// Call once before any observation session starts; redundant calls from
/// other entry points are safe no-ops.
pub fn install_containment() -> InstallOutcome {
    guard::install()
}

/// Build an observer over the terminal backend.
#[cfg(not(target_arch = "wasm32"))]
pub fn terminal_observer() -> Result<SizeObserver<BoxedDriver>> {
    let driver = TerminalDriver::open()?;
    Ok(SizeObserver::new(Box::new(driver) as BoxedDriver))
}

/// Build an observer over the best available backend.
///
/// Prefers the event-driven terminal backend; where the host has none, the
/// polling driver substitutes with equivalent readiness semantics, sweeping
/// at `poll_interval` with `fallback_measure` as its size source.
pub fn observer_with_fallback(
    poll_interval: Duration,
    fallback_measure: impl FnMut(TargetId) -> std::result::Result<Size, MeasureError> + Send + 'static,
) -> SizeObserver<BoxedDriver> {
    #[cfg(not(target_arch = "wasm32"))]
    if let Ok(driver) = TerminalDriver::open() {
        return SizeObserver::new(Box::new(driver) as BoxedDriver);
    }
    SizeObserver::new(
        Box::new(PollingDriver::with_interval(poll_interval, fallback_measure)) as BoxedDriver,
    )
}

// --- Prelude ---------------------------------------------------------------

/// Convenience imports for day-to-day usage.
pub mod prelude {
    pub use crate::{
        Canvas, Error, FaultBoundary, Measurement, ObserveConfig, ReadyGate, Rect, Result,
        SessionHandle, Size, SizeObserver, TargetId, Widget, install_containment,
    };
}
