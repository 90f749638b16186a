#![forbid(unsafe_code)]

//! Runtime: observation session lifecycle, fault hub, and the global guard.

pub mod fault_hub;
pub mod guard;
pub mod log_filter;
pub mod observer;
pub mod session;

pub use observer::{SessionHandle, SizeObserver, SizeUpdate};
pub use session::{DelayGrowth, ObservationSession, ObserveConfig, SessionPhase};
