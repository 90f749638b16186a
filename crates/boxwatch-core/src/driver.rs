#![forbid(unsafe_code)]

//! The size-observation driver abstraction.
//!
//! A [`SizeDriver`] is the seam between boxwatch and whatever the host uses
//! to report box sizes: a terminal, a browser embedding bridge, or nothing
//! but an interval timer. The trait is deliberately
//! observe/unobserve/disconnect-shaped so implementations can be swapped
//! without the lifecycle layer noticing; in particular, the polling fallback
//! in [`crate::polling`] substitutes transparently where no event-driven
//! primitive exists.
//!
//! Drivers never retry and never classify faults. Acquisition failures come
//! back as [`DriverError`], per-attempt measurement faults as
//! [`MeasureError`]; the lifecycle layer owns the retry policy and the
//! containment layers own fault classification.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::sync::mpsc;
use std::time::Instant;

use bitflags::bitflags;

use crate::event::{SizeEvent, TargetId};
use crate::geometry::Size;

bitflags! {
    /// What a driver can do, used by hosts to pick a backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DriverCaps: u8 {
        /// Delivers notifications on its own when a target's size changes.
        const EVENTS = 1 << 0;
        /// Supports on-demand measurement of a registered target.
        const MEASURE = 1 << 1;
        /// Synthesizes notifications by measuring on a fixed interval.
        const POLLED = 1 << 2;
    }
}

/// Failure to acquire an observation backend or register a target.
#[derive(Debug)]
pub enum DriverError {
    /// The host has no usable observation primitive.
    Unavailable(&'static str),
    /// Backend I/O failure during acquisition.
    Io(io::Error),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "observation backend unavailable: {reason}"),
            Self::Io(err) => write!(f, "observation backend i/o failure: {err}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable(_) => None,
            Self::Io(err) => Some(err),
        }
    }
}

/// Failure of a single measurement attempt.
///
/// These are recoverable by construction: the lifecycle layer folds them
/// into its retry policy and they never reach a consumer.
#[derive(Debug)]
pub enum MeasureError {
    /// The target is no longer reachable (dropped, or never registered).
    Detached,
    /// The backend cannot currently report a size for the target.
    Unavailable,
    /// Backend I/O failure while reading geometry.
    Io(io::Error),
}

impl fmt::Display for MeasureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => write!(f, "measurement target detached"),
            Self::Unavailable => write!(f, "no size available for target"),
            Self::Io(err) => write!(f, "geometry read failed: {err}"),
        }
    }
}

impl std::error::Error for MeasureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Detached | Self::Unavailable => None,
            Self::Io(err) => Some(err),
        }
    }
}

/// A source of box sizes for registered targets.
///
/// Implementations are single-threaded from the caller's perspective: the
/// lifecycle layer drives one driver from one timeline and drains delivered
/// notifications via [`poll_events`](SizeDriver::poll_events) between
/// measurement attempts.
pub trait SizeDriver {
    /// Capability flags for this driver.
    fn caps(&self) -> DriverCaps;

    /// Register a target for observation.
    ///
    /// Registering an already-registered target is a no-op.
    fn observe(&mut self, target: TargetId) -> Result<(), DriverError>;

    /// Release one target's registration.
    ///
    /// Safe to call for targets that were never registered.
    fn unobserve(&mut self, target: TargetId);

    /// Release every registration and the backend itself.
    ///
    /// After disconnecting, [`poll_events`](SizeDriver::poll_events) returns
    /// nothing and measurement reports [`MeasureError::Detached`].
    fn disconnect(&mut self);

    /// Drain notifications delivered since the last call.
    ///
    /// `now` feeds interval bookkeeping in polled implementations;
    /// event-driven drivers ignore it.
    fn poll_events(&mut self, now: Instant) -> Vec<SizeEvent>;

    /// Measure a registered target's current box size.
    fn measure(&mut self, target: TargetId) -> Result<Size, MeasureError>;
}

/// A driver boxed for heterogeneous backend selection.
pub type BoxedDriver = Box<dyn SizeDriver + Send>;

impl SizeDriver for BoxedDriver {
    fn caps(&self) -> DriverCaps {
        (**self).caps()
    }

    fn observe(&mut self, target: TargetId) -> Result<(), DriverError> {
        (**self).observe(target)
    }

    fn unobserve(&mut self, target: TargetId) {
        (**self).unobserve(target);
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }

    fn poll_events(&mut self, now: Instant) -> Vec<SizeEvent> {
        (**self).poll_events(now)
    }

    fn measure(&mut self, target: TargetId) -> Result<Size, MeasureError> {
        (**self).measure(target)
    }
}

/// Feeds size notifications into a [`ChannelDriver`] from the embedding side.
///
/// Clone freely; delivery is fire-and-forget. A notification delivered after
/// the driver is gone is dropped and reported as such by the return value.
#[derive(Debug, Clone)]
pub struct SizeFeed {
    tx: mpsc::Sender<SizeEvent>,
}

impl SizeFeed {
    /// Deliver a size notification for a target.
    ///
    /// Returns false when the receiving driver no longer exists.
    pub fn deliver(&self, target: TargetId, size: Size) -> bool {
        self.tx.send(SizeEvent::new(target, size)).is_ok()
    }
}

/// An event-driven driver fed by an embedding bridge over a channel.
///
/// This is the backend a browser host uses: the bridge observes elements
/// with the platform primitive and forwards each delivered entry through a
/// [`SizeFeed`]. The driver keeps the last delivered size per registered
/// target so on-demand measurement works between deliveries; a target that
/// has never been delivered measures as [`MeasureError::Unavailable`], which
/// is exactly the not-laid-out-yet case the retry policy exists for.
#[derive(Debug)]
pub struct ChannelDriver {
    rx: mpsc::Receiver<SizeEvent>,
    observed: HashSet<TargetId>,
    last_seen: HashMap<TargetId, Size>,
    connected: bool,
}

impl ChannelDriver {
    /// Create a driver and the feed that delivers into it.
    #[must_use]
    pub fn new() -> (Self, SizeFeed) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx,
                observed: HashSet::new(),
                last_seen: HashMap::new(),
                connected: true,
            },
            SizeFeed { tx },
        )
    }

    /// Number of currently registered targets.
    #[must_use]
    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }
}

impl SizeDriver for ChannelDriver {
    fn caps(&self) -> DriverCaps {
        DriverCaps::EVENTS | DriverCaps::MEASURE
    }

    fn observe(&mut self, target: TargetId) -> Result<(), DriverError> {
        if !self.connected {
            return Err(DriverError::Unavailable("driver disconnected"));
        }
        self.observed.insert(target);
        Ok(())
    }

    fn unobserve(&mut self, target: TargetId) {
        self.observed.remove(&target);
        self.last_seen.remove(&target);
    }

    fn disconnect(&mut self) {
        self.observed.clear();
        self.last_seen.clear();
        self.connected = false;
    }

    fn poll_events(&mut self, _now: Instant) -> Vec<SizeEvent> {
        let mut events = Vec::new();
        if !self.connected {
            // Drain and drop anything still queued.
            while self.rx.try_recv().is_ok() {}
            return events;
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    // Deliveries for unregistered targets are dropped, not
                    // buffered; registration is the observation boundary.
                    if self.observed.contains(&event.target) {
                        self.last_seen.insert(event.target, event.size);
                        events.push(event);
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    fn measure(&mut self, target: TargetId) -> Result<Size, MeasureError> {
        if !self.connected {
            return Err(MeasureError::Detached);
        }
        if !self.observed.contains(&target) {
            return Err(MeasureError::Detached);
        }
        self.last_seen
            .get(&target)
            .copied()
            .ok_or(MeasureError::Unavailable)
    }
}
