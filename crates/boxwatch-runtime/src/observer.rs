#![forbid(unsafe_code)]

//! Session management over a size driver.
//!
//! [`SizeObserver`] owns one driver and any number of observation sessions.
//! Hosts call [`observe`](SizeObserver::observe) when a pane mounts,
//! [`stop`](SizeObserver::stop) when it unmounts, and
//! [`tick`](SizeObserver::tick) from their event loop. Each tick drains
//! delivered notifications, runs due measurement attempts, and returns the
//! snapshots that changed.
//!
//! Attempts within one session are strictly sequential: a tick runs at most
//! one attempt per session, and the next attempt is only scheduled once the
//! previous outcome has been recorded.
//!
//! Several sessions may observe the same target; the driver registration is
//! shared and released when the last of them stops.

use std::collections::BTreeMap;
use std::time::Instant;

use boxwatch_core::driver::{DriverError, SizeDriver};
use boxwatch_core::event::TargetId;
use boxwatch_core::geometry::Measurement;

use crate::session::{ObservationSession, ObserveConfig};

/// Identifies one observation session owned by a [`SizeObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// The raw handle value.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// A changed snapshot produced by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeUpdate {
    /// The session that changed.
    pub handle: SessionHandle,
    /// The target the session observes.
    pub target: TargetId,
    /// The new consumer-visible snapshot.
    pub measurement: Measurement,
}

struct Entry {
    target: TargetId,
    session: ObservationSession,
}

/// Drives observation sessions over one [`SizeDriver`].
pub struct SizeObserver<D: SizeDriver> {
    driver: D,
    sessions: BTreeMap<u64, Entry>,
    next_id: u64,
}

impl<D: SizeDriver> SizeObserver<D> {
    /// Create an observer over the given driver.
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            sessions: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Borrow the underlying driver.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutably borrow the underlying driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Start observing a target. The first attempt runs on the next tick.
    pub fn observe(
        &mut self,
        target: TargetId,
        config: ObserveConfig,
        now: Instant,
    ) -> Result<SessionHandle, DriverError> {
        if !self.is_registered(target) {
            self.driver.observe(target)?;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(
            id,
            Entry {
                target,
                session: ObservationSession::new(config, now),
            },
        );
        tracing::debug!(session = id, target = target.raw(), "observation started");
        Ok(SessionHandle(id))
    }

    /// Stop a session, cancelling any scheduled retry.
    ///
    /// Idempotent: unknown or already-stopped handles are no-ops. The driver
    /// registration is released only when no other session observes the same
    /// target.
    pub fn stop(&mut self, handle: SessionHandle) {
        let Some(mut entry) = self.sessions.remove(&handle.0) else {
            return;
        };
        entry.session.stop();
        if !self.is_registered(entry.target) {
            self.driver.unobserve(entry.target);
        }
        tracing::debug!(
            session = handle.0,
            target = entry.target.raw(),
            "observation stopped"
        );
    }

    /// The current snapshot for a session, `None` once stopped.
    #[must_use]
    pub fn measurement(&self, handle: SessionHandle) -> Option<Measurement> {
        self.sessions
            .get(&handle.0)
            .map(|entry| entry.session.measurement())
    }

    /// Earliest scheduled attempt across all sessions.
    ///
    /// Hosts can use this to pick a wakeup deadline instead of ticking at a
    /// fixed rate.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(|entry| entry.session.next_due())
            .min()
    }

    /// Drain notifications and run due attempts.
    ///
    /// Returns every snapshot that changed, in session order.
    pub fn tick(&mut self, now: Instant) -> Vec<SizeUpdate> {
        let mut updates = Vec::new();

        for event in self.driver.poll_events(now) {
            for (id, entry) in self
                .sessions
                .iter_mut()
                .filter(|(_, entry)| entry.target == event.target)
            {
                if let Some(measurement) = entry.session.apply_notification(event.size, now) {
                    updates.push(SizeUpdate {
                        handle: SessionHandle(*id),
                        target: event.target,
                        measurement,
                    });
                }
            }
        }

        let due: Vec<u64> = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.session.is_due(now))
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            let Some(target) = self.sessions.get(&id).map(|entry| entry.target) else {
                continue;
            };
            let outcome = self.driver.measure(target);
            let Some(entry) = self.sessions.get_mut(&id) else {
                continue;
            };
            if let Some(measurement) = entry.session.record_attempt(outcome, now) {
                updates.push(SizeUpdate {
                    handle: SessionHandle(id),
                    target,
                    measurement,
                });
            }
        }

        updates
    }

    /// Stop every session and release the driver.
    pub fn disconnect(&mut self) {
        for entry in self.sessions.values_mut() {
            entry.session.stop();
        }
        self.sessions.clear();
        self.driver.disconnect();
    }

    fn is_registered(&self, target: TargetId) -> bool {
        self.sessions.values().any(|entry| entry.target == target)
    }
}
