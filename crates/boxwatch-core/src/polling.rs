#![forbid(unsafe_code)]

//! Polling fallback driver.
//!
//! Where the host has no event-driven size primitive, this driver measures
//! registered targets on a fixed interval and synthesizes a notification
//! whenever a size changes. Readiness semantics and cleanup are identical to
//! the event-driven backends; only the delivery mechanism differs.
//!
//! The driver is tick-driven: it performs no work and owns no timer until
//! [`poll_events`](crate::driver::SizeDriver::poll_events) is called with the
//! current time, matching how the rest of the lifecycle layer is driven.
//! Sweeps are spaced at least one interval apart and never run in catch-up
//! bursts after a long gap.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::driver::{DriverCaps, DriverError, MeasureError, SizeDriver};
use crate::event::{SizeEvent, TargetId};
use crate::geometry::Size;

/// Default sweep interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Measurement callback used by the polling driver.
pub type MeasureFn = Box<dyn FnMut(TargetId) -> Result<Size, MeasureError> + Send>;

/// Interval-based size driver for hosts without an observation primitive.
pub struct PollingDriver {
    measure: MeasureFn,
    interval: Duration,
    /// Registered targets and the last size reported for each.
    observed: BTreeMap<TargetId, Option<Size>>,
    next_sweep: Option<Instant>,
    connected: bool,
}

impl std::fmt::Debug for PollingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingDriver")
            .field("interval", &self.interval)
            .field("observed", &self.observed.len())
            .field("next_sweep", &self.next_sweep)
            .field("connected", &self.connected)
            .finish()
    }
}

impl PollingDriver {
    /// Create a driver sweeping at [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub fn new(
        measure: impl FnMut(TargetId) -> Result<Size, MeasureError> + Send + 'static,
    ) -> Self {
        Self::with_interval(DEFAULT_POLL_INTERVAL, measure)
    }

    /// Create a driver with a custom sweep interval.
    ///
    /// A zero interval is clamped to one millisecond so a sweep can never
    /// re-trigger within the same instant.
    #[must_use]
    pub fn with_interval(
        interval: Duration,
        measure: impl FnMut(TargetId) -> Result<Size, MeasureError> + Send + 'static,
    ) -> Self {
        Self {
            measure: Box::new(measure),
            interval: interval.max(Duration::from_millis(1)),
            observed: BTreeMap::new(),
            next_sweep: None,
            connected: true,
        }
    }

    /// The configured sweep interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next sweep is due, if one is scheduled.
    #[must_use]
    pub fn next_sweep(&self) -> Option<Instant> {
        self.next_sweep
    }

    fn sweep(&mut self, now: Instant) -> Vec<SizeEvent> {
        let mut events = Vec::new();
        for (target, last) in &mut self.observed {
            match (self.measure)(*target) {
                Ok(size) => {
                    if *last != Some(size) {
                        *last = Some(size);
                        events.push(SizeEvent::new(*target, size));
                    }
                }
                // A failed read is not a shrink; keep the last report and
                // try again next sweep.
                Err(_) => {}
            }
        }
        self.next_sweep = Some(now + self.interval);
        events
    }
}

impl SizeDriver for PollingDriver {
    fn caps(&self) -> DriverCaps {
        DriverCaps::MEASURE | DriverCaps::POLLED
    }

    fn observe(&mut self, target: TargetId) -> Result<(), DriverError> {
        if !self.connected {
            return Err(DriverError::Unavailable("driver disconnected"));
        }
        self.observed.entry(target).or_insert(None);
        Ok(())
    }

    fn unobserve(&mut self, target: TargetId) {
        self.observed.remove(&target);
    }

    fn disconnect(&mut self) {
        self.observed.clear();
        self.next_sweep = None;
        self.connected = false;
    }

    fn poll_events(&mut self, now: Instant) -> Vec<SizeEvent> {
        if !self.connected || self.observed.is_empty() {
            return Vec::new();
        }
        match self.next_sweep {
            // First call establishes the cadence and sweeps immediately so a
            // freshly registered target is not blind for a full interval.
            None => self.sweep(now),
            Some(due) if now >= due => self.sweep(now),
            Some(_) => Vec::new(),
        }
    }

    fn measure(&mut self, target: TargetId) -> Result<Size, MeasureError> {
        if !self.connected || !self.observed.contains_key(&target) {
            return Err(MeasureError::Detached);
        }
        (self.measure)(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn shared_size(initial: Size) -> (Arc<Mutex<Size>>, MeasureFn) {
        let cell = Arc::new(Mutex::new(initial));
        let reader = Arc::clone(&cell);
        let measure: MeasureFn = Box::new(move |_| Ok(*reader.lock().unwrap()));
        (cell, measure)
    }

    #[test]
    fn first_poll_reports_initial_size() {
        let (_cell, measure) = shared_size(Size::new(80, 24));
        let mut driver = PollingDriver::with_interval(Duration::from_millis(50), measure);
        let a = TargetId::new(1);
        driver.observe(a).unwrap();

        let t0 = Instant::now();
        let events = driver.poll_events(t0);
        assert_eq!(events, vec![SizeEvent::new(a, Size::new(80, 24))]);
    }

    #[test]
    fn unchanged_size_stays_silent() {
        let (_cell, measure) = shared_size(Size::new(80, 24));
        let mut driver = PollingDriver::with_interval(Duration::from_millis(50), measure);
        let a = TargetId::new(1);
        driver.observe(a).unwrap();

        let t0 = Instant::now();
        driver.poll_events(t0);
        let events = driver.poll_events(t0 + Duration::from_millis(50));
        assert!(events.is_empty());
    }

    #[test]
    fn change_is_reported_only_after_interval() {
        let (cell, measure) = shared_size(Size::new(80, 24));
        let mut driver = PollingDriver::with_interval(Duration::from_millis(50), measure);
        let a = TargetId::new(1);
        driver.observe(a).unwrap();

        let t0 = Instant::now();
        driver.poll_events(t0);
        *cell.lock().unwrap() = Size::new(100, 40);

        // Within the interval nothing is delivered.
        assert!(
            driver
                .poll_events(t0 + Duration::from_millis(10))
                .is_empty()
        );

        let events = driver.poll_events(t0 + Duration::from_millis(50));
        assert_eq!(events, vec![SizeEvent::new(a, Size::new(100, 40))]);
    }

    #[test]
    fn failed_reads_keep_last_report() {
        let healthy = Arc::new(Mutex::new(true));
        let toggle = Arc::clone(&healthy);
        let mut driver = PollingDriver::with_interval(Duration::from_millis(50), move |_| {
            if *toggle.lock().unwrap() {
                Ok(Size::new(80, 24))
            } else {
                Err(MeasureError::Unavailable)
            }
        });
        let a = TargetId::new(1);
        driver.observe(a).unwrap();

        let t0 = Instant::now();
        assert_eq!(driver.poll_events(t0).len(), 1);

        *healthy.lock().unwrap() = false;
        assert!(
            driver
                .poll_events(t0 + Duration::from_millis(50))
                .is_empty()
        );

        // Recovery with the same size is still silent; the last report stands.
        *healthy.lock().unwrap() = true;
        assert!(
            driver
                .poll_events(t0 + Duration::from_millis(100))
                .is_empty()
        );
    }

    #[test]
    fn unobserve_and_disconnect_stop_delivery() {
        let (_cell, measure) = shared_size(Size::new(80, 24));
        let mut driver = PollingDriver::with_interval(Duration::from_millis(50), measure);
        let a = TargetId::new(1);
        driver.observe(a).unwrap();

        let t0 = Instant::now();
        driver.poll_events(t0);

        driver.unobserve(a);
        assert!(
            driver
                .poll_events(t0 + Duration::from_millis(50))
                .is_empty()
        );
        assert!(matches!(driver.measure(a), Err(MeasureError::Detached)));

        driver.disconnect();
        assert!(matches!(
            driver.observe(a),
            Err(DriverError::Unavailable(_))
        ));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let (_cell, measure) = shared_size(Size::ZERO);
        let driver = PollingDriver::with_interval(Duration::ZERO, measure);
        assert_eq!(driver.interval(), Duration::from_millis(1));
    }

    #[test]
    fn on_demand_measurement_reads_fresh() {
        let (cell, measure) = shared_size(Size::new(80, 24));
        let mut driver = PollingDriver::with_interval(Duration::from_millis(50), measure);
        let a = TargetId::new(1);
        driver.observe(a).unwrap();

        *cell.lock().unwrap() = Size::new(5, 5);
        assert_eq!(driver.measure(a).unwrap(), Size::new(5, 5));
    }
}
