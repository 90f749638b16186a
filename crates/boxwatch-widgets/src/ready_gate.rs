#![forbid(unsafe_code)]

//! Readiness gating for measured content.
//!
//! Content that draws itself against its measured size renders garbage when
//! fed a not-yet-settled measurement. [`ReadyGate`] holds the child back
//! until the observation session reports readiness, then clips the child's
//! area to the measured dimensions.

use boxwatch_core::geometry::{Measurement, Rect};

use crate::{Canvas, Widget};

/// Renders its child only once a measurement is ready.
#[derive(Debug, Clone)]
pub struct ReadyGate<W> {
    measurement: Measurement,
    inner: W,
}

impl<W: Widget> ReadyGate<W> {
    /// Gate a widget on a measurement.
    pub fn new(measurement: Measurement, inner: W) -> Self {
        Self { measurement, inner }
    }

    /// Replace the measurement, e.g. from a fresh tick update.
    pub fn set_measurement(&mut self, measurement: Measurement) {
        self.measurement = measurement;
    }

    /// The current measurement.
    #[must_use]
    pub fn measurement(&self) -> Measurement {
        self.measurement
    }
}

impl<W: Widget> Widget for ReadyGate<W> {
    fn render(&self, area: Rect, canvas: &mut Canvas) {
        if !self.measurement.ready {
            return;
        }
        let clipped = self.measurement.size().min(area.size());
        let child_area = Rect::new(area.x, area.y, clipped.width, clipped.height);
        if child_area.is_empty() {
            return;
        }
        self.inner.render(child_area, canvas);
    }
}
