#![forbid(unsafe_code)]

//! Native terminal backend.
//!
//! The terminal is a single observable target: resize notifications arrive
//! on the crossterm event stream and measurement reads the terminal size
//! directly. This driver owns the event stream while draining; hosts that
//! run their own input loop should forward resize events through a
//! [`ChannelDriver`](crate::driver::ChannelDriver) instead of opening this
//! one, since non-resize events drained here are discarded.

use std::time::{Duration, Instant};

use crate::driver::{DriverCaps, DriverError, MeasureError, SizeDriver};
use crate::event::{SizeEvent, TargetId};
use crate::geometry::Size;

/// Event-driven driver over the host terminal.
#[derive(Debug)]
pub struct TerminalDriver {
    observed: bool,
    connected: bool,
}

impl TerminalDriver {
    /// The terminal's target id.
    pub const TARGET: TargetId = TargetId::new(0);

    /// Open the terminal backend.
    ///
    /// Fails when the process has no terminal to query, which is the signal
    /// to fall back to [`PollingDriver`](crate::polling::PollingDriver).
    pub fn open() -> Result<Self, DriverError> {
        crossterm::terminal::size().map_err(DriverError::Io)?;
        Ok(Self {
            observed: false,
            connected: true,
        })
    }

    fn read_size() -> Result<Size, MeasureError> {
        let (width, height) = crossterm::terminal::size().map_err(MeasureError::Io)?;
        Ok(Size::new(width, height))
    }
}

impl SizeDriver for TerminalDriver {
    fn caps(&self) -> DriverCaps {
        DriverCaps::EVENTS | DriverCaps::MEASURE
    }

    fn observe(&mut self, target: TargetId) -> Result<(), DriverError> {
        if !self.connected {
            return Err(DriverError::Unavailable("driver disconnected"));
        }
        if target != Self::TARGET {
            return Err(DriverError::Unavailable(
                "terminal driver observes only the terminal target",
            ));
        }
        self.observed = true;
        Ok(())
    }

    fn unobserve(&mut self, target: TargetId) {
        if target == Self::TARGET {
            self.observed = false;
        }
    }

    fn disconnect(&mut self) {
        self.observed = false;
        self.connected = false;
    }

    fn poll_events(&mut self, _now: Instant) -> Vec<SizeEvent> {
        let mut events = Vec::new();
        if !self.connected || !self.observed {
            return events;
        }
        loop {
            match crossterm::event::poll(Duration::ZERO) {
                Ok(true) => match crossterm::event::read() {
                    Ok(crossterm::event::Event::Resize(width, height)) => {
                        events.push(SizeEvent::new(Self::TARGET, Size::new(width, height)));
                    }
                    Ok(_) => {
                        tracing::trace!("discarding non-resize terminal event");
                    }
                    Err(err) => {
                        tracing::debug!("terminal event read failed: {err}");
                        break;
                    }
                },
                Ok(false) => break,
                Err(err) => {
                    tracing::debug!("terminal event poll failed: {err}");
                    break;
                }
            }
        }
        events
    }

    fn measure(&mut self, target: TargetId) -> Result<Size, MeasureError> {
        if !self.connected || !self.observed || target != Self::TARGET {
            return Err(MeasureError::Detached);
        }
        Self::read_size()
    }
}
