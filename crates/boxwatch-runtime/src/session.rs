#![forbid(unsafe_code)]

//! Observation session state machine.
//!
//! A freshly mounted pane may not have stable layout yet: the first
//! measurement often reports a zero or otherwise degenerate size. Instead of
//! rendering into a guessed size, a session retries measurement a bounded
//! number of times and only then gives up and goes ready with whatever it
//! last saw, so a consumer is delayed but never blocked forever.
//!
//! # State machine
//!
//! - `Pending(attempt=0)` → `Ready` when a measurement meets the configured
//!   minimums (terminal success).
//! - `Pending(n)` → `Pending(n+1)` after the retry delay when the
//!   measurement fails or is below minimum and attempts remain.
//! - `Pending(max)` → `Ready` unconditionally, keeping the last observed
//!   (possibly degenerate) dimensions.
//! - `Stopped` is reachable from every state, terminal and absorbing.
//!
//! # Invariants
//!
//! 1. A session performs at most `max_retries + 1` measurement attempts.
//! 2. Retry delays are bounded and monotonically non-decreasing.
//! 3. The consumer-visible [`Measurement`] changes at most once per attempt.
//! 4. After [`stop`](ObservationSession::stop), no state mutates and no
//!    further attempt is ever due, even if a retry was already scheduled.
//!
//! The session is tick-driven: it owns deadlines, not timers. Callers ask
//! [`next_due`](ObservationSession::next_due) / [`is_due`](ObservationSession::is_due)
//! and feed attempt outcomes back with an injected clock, which keeps every
//! timing path deterministic under test.

use std::time::{Duration, Instant};

use boxwatch_core::driver::MeasureError;
use boxwatch_core::geometry::{Measurement, Size};

/// How the retry delay evolves across failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayGrowth {
    /// Every retry waits the configured delay.
    Fixed,
    /// Each retry doubles the previous delay, capped.
    Doubling {
        /// Upper bound on the delay between attempts.
        cap: Duration,
    },
}

/// Configuration for one observation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveConfig {
    /// Delay before the first retry.
    pub retry_delay: Duration,

    /// Retries after the initial attempt. Zero means exactly one attempt,
    /// whose result is terminal even when below minimum.
    pub max_retries: u32,

    /// Minimum width for a measurement to count as terminal success.
    pub min_width: u16,

    /// Minimum height for a measurement to count as terminal success.
    pub min_height: u16,

    /// Retry delay evolution.
    pub growth: DelayGrowth,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(100),
            max_retries: 3,
            min_width: 1,
            min_height: 1,
            growth: DelayGrowth::Fixed,
        }
    }
}

impl ObserveConfig {
    /// Set the base retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the minimum acceptable dimensions.
    #[must_use]
    pub fn with_min_size(mut self, min_width: u16, min_height: u16) -> Self {
        self.min_width = min_width;
        self.min_height = min_height;
        self
    }

    /// Set the delay growth policy.
    #[must_use]
    pub fn with_growth(mut self, growth: DelayGrowth) -> Self {
        self.growth = growth;
        self
    }

    /// Delay scheduled after `completed` attempts have finished.
    ///
    /// Non-decreasing in `completed` for both growth policies.
    #[must_use]
    pub fn delay_after(&self, completed: u32) -> Duration {
        match self.growth {
            DelayGrowth::Fixed => self.retry_delay,
            DelayGrowth::Doubling { cap } => {
                // Exponent is clamped; past 16 doublings the cap has long
                // since taken over for any sane base delay.
                let exp = completed.saturating_sub(1).min(16);
                self.retry_delay.saturating_mul(1u32 << exp).min(cap)
            }
        }
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Measuring, with the 0-based index of the attempt in flight or due.
    Pending {
        /// Current attempt index.
        attempt: u32,
    },
    /// Terminal: a consumer-usable result exists.
    Ready,
    /// Terminal and absorbing: torn down, nothing fires anymore.
    Stopped {
        /// Whether the session had gone ready before teardown.
        was_ready: bool,
    },
}

impl SessionPhase {
    /// Stable string form, for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Ready => "ready",
            Self::Stopped { .. } => "stopped",
        }
    }
}

/// One target's bounded-retry measurement lifecycle.
#[derive(Debug, Clone)]
pub struct ObservationSession {
    config: ObserveConfig,
    phase: SessionPhase,
    /// Last size any attempt or notification reported, `0x0` until then.
    last_size: Size,
    next_attempt_at: Option<Instant>,
    attempts_made: u32,
}

impl ObservationSession {
    /// Create a session whose first attempt is due immediately.
    #[must_use]
    pub fn new(config: ObserveConfig, now: Instant) -> Self {
        Self {
            config,
            phase: SessionPhase::Pending { attempt: 0 },
            last_size: Size::ZERO,
            next_attempt_at: Some(now),
            attempts_made: 0,
        }
    }

    /// The session's configuration.
    #[must_use]
    pub fn config(&self) -> &ObserveConfig {
        &self.config
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether a terminal result exists for consumers.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.phase, SessionPhase::Ready)
            || matches!(self.phase, SessionPhase::Stopped { was_ready: true })
    }

    /// Whether the session has been torn down.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self.phase, SessionPhase::Stopped { .. })
    }

    /// Total measurement attempts completed so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts_made
    }

    /// The consumer-visible snapshot.
    #[must_use]
    pub fn measurement(&self) -> Measurement {
        if self.is_ready() {
            Measurement::ready(self.last_size)
        } else {
            Measurement::pending(self.last_size)
        }
    }

    /// When the next attempt is due, if one is scheduled.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.next_attempt_at
    }

    /// Whether an attempt is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.phase, SessionPhase::Pending { .. })
            && self.next_attempt_at.is_some_and(|due| due <= now)
    }

    /// Feed the outcome of one measurement attempt.
    ///
    /// A failed read ([`MeasureError`]) is a failed attempt: dimensions stay
    /// as last observed and the retry policy decides what happens next.
    /// Returns the new snapshot when it changed, `None` otherwise. Calls on
    /// a ready or stopped session do nothing.
    pub fn record_attempt(
        &mut self,
        outcome: Result<Size, MeasureError>,
        now: Instant,
    ) -> Option<Measurement> {
        let SessionPhase::Pending { attempt } = self.phase else {
            return None;
        };
        let before = self.measurement();
        self.attempts_made = self.attempts_made.saturating_add(1);

        let acceptable = match outcome {
            Ok(size) => {
                self.last_size = size;
                size.meets(self.config.min_width, self.config.min_height)
            }
            Err(err) => {
                tracing::trace!(attempt, "measurement attempt failed: {err}");
                false
            }
        };

        if acceptable || attempt >= self.config.max_retries {
            self.phase = SessionPhase::Ready;
            self.next_attempt_at = None;
        } else {
            let next = attempt + 1;
            self.phase = SessionPhase::Pending { attempt: next };
            self.next_attempt_at = Some(now + self.config.delay_after(self.attempts_made));
        }

        let after = self.measurement();
        (after != before).then_some(after)
    }

    /// Fold a delivered size notification into the session.
    ///
    /// While pending, the notification stands in for the pending attempt's
    /// measurement. Once ready, it keeps the dimensions current without
    /// revoking readiness. Returns the new snapshot when it changed.
    pub fn apply_notification(&mut self, size: Size, now: Instant) -> Option<Measurement> {
        match self.phase {
            SessionPhase::Stopped { .. } => None,
            SessionPhase::Pending { .. } => self.record_attempt(Ok(size), now),
            SessionPhase::Ready => {
                if size == self.last_size {
                    None
                } else {
                    self.last_size = size;
                    Some(self.measurement())
                }
            }
        }
    }

    /// Tear the session down.
    ///
    /// Cancels any scheduled attempt synchronously. Idempotent, and safe to
    /// call from a teardown path racing an in-flight retry: every mutating
    /// entry point checks the stopped phase first and becomes a no-op.
    pub fn stop(&mut self) {
        if self.is_stopped() {
            return;
        }
        self.phase = SessionPhase::Stopped {
            was_ready: matches!(self.phase, SessionPhase::Ready),
        };
        self.next_attempt_at = None;
    }
}
