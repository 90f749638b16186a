#![forbid(unsafe_code)]

//! Render-tree fault containment.
//!
//! [`FaultBoundary`] wraps a subtree and decides, per rendering fault,
//! whether the subtree continues or the fault keeps unwinding. With the
//! default [`ResizeLoopPolicy`], the resize-loop delivery notice is
//! contained: the previously committed content stands, no fallback view is
//! painted, and the next render proceeds as if nothing happened. Every
//! other fault resumes unwinding to outer boundaries.
//!
//! The child renders into a scratch canvas that is committed only on
//! success, so a fault mid-draw can never leave half-drawn content behind.

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use boxwatch_core::fault::{is_benign_resize_fault, panic_payload_message};
use boxwatch_core::geometry::Rect;

use crate::{Canvas, Widget};

/// A fault captured while rendering a subtree.
#[derive(Debug, Clone)]
pub struct RenderFault {
    /// Message extracted from the fault payload, when it had one.
    pub message: Option<String>,
}

impl RenderFault {
    /// Whether the fault text is the resize-loop delivery notice.
    #[must_use]
    pub fn is_resize_loop(&self) -> bool {
        self.message
            .as_deref()
            .is_some_and(is_benign_resize_fault)
    }
}

/// What a policy decides about a captured fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDecision {
    /// Suppress the fault; the subtree continues as if it never happened.
    Continue,
    /// Let the fault keep unwinding to outer boundaries.
    Propagate,
}

/// Decides whether a subtree continues past a rendering fault.
pub trait FaultPolicy {
    /// Classify one captured fault.
    fn on_fault(&self, fault: &RenderFault) -> FaultDecision;
}

/// The default policy: continue past resize-loop notices, propagate the
/// rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResizeLoopPolicy;

impl FaultPolicy for ResizeLoopPolicy {
    fn on_fault(&self, fault: &RenderFault) -> FaultDecision {
        if fault.is_resize_loop() {
            FaultDecision::Continue
        } else {
            FaultDecision::Propagate
        }
    }
}

/// Wraps a subtree in a fault-containment boundary.
#[derive(Debug, Clone)]
pub struct FaultBoundary<W, P = ResizeLoopPolicy> {
    inner: W,
    policy: P,
}

impl<W: Widget> FaultBoundary<W> {
    /// Wrap a widget with the default policy.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            policy: ResizeLoopPolicy,
        }
    }
}

impl<W: Widget, P: FaultPolicy> FaultBoundary<W, P> {
    /// Wrap a widget with a custom policy.
    pub fn with_policy(inner: W, policy: P) -> Self {
        Self { inner, policy }
    }

    /// The wrapped widget.
    pub fn inner(&self) -> &W {
        &self.inner
    }
}

impl<W: Widget, P: FaultPolicy> Widget for FaultBoundary<W, P> {
    fn render(&self, area: Rect, canvas: &mut Canvas) {
        if area.is_empty() {
            return;
        }

        let mut scratch = canvas.clone();
        let result = catch_unwind(AssertUnwindSafe(move || {
            self.inner.render(area, &mut scratch);
            scratch
        }));

        match result {
            Ok(scratch) => *canvas = scratch,
            Err(payload) => {
                let fault = RenderFault {
                    message: panic_payload_message(payload.as_ref()).map(str::to_string),
                };
                match self.policy.on_fault(&fault) {
                    FaultDecision::Continue => {
                        tracing::trace!("contained rendering fault in subtree");
                    }
                    FaultDecision::Propagate => resume_unwind(payload),
                }
            }
        }
    }
}
