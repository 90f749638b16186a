#![forbid(unsafe_code)]

//! Process-wide containment guard.
//!
//! Installs interception for the resize-loop delivery fault on the channels
//! it can surface through outside a render tree: the process panic hook (the
//! synchronous uncaught-fault path) and the [`fault hub`](crate::fault_hub)
//! (the asynchronous one). Faults classified as the resize-loop notice are
//! absorbed; everything else reaches the previously installed behavior
//! unchanged, in the original order and shape.
//!
//! Installation must happen before any observation session starts, since the
//! host can raise the fault at any point after observation begins. The guard
//! is a process singleton: the first call wins, later calls are no-ops, and
//! wrapped hooks are never wrapped twice. There is no uninstall.
//!
//! A contained panic still unwinds; absorption here only silences its
//! report. Unwind continuation is the render boundary's job.
//!
//! The structured-log channel is covered separately by
//! [`BenignFaultFilter`](crate::log_filter::BenignFaultFilter), which hosts
//! compose into their subscriber; a global guard cannot retroactively wrap
//! an already-installed subscriber.

use std::sync::{Arc, OnceLock};

use bitflags::bitflags;

use boxwatch_core::fault::{self, FaultClass};

use crate::fault_hub::{self, AsyncFault};

bitflags! {
    /// Fault channels the guard can wrap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GuardChannels: u8 {
        /// The process panic hook.
        const PANIC_HOOK = 1 << 0;
        /// The asynchronous fault hub.
        const FAULT_HUB = 1 << 1;
    }
}

/// Result of an installation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// This call performed the installation.
    Installed,
    /// A previous call already installed the guard; nothing changed.
    AlreadyInstalled,
}

static INSTALLATION: OnceLock<GuardChannels> = OnceLock::new();

/// Install the guard on every channel.
pub fn install() -> InstallOutcome {
    install_channels(GuardChannels::all())
}

/// Install the guard on selected channels.
///
/// The first call decides the channel set for the life of the process;
/// later calls return [`InstallOutcome::AlreadyInstalled`] regardless of
/// their argument.
pub fn install_channels(channels: GuardChannels) -> InstallOutcome {
    let mut outcome = InstallOutcome::AlreadyInstalled;
    INSTALLATION.get_or_init(|| {
        if channels.contains(GuardChannels::PANIC_HOOK) {
            wrap_panic_hook();
        }
        if channels.contains(GuardChannels::FAULT_HUB) {
            wrap_fault_hub();
        }
        outcome = InstallOutcome::Installed;
        tracing::debug!(?channels, "containment guard installed");
        channels
    });
    outcome
}

/// Whether the guard has been installed.
#[must_use]
pub fn is_installed() -> bool {
    INSTALLATION.get().is_some()
}

/// The channels the guard wraps, once installed.
#[must_use]
pub fn installed_channels() -> Option<GuardChannels> {
    INSTALLATION.get().copied()
}

fn wrap_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if fault::is_benign_panic(info.payload()) {
            tracing::trace!("absorbed resize-loop panic report");
            return;
        }
        previous(info);
    }));
}

fn wrap_fault_hub() {
    let previous = fault_hub::swap_handler(None);
    fault_hub::swap_handler(Some(Arc::new(move |fault: &AsyncFault| {
        let class = fault::classify(Some(&fault.message), fault.stack.as_deref());
        if class == FaultClass::BenignResizeLoop {
            tracing::trace!(origin = fault.origin, "absorbed resize-loop delivery fault");
            return;
        }
        match &previous {
            Some(handler) => handler(fault),
            None => fault_hub::default_handler(fault),
        }
    })));
}

#[cfg(test)]
mod tests {
    use super::*;

    // Installation itself is exercised in `tests/guard_install.rs`, which
    // owns a whole process; installing here would leak wrapped hooks into
    // every other unit test in this binary.

    #[test]
    fn channel_flags_compose() {
        let all = GuardChannels::all();
        assert!(all.contains(GuardChannels::PANIC_HOOK));
        assert!(all.contains(GuardChannels::FAULT_HUB));
        assert_eq!(
            GuardChannels::PANIC_HOOK | GuardChannels::FAULT_HUB,
            GuardChannels::all()
        );
    }

    #[test]
    fn outcome_is_comparable() {
        assert_ne!(InstallOutcome::Installed, InstallOutcome::AlreadyInstalled);
    }
}
