// Sticky degraded-mode flag

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide record of whether the real backend has been abandoned.
///
/// The flag only ever moves from healthy to degraded. Share it through an
/// `Arc` between every transport that should observe the same decision.
#[derive(Debug, Default)]
pub struct DegradedModeSwitch {
    degraded: AtomicBool,
}

impl DegradedModeSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether calls are currently answered synthetically
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Switch to degraded mode. Returns true only for the call that flipped it.
    pub fn degrade(&self) -> bool {
        let flipped = self
            .degraded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if flipped {
            tracing::warn!("Failed to connect to real API, switching to simulated responses");
        }

        flipped
    }
}
