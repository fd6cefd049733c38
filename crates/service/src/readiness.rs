//! Readiness gate shared between a service and its operator listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flipped on once service setup completes, off at the start of shutdown.
#[derive(Clone, Debug, Default)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn unset_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_starts_not_ready_and_toggles() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_ready());

        gate.set_ready();
        assert!(gate.is_ready());

        // Clones observe the same state.
        let clone = gate.clone();
        clone.unset_ready();
        assert!(!gate.is_ready());
    }
}
