//! Shared runtime flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Monitoring switch shared by the capture, aggregation and request paths.
///
/// Read on every packet and every window tick, written only by start/stop
/// requests, so a plain atomic is enough.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    active: Arc<AtomicBool>,
}

impl MonitorState {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn set_monitoring(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn is_monitoring(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
