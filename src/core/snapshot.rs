//! The published analysis result.
//!
//! The aggregator is the only writer. Each window it builds a complete
//! [`AnalysisSnapshot`] and swaps it in whole; readers hold an `Arc` to
//! whichever snapshot was current when they asked, so they never observe a
//! half-built value.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::core::classifier::ClassifiedFlow;

/// Result of one analysis window
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnalysisSnapshot {
    /// Unix timestamp (seconds) of the window that produced the flows
    pub timestamp: i64,
    /// Observations drained in the last window
    pub total_packets: u64,
    /// Observations per second
    pub inbound_rate: f64,
    /// Every classified flow of the window, ordered by source IP
    pub classified_flows: Vec<ClassifiedFlow>,
}

impl AnalysisSnapshot {
    /// Fully zeroed snapshot, used while monitoring is stopped.
    pub fn empty(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    /// Snapshot for an empty window: the rate fades, the packet count resets
    /// and the previous flows stay visible.
    pub fn decayed(&self, factor: f64) -> Self {
        Self {
            timestamp: self.timestamp,
            total_packets: 0,
            inbound_rate: self.inbound_rate * factor,
            classified_flows: self.classified_flows.clone(),
        }
    }

    pub fn flow(&self, ip: &str) -> Option<&ClassifiedFlow> {
        self.classified_flows.iter().find(|f| f.ip() == ip)
    }
}

/// Single-writer cell holding the current snapshot
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    current: RwLock<Arc<AnalysisSnapshot>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held snapshot.
    pub fn publish(&self, snapshot: AnalysisSnapshot) {
        let snapshot = Arc::new(snapshot);
        metrics::gauge!("inbound_rate", snapshot.inbound_rate);
        metrics::gauge!("flows_in_window", snapshot.classified_flows.len() as f64);
        *self.current.write() = snapshot;
    }

    pub fn read(&self) -> Arc<AnalysisSnapshot> {
        self.current.read().clone()
    }
}
