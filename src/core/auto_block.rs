//! Policy-driven blocking of high-risk sources.

use std::sync::Arc;

use log::info;

use crate::core::blocklist::{BlockList, BlockOutcome};
use crate::core::snapshot::AnalysisSnapshot;

/// Blocks every flow whose risk is strictly above the threshold.
///
/// Invoked by whoever reads the snapshot, not on a timer. Re-running it on
/// the same snapshot is a no-op for IPs already in the block set.
pub struct AutoBlockPolicy {
    blocklist: Arc<BlockList>,
    risk_threshold: u8,
}

impl AutoBlockPolicy {
    pub fn new(blocklist: Arc<BlockList>, risk_threshold: u8) -> Self {
        Self {
            blocklist,
            risk_threshold,
        }
    }

    /// Returns the IPs newly blocked by this invocation.
    pub async fn apply(&self, snapshot: &AnalysisSnapshot) -> Vec<String> {
        let mut newly_blocked = Vec::new();

        for flow in snapshot.classified_flows.iter().filter(|f| f.risk > self.risk_threshold) {
            let reason = format!("Auto-Blocked (Risk {}%)", flow.risk);
            if self.blocklist.block(flow.ip(), &reason).await == BlockOutcome::Blocked {
                info!("[AUTO-BLOCK TRIGGERED] IP {} added to block list.", flow.ip());
                metrics::increment_counter!("auto_block_total");
                newly_blocked.push(flow.ip().to_string());
            }
        }

        newly_blocked
    }
}
