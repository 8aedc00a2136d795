//! Read/control surface over the running pipeline.
//!
//! [`TrafficAnalyzer`] owns handles to the shared state objects and is what the
//! request layer talks to: it reads the current snapshot, flips the monitoring
//! flag and edits the block set.

use std::sync::Arc;

use serde::Serialize;

use crate::core::auto_block::AutoBlockPolicy;
use crate::core::blocklist::{BlockEntry, BlockList, BlockOutcome, UnblockOutcome};
use crate::core::capture::Protocol;
use crate::core::classifier::{DdosType, FlowStatus, ANOMALY_RISK};
use crate::core::snapshot::{AnalysisSnapshot, SnapshotPublisher};
use crate::core::state::MonitorState;

/// Risk above which a single-IP lookup reports the source as a likely attacker
pub const LIKELY_DDOS_RISK: u8 = 80;

/// One source IP as shown to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub ip: String,
    pub risk: u8,
    pub flow_count: u64,
    pub total_bytes: u64,
    pub status: String,
    pub ddos_type: DdosType,
    pub packet_type: Protocol,
}

/// Snapshot enriched with block state, as served to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficReport {
    pub timestamp: i64,
    pub total_packets: u64,
    pub inbound_rate: f64,
    pub outbound_rate: f64,
    pub anomalous_flows: usize,
    pub top_source_ips: Vec<SourceReport>,
    pub system_status: &'static str,
    pub monitoring_status: &'static str,
    pub blocked_count: usize,
}

/// Risk lookup for a single IP
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpRiskReport {
    pub ip: String,
    pub risk_score: u8,
    pub is_ddos: bool,
    pub status: &'static str,
    pub recommendation: &'static str,
}

pub struct TrafficAnalyzer {
    state: MonitorState,
    publisher: Arc<SnapshotPublisher>,
    blocklist: Arc<BlockList>,
    auto_block: AutoBlockPolicy,
    risk_threshold: u8,
}

impl TrafficAnalyzer {
    pub fn new(
        state: MonitorState,
        publisher: Arc<SnapshotPublisher>,
        blocklist: Arc<BlockList>,
        risk_threshold: u8,
    ) -> Self {
        Self {
            auto_block: AutoBlockPolicy::new(blocklist.clone(), risk_threshold),
            risk_threshold,
            state,
            publisher,
            blocklist,
        }
    }

    pub fn get_snapshot(&self) -> Arc<AnalysisSnapshot> {
        self.publisher.read()
    }

    pub fn set_monitoring(&self, active: bool) {
        self.state.set_monitoring(active);
    }

    pub fn is_monitoring(&self) -> bool {
        self.state.is_monitoring()
    }

    pub async fn block(&self, ip: &str, reason: &str) -> BlockOutcome {
        self.blocklist.block(ip, reason).await
    }

    pub async fn unblock(&self, ip: &str) -> UnblockOutcome {
        self.blocklist.unblock(ip).await
    }

    pub async fn list_blocked(&self) -> Vec<BlockEntry> {
        self.blocklist.list().await
    }

    /// Current snapshot with block state applied.
    ///
    /// While monitoring is active this also runs the auto-block policy, so
    /// sources crossing the threshold show up as blocked in the same report.
    pub async fn traffic_report(&self) -> TrafficReport {
        let snapshot = self.publisher.read();
        let monitoring = self.state.is_monitoring();
        if monitoring {
            self.auto_block.apply(&snapshot).await;
        }

        let blocked = self.blocklist.blocked_ips().await;
        let top_source_ips: Vec<SourceReport> = snapshot
            .classified_flows
            .iter()
            .map(|flow| SourceReport {
                ip: flow.ip().to_string(),
                risk: flow.risk,
                flow_count: flow.stat.packet_count,
                total_bytes: flow.stat.total_bytes,
                status: if blocked.contains(flow.ip()) {
                    "Blocked".to_string()
                } else {
                    flow.status.to_string()
                },
                ddos_type: flow.ddos_type,
                packet_type: flow.dominant_protocol,
            })
            .collect();

        let anomalous_flows = snapshot
            .classified_flows
            .iter()
            .filter(|f| f.status != FlowStatus::Normal)
            .count();
        let under_attack = snapshot
            .classified_flows
            .iter()
            .any(|f| f.status == FlowStatus::DdosAttack);

        TrafficReport {
            timestamp: snapshot.timestamp,
            total_packets: snapshot.total_packets,
            inbound_rate: snapshot.inbound_rate,
            outbound_rate: 0.0,
            anomalous_flows,
            top_source_ips,
            system_status: if under_attack { "HIGH ALERT" } else { "Nominal" },
            monitoring_status: if monitoring { "Active" } else { "Stopped" },
            blocked_count: blocked.len(),
        }
    }

    /// Risk of `ip` in the current window; unseen sources score 0.
    ///
    /// "Block Immediately" is recommended exactly when the auto-block policy
    /// would block the source.
    pub async fn ip_risk(&self, ip: &str) -> IpRiskReport {
        let risk = self.publisher.read().flow(ip).map(|f| f.risk).unwrap_or(0);
        let status = if self.blocklist.contains(ip).await {
            "BLOCKED"
        } else {
            "Monitored"
        };
        let recommendation = if risk > self.risk_threshold {
            "Block Immediately"
        } else if risk > ANOMALY_RISK {
            "Monitor Closely"
        } else {
            "Normal"
        };

        IpRiskReport {
            ip: ip.to_string(),
            risk_score: risk,
            is_ddos: risk > LIKELY_DDOS_RISK,
            status,
            recommendation,
        }
    }
}
