//! Windowed aggregation of packet observations.
//!
//! Every window the aggregator drains the ingestion queue, groups the
//! observations by source IP, scores and classifies each flow and publishes
//! the result. Empty windows fade the previous result instead of clearing it;
//! a stopped monitor clears it outright.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::core::blocklist::BlockList;
use crate::core::capture::{IngestionQueue, PacketObservation, Protocol};
use crate::core::classifier::classify;
use crate::core::persistence::{PersistenceQueue, PersistenceRecord};
use crate::core::scorer::{HeuristicScorer, RiskScorer};
use crate::core::snapshot::{AnalysisSnapshot, SnapshotPublisher};
use crate::core::state::MonitorState;
use crate::utils::{get_current_timestamp, per_second};

/// Per-source statistics for one window
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FlowStat {
    #[serde(rename = "ip")]
    pub source_ip: String,
    #[serde(rename = "flow_count")]
    pub packet_count: u64,
    pub total_bytes: u64,
    pub tcp_count: u64,
    pub udp_count: u64,
    pub icmp_count: u64,
    pub other_count: u64,
}

impl FlowStat {
    fn record(&mut self, observation: &PacketObservation) {
        self.packet_count += 1;
        self.total_bytes += observation.byte_length;
        match observation.protocol {
            Protocol::Tcp => self.tcp_count += 1,
            Protocol::Udp => self.udp_count += 1,
            Protocol::Icmp => self.icmp_count += 1,
            Protocol::Other => self.other_count += 1,
        }
    }
}

/// Group observations by source IP, ordered by IP.
pub fn aggregate(observations: &[PacketObservation]) -> Vec<FlowStat> {
    let mut flows: BTreeMap<&str, FlowStat> = BTreeMap::new();
    for observation in observations {
        flows
            .entry(observation.source_ip.as_str())
            .or_insert_with(|| FlowStat {
                source_ip: observation.source_ip.clone(),
                ..Default::default()
            })
            .record(observation);
    }
    flows.into_values().collect()
}

/// Aggregate, score and classify one non-empty window.
pub fn analyze_window(
    observations: &[PacketObservation],
    scorer: &dyn RiskScorer,
    window: Duration,
    timestamp: i64,
) -> AnalysisSnapshot {
    let stats = aggregate(observations);
    let mut scores = scorer.score(&stats);
    if scores.len() != stats.len() {
        warn!(
            "Scorer returned {} scores for {} flows. Falling back to threshold scoring.",
            scores.len(),
            stats.len()
        );
        metrics::increment_counter!("scorer_fallback_total");
        scores = HeuristicScorer.score(&stats);
    }
    let classified_flows = stats
        .into_iter()
        .zip(scores)
        .map(|(stat, risk)| classify(stat, risk.min(100)))
        .collect();

    AnalysisSnapshot {
        timestamp,
        total_packets: observations.len() as u64,
        inbound_rate: per_second(observations.len() as f64, window.as_secs()),
        classified_flows,
    }
}

/// Periodic window driver
pub struct WindowedAggregator {
    queue: IngestionQueue,
    scorer: Box<dyn RiskScorer>,
    publisher: Arc<SnapshotPublisher>,
    state: MonitorState,
    blocklist: Arc<BlockList>,
    persistence: Option<Arc<PersistenceQueue>>,
    window: Duration,
    decay_factor: f64,
}

impl WindowedAggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: IngestionQueue,
        scorer: Box<dyn RiskScorer>,
        publisher: Arc<SnapshotPublisher>,
        state: MonitorState,
        blocklist: Arc<BlockList>,
        persistence: Option<Arc<PersistenceQueue>>,
        window: Duration,
        decay_factor: f64,
    ) -> Self {
        Self {
            queue,
            scorer,
            publisher,
            state,
            blocklist,
            persistence,
            window,
            decay_factor,
        }
    }

    /// Process one window.
    pub async fn tick(&self) {
        if !self.state.is_monitoring() {
            self.publisher.publish(AnalysisSnapshot::empty(get_current_timestamp()));
            return;
        }

        let observations = self.queue.drain_all();
        if observations.is_empty() {
            let previous = self.publisher.read();
            self.publisher.publish(previous.decayed(self.decay_factor));
            return;
        }

        let snapshot = analyze_window(&observations, self.scorer.as_ref(), self.window, get_current_timestamp());
        info!(
            "[Analysis] {} flows from {} packets. Rate: {:.2} p/s",
            snapshot.classified_flows.len(),
            snapshot.total_packets,
            snapshot.inbound_rate
        );

        self.enqueue_records(&snapshot).await;
        self.publisher.publish(snapshot);
    }

    async fn enqueue_records(&self, snapshot: &AnalysisSnapshot) {
        let Some(queue) = &self.persistence else {
            return;
        };

        let blocked = self.blocklist.blocked_ips().await;
        let window_seconds = self.window.as_secs();
        let mut dropped = 0;
        for flow in &snapshot.classified_flows {
            let record = PersistenceRecord::from_flow(
                flow,
                snapshot.timestamp,
                window_seconds,
                blocked.contains(flow.ip()),
            );
            if !queue.try_enqueue(record) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("Persistence queue full, {} flow records dropped", dropped);
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting analysis loop (every {} seconds)...", self.window.as_secs());
        let mut ticker = time::interval(self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.changed() => break,
            }
        }

        info!("Analysis loop stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::{DdosType, FlowStatus};
    use crate::core::mitigation::LogMitigator;
    use crate::core::persistence::persistence_queue;

    struct ShortScorer;

    impl RiskScorer for ShortScorer {
        fn score(&self, flows: &[FlowStat]) -> Vec<u8> {
            vec![0; flows.len().saturating_sub(1)]
        }
    }

    struct Harness {
        aggregator: WindowedAggregator,
        queue: IngestionQueue,
        publisher: Arc<SnapshotPublisher>,
        state: MonitorState,
        blocklist: Arc<BlockList>,
        records: Arc<PersistenceQueue>,
    }

    fn harness() -> Harness {
        let state = MonitorState::new(true);
        let queue = IngestionQueue::new(10_000, state.clone());
        let publisher = Arc::new(SnapshotPublisher::new());
        let blocklist = Arc::new(BlockList::new(Arc::new(LogMitigator)));
        let records = persistence_queue(5_000);
        let aggregator = WindowedAggregator::new(
            queue.clone(),
            Box::new(HeuristicScorer),
            publisher.clone(),
            state.clone(),
            blocklist.clone(),
            Some(records.clone()),
            Duration::from_secs(5),
            0.8,
        );
        Harness {
            aggregator,
            queue,
            publisher,
            state,
            blocklist,
            records,
        }
    }

    fn push(queue: &IngestionQueue, ip: &str, protocol: Protocol, count: usize, bytes: u64) {
        for _ in 0..count {
            queue.enqueue(PacketObservation::new(ip, bytes, protocol));
        }
    }

    #[test]
    fn test_aggregate_counts_add_up() {
        let observations = vec![
            PacketObservation::new("10.0.0.2", 100, Protocol::Tcp),
            PacketObservation::new("10.0.0.1", 40, Protocol::Udp),
            PacketObservation::new("10.0.0.2", 60, Protocol::Icmp),
            PacketObservation::new("10.0.0.2", 1, Protocol::Other),
        ];

        let stats = aggregate(&observations);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].source_ip, "10.0.0.1");

        let flow = &stats[1];
        assert_eq!(flow.packet_count, 3);
        assert_eq!(flow.total_bytes, 161);
        for stat in &stats {
            assert_eq!(stat.packet_count, stat.tcp_count + stat.udp_count + stat.icmp_count + stat.other_count);
        }
        assert_eq!(stats.iter().map(|s| s.total_bytes).sum::<u64>(), 201);
    }

    #[test]
    fn test_short_scores_keep_every_flow() {
        let mut observations = Vec::new();
        for _ in 0..60 {
            observations.push(PacketObservation::new("10.0.0.1", 100, Protocol::Udp));
        }
        observations.push(PacketObservation::new("10.0.0.2", 100, Protocol::Tcp));

        let snapshot = analyze_window(&observations, &ShortScorer, Duration::from_secs(5), 0);

        assert_eq!(snapshot.classified_flows.len(), 2);
        assert_eq!(snapshot.flow("10.0.0.1").unwrap().risk, 90);
        assert_eq!(snapshot.flow("10.0.0.2").unwrap().risk, 2);
    }

    #[tokio::test]
    async fn test_tcp_flood_window() {
        let h = harness();
        push(&h.queue, "10.0.0.5", Protocol::Tcp, 120, 1000);
        push(&h.queue, "10.0.0.5", Protocol::Udp, 10, 0);

        h.aggregator.tick().await;
        let snapshot = h.publisher.read();

        assert_eq!(snapshot.total_packets, 130);
        assert_eq!(snapshot.inbound_rate, 26.0);
        let flow = snapshot.flow("10.0.0.5").unwrap();
        assert_eq!(flow.stat.packet_count, 130);
        assert_eq!(flow.stat.total_bytes, 120_000);
        assert_eq!(flow.risk, 100);
        assert_eq!(flow.status, FlowStatus::DdosAttack);
        assert_eq!(flow.ddos_type, DdosType::TcpFlood);
        assert_eq!(flow.dominant_protocol, Protocol::Tcp);

        assert_eq!(h.records.len(), 1);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_empty_window_decays_rate_and_keeps_flows() {
        let h = harness();
        push(&h.queue, "10.0.0.5", Protocol::Tcp, 50, 64);
        h.aggregator.tick().await;
        let before = h.publisher.read();

        h.aggregator.tick().await;
        let after = h.publisher.read();

        assert_eq!(after.total_packets, 0);
        assert!((after.inbound_rate - before.inbound_rate * 0.8).abs() < 1e-9);
        assert_eq!(after.classified_flows, before.classified_flows);
        assert_eq!(h.records.len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_monitor_zeroes_snapshot() {
        let h = harness();
        push(&h.queue, "10.0.0.5", Protocol::Udp, 80, 64);
        h.aggregator.tick().await;
        assert!(!h.publisher.read().classified_flows.is_empty());

        h.state.set_monitoring(false);
        h.aggregator.tick().await;
        let snapshot = h.publisher.read();

        assert_eq!(snapshot.total_packets, 0);
        assert_eq!(snapshot.inbound_rate, 0.0);
        assert!(snapshot.classified_flows.is_empty());
        assert!(snapshot.timestamp > 0);
    }

    #[tokio::test]
    async fn test_blocked_source_persisted_as_blocked() {
        let h = harness();
        h.blocklist.block("10.0.0.9", "manual").await;
        push(&h.queue, "10.0.0.9", Protocol::Tcp, 3, 64);
        push(&h.queue, "10.0.0.8", Protocol::Tcp, 3, 64);

        h.aggregator.tick().await;
        let records = h.records.drain_all();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ip, "10.0.0.8");
        assert_eq!(records[0].status, "Normal");
        assert_eq!(records[1].status, "Blocked");
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let h = harness();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(h.aggregator.run(rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
