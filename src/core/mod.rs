//! Core functionality for the traffic monitor.
//!
//! This module contains the analysis pipeline: packet ingestion, windowed
//! aggregation, risk scoring, classification, snapshot publication,
//! auto-blocking and write-behind persistence.

pub mod aggregator;
pub mod analyzer;
pub mod auto_block;
pub mod blocklist;
pub mod capture;
pub mod classifier;
pub mod mitigation;
pub mod persistence;
pub mod queue;
pub mod scorer;
pub mod snapshot;
pub mod state;

pub use aggregator::{aggregate, analyze_window, FlowStat, WindowedAggregator};
pub use analyzer::{IpRiskReport, TrafficAnalyzer, TrafficReport};
pub use auto_block::AutoBlockPolicy;
pub use blocklist::{BlockEntry, BlockList, BlockOutcome, UnblockOutcome};
pub use capture::{line_source, run_ingestion, CaptureError, IngestionQueue, PacketObservation, Protocol};
pub use classifier::{classify, ClassifiedFlow, DdosType, FlowStatus};
pub use mitigation::{LogMitigator, MitigationAction, Mitigator, WebhookMitigator};
pub use persistence::{persistence_queue, BatchWriter, FlowStore, PersistenceQueue, PersistenceRecord, RedisFlowStore};
pub use queue::BoundedQueue;
pub use scorer::{select_scorer, HeuristicScorer, LogisticModel, ModelScorer, ProbabilisticModel, RiskScorer};
pub use snapshot::{AnalysisSnapshot, SnapshotPublisher};
pub use state::MonitorState;
