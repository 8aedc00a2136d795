//! Write-behind persistence of classified flows.
//!
//! The aggregator enqueues one [`PersistenceRecord`] per classified flow into a
//! bounded queue; the [`BatchWriter`] periodically claims up to one batch and
//! hands it to a [`FlowStore`] as a single all-or-nothing write. A failed
//! batch is logged and lost.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::core::classifier::ClassifiedFlow;
use crate::core::queue::BoundedQueue;
use crate::utils::per_second;

/// Errors that can occur while writing a batch
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Flattened classified flow with derived rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceRecord {
    pub timestamp: i64,
    pub ip: String,
    pub risk: u8,
    pub flow_count: u64,
    pub status: String,
    pub ddos_type: String,
    pub packet_type: String,
    pub packets_per_second: f64,
    pub bits_per_second: f64,
}

impl PersistenceRecord {
    /// Flatten `flow`; a blocked source is recorded with status `Blocked`.
    pub fn from_flow(flow: &ClassifiedFlow, timestamp: i64, window_seconds: u64, blocked: bool) -> Self {
        let status = if blocked {
            "Blocked".to_string()
        } else {
            flow.status.to_string()
        };

        Self {
            timestamp,
            ip: flow.ip().to_string(),
            risk: flow.risk,
            flow_count: flow.stat.packet_count,
            status,
            ddos_type: flow.ddos_type.to_string(),
            packet_type: flow.dominant_protocol.to_string(),
            packets_per_second: per_second(flow.stat.packet_count as f64, window_seconds),
            bits_per_second: per_second(flow.stat.total_bytes as f64 * 8.0, window_seconds),
        }
    }
}

pub type PersistenceQueue = BoundedQueue<PersistenceRecord>;

pub fn persistence_queue(capacity: usize) -> Arc<PersistenceQueue> {
    Arc::new(BoundedQueue::new("persistence", capacity))
}

/// Durable store accepting ordered batches as a unit
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn insert_batch(&self, records: &[PersistenceRecord]) -> Result<(), PersistenceError>;
}

/// Appends records as JSON to a Redis list inside one MULTI/EXEC.
pub struct RedisFlowStore {
    /// Redis client; a connection is opened per batch
    client: redis::Client,
    /// Target list
    list_key: String,
}

impl RedisFlowStore {
    pub fn new(client: redis::Client, list_key: String) -> Self {
        Self { client, list_key }
    }
}

#[async_trait]
impl FlowStore for RedisFlowStore {
    async fn insert_batch(&self, records: &[PersistenceRecord]) -> Result<(), PersistenceError> {
        // Serialize everything before touching Redis so a bad record sends nothing.
        let payloads = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.client.get_async_connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for payload in &payloads {
            pipe.rpush(&self.list_key, payload).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }
}

/// Periodic batch flusher for the persistence queue
pub struct BatchWriter {
    queue: Arc<PersistenceQueue>,
    store: Arc<dyn FlowStore>,
    batch_size: usize,
    interval: Duration,
}

impl BatchWriter {
    pub fn new(
        queue: Arc<PersistenceQueue>,
        store: Arc<dyn FlowStore>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            store,
            batch_size: batch_size.max(1),
            interval,
        }
    }

    /// Write at most one batch. Returns the number of records written.
    pub async fn flush_once(&self) -> Result<usize, PersistenceError> {
        if self.queue.is_empty() {
            return Ok(0);
        }

        let batch = self.queue.drain_up_to(self.batch_size);
        if batch.is_empty() {
            return Ok(0);
        }

        let batch_id = Uuid::new_v4();
        metrics::increment_counter!("persistence_batches_total");
        match self.store.insert_batch(&batch).await {
            Ok(()) => {
                info!("[DB] Batch {} inserted {} flow records.", batch_id, batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                metrics::increment_counter!("persistence_batch_failures_total");
                warn!("[DB ERROR] Batch {} of {} records discarded: {}", batch_id, batch.len(), e);
                Err(e)
            }
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting database writer loop...");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are already logged; the batch is not retried.
                    let _ = self.flush_once().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        let _ = self.flush_once().await;
        info!("Database writer stopped.");
    }
}
