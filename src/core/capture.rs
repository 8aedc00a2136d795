//! Packet ingestion for the traffic monitor.
//!
//! A packet source is any stream of [`PacketObservation`]s. The concrete
//! adapter here reads one observation per line from an async reader, which
//! lets an external capture tool pipe its output into the service. Observations
//! are pushed into the [`IngestionQueue`] while monitoring is active and dropped
//! otherwise.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

use crate::core::queue::BoundedQueue;
use crate::core::state::MonitorState;

/// Errors raised by a packet source
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Capture source failed: {0}")]
    Source(String),
}

/// Transport protocol of an observed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "ICMP")]
    Icmp,
    Other,
}

impl Protocol {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "TCP" => Protocol::Tcp,
            "UDP" => Protocol::Udp,
            "ICMP" => Protocol::Icmp,
            _ => Protocol::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other => "Other",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured packet, reduced to what the aggregator needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketObservation {
    /// Source IP address
    pub source_ip: String,
    /// Packet length in bytes
    pub byte_length: u64,
    /// Transport protocol
    pub protocol: Protocol,
}

impl PacketObservation {
    pub fn new(source_ip: impl Into<String>, byte_length: u64, protocol: Protocol) -> Self {
        Self {
            source_ip: source_ip.into(),
            byte_length,
            protocol,
        }
    }
}

/// Bounded buffer between the packet source and the aggregator.
///
/// Enqueue is a no-op while monitoring is inactive.
#[derive(Debug, Clone)]
pub struct IngestionQueue {
    queue: Arc<BoundedQueue<PacketObservation>>,
    state: MonitorState,
}

impl IngestionQueue {
    pub fn new(capacity: usize, state: MonitorState) -> Self {
        Self {
            queue: Arc::new(BoundedQueue::new("ingestion", capacity)),
            state,
        }
    }

    /// Queue an observation; returns `false` if it was discarded.
    pub fn enqueue(&self, observation: PacketObservation) -> bool {
        if !self.state.is_monitoring() {
            return false;
        }
        self.queue.try_enqueue(observation)
    }

    /// Take every queued observation. Used once per window.
    pub fn drain_all(&self) -> Vec<PacketObservation> {
        self.queue.drain_all()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

/// Parse `<src_ip> <length> [protocol]`.
///
/// Returns `None` for anything that is not an IP packet record.
pub fn parse_observation(line: &str) -> Option<PacketObservation> {
    let mut fields = line.split_whitespace();
    let ip: IpAddr = fields.next()?.parse().ok()?;
    let byte_length = fields.next()?.parse().ok()?;
    let protocol = fields.next().map(Protocol::from_name).unwrap_or(Protocol::Other);

    Some(PacketObservation::new(ip.to_string(), byte_length, protocol))
}

/// Packet source reading one observation per line.
///
/// Non-IP lines and sources outside `ip_filter` are skipped. The stream ends
/// at EOF or after yielding the first I/O error.
pub fn line_source<R>(
    reader: R,
    ip_filter: Option<String>,
) -> impl Stream<Item = Result<PacketObservation, CaptureError>>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold(Some(reader.lines()), move |state| {
        let ip_filter = ip_filter.clone();
        async move {
            let mut lines = state?;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(observation) = parse_observation(&line) else {
                            debug!("Skipping non-IP capture line: {:?}", line);
                            continue;
                        };
                        if let Some(prefix) = &ip_filter {
                            if !observation.source_ip.starts_with(prefix.as_str()) {
                                continue;
                            }
                        }
                        return Some((Ok(observation), Some(lines)));
                    }
                    Ok(None) => return None,
                    Err(e) => return Some((Err(CaptureError::Io(e)), None)),
                }
            }
        }
    })
}

/// Pump a packet source into the ingestion queue.
///
/// Runs until the source ends, fails, or shutdown is signalled. A source
/// failure ends only this task.
pub async fn run_ingestion<S>(
    source: S,
    queue: IngestionQueue,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), CaptureError>
where
    S: Stream<Item = Result<PacketObservation, CaptureError>>,
{
    futures::pin_mut!(source);
    info!("Starting packet ingestion...");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = source.next() => match next {
                Some(Ok(observation)) => {
                    if queue.enqueue(observation) {
                        metrics::increment_counter!("ingestion_packets_total");
                    }
                }
                Some(Err(e)) => {
                    error!("Packet capture failed, ingestion stopped: {}", e);
                    return Err(e);
                }
                None => break,
            },
        }
    }

    info!("Packet ingestion stopped.");
    Ok(())
}
