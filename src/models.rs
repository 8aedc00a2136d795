use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Windowed analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Length of one aggregation window in seconds
    pub window_seconds: u64,
    /// Maximum number of packet observations buffered between windows
    pub ingestion_capacity: usize,
    /// Factor applied to the inbound rate on an empty window
    pub decay_factor: f64,
    /// Whether monitoring is active right after startup
    pub start_monitoring: bool,
}

impl PipelineConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds.max(1))
    }
}

/// Risk scorer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Path to a JSON model artifact; heuristic scoring only when absent
    pub model_path: Option<String>,
}

/// Packet capture adapter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// File to read observations from; stdin when absent
    pub input: Option<String>,
    /// Only observations whose source IP starts with this prefix are accepted
    pub ip_filter: Option<String>,
}

/// Write-behind persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Whether flow records are persisted at all
    pub enabled: bool,
    /// Redis connection URL
    pub redis_url: String,
    /// Redis list receiving one JSON document per flow record
    pub list_key: String,
    /// Maximum number of records waiting for the writer
    pub queue_capacity: usize,
    /// Maximum number of records written per batch
    pub batch_size: usize,
    /// Delay between batch writes in seconds
    pub flush_interval_seconds: u64,
}

/// Mitigation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MitigationConfig {
    /// Firewall agent endpoint notified on block/unblock; log-only when absent
    pub webhook_url: Option<String>,
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus exporter
    pub enabled: bool,
    /// Exporter listen address
    pub listen: String,
}

/// Auto-block policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoBlockConfig {
    /// Flows with a risk strictly above this value are blocked
    pub risk_threshold: u8,
}

/// Application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Windowed analysis configuration
    pub pipeline: PipelineConfig,
    /// Risk scorer configuration
    pub scorer: ScorerConfig,
    /// Capture adapter configuration
    pub capture: CaptureConfig,
    /// Persistence configuration
    pub persistence: PersistenceConfig,
    /// Mitigation configuration
    pub mitigation: MitigationConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
    /// Auto-block configuration
    pub auto_block: AutoBlockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            pipeline: PipelineConfig {
                window_seconds: 5,
                ingestion_capacity: 10_000,
                decay_factor: 0.8,
                start_monitoring: false,
            },
            scorer: ScorerConfig::default(),
            capture: CaptureConfig::default(),
            persistence: PersistenceConfig {
                enabled: true,
                redis_url: "redis://127.0.0.1:6379".to_string(),
                list_key: "ip_traffic".to_string(),
                queue_capacity: 5_000,
                batch_size: 100,
                flush_interval_seconds: 2,
            },
            mitigation: MitigationConfig::default(),
            metrics: MetricsConfig {
                enabled: true,
                listen: "0.0.0.0:9000".to_string(),
            },
            auto_block: AutoBlockConfig { risk_threshold: 90 },
        }
    }
}
