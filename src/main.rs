//! DDoS Traffic Monitor
//!
//! This is the main entry point for the traffic monitor.
//! It wires the analysis pipeline, starts its background tasks and serves
//! the HTTP API until shutdown.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{error, info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::BufReader;
use tokio::sync::watch;

use ddos_traffic_monitor::api::{self, ApiState};
use ddos_traffic_monitor::config::load_config;
use ddos_traffic_monitor::core::{
    line_source, persistence_queue, run_ingestion, select_scorer, BatchWriter, BlockList,
    IngestionQueue, LogMitigator, Mitigator, MonitorState, RedisFlowStore, SnapshotPublisher,
    TrafficAnalyzer, WebhookMitigator, WindowedAggregator,
};
use ddos_traffic_monitor::models::CaptureConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting DDoS Traffic Monitor...");

    // Load configuration
    let config = load_config().context("Failed to load configuration")?;

    if config.metrics.enabled {
        let listen: std::net::SocketAddr = config.metrics.listen.parse()
            .context("Invalid metrics listen address")?;
        PrometheusBuilder::new()
            .with_http_listener(listen)
            .install()
            .context("Failed to install Prometheus exporter")?;
    }

    let state = MonitorState::new(config.pipeline.start_monitoring);
    let publisher = Arc::new(SnapshotPublisher::new());
    let mitigator: Arc<dyn Mitigator> = match &config.mitigation.webhook_url {
        Some(url) => Arc::new(WebhookMitigator::new(url.clone())),
        None => Arc::new(LogMitigator),
    };
    let blocklist = Arc::new(BlockList::new(mitigator));
    let ingestion = IngestionQueue::new(config.pipeline.ingestion_capacity, state.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Write-behind persistence
    let records = if config.persistence.enabled {
        let client = redis::Client::open(config.persistence.redis_url.as_str())
            .context("Failed to create Redis client")?;
        let queue = persistence_queue(config.persistence.queue_capacity);
        let writer = BatchWriter::new(
            queue.clone(),
            Arc::new(RedisFlowStore::new(client, config.persistence.list_key.clone())),
            config.persistence.batch_size,
            Duration::from_secs(config.persistence.flush_interval_seconds.max(1)),
        );
        tokio::spawn(writer.run(shutdown_rx.clone()));
        Some(queue)
    } else {
        None
    };

    // Windowed analysis
    let window = config.pipeline.window();
    let aggregator = WindowedAggregator::new(
        ingestion.clone(),
        select_scorer(config.scorer.model_path.as_deref(), window),
        publisher.clone(),
        state.clone(),
        blocklist.clone(),
        records,
        window,
        config.pipeline.decay_factor,
    );
    tokio::spawn(aggregator.run(shutdown_rx.clone()));

    // Packet ingestion
    spawn_ingestion(&config.capture, ingestion, shutdown_rx.clone());

    let analyzer = Arc::new(TrafficAnalyzer::new(
        state,
        publisher,
        blocklist,
        config.auto_block.risk_threshold,
    ));
    let api_state = web::Data::new(ApiState { analyzer });

    // Start HTTP server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(api_state.clone())
            .configure(api::config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run();

    info!("API listening on {}:{}", config.server.host, config.server.port);
    let result = server.await;

    // Stop the background tasks on exit
    let _ = shutdown_tx.send(true);
    result.map_err(Into::into)
}

fn spawn_ingestion(capture: &CaptureConfig, queue: IngestionQueue, shutdown: watch::Receiver<bool>) {
    let input = capture.input.clone();
    let ip_filter = capture.ip_filter.clone();

    tokio::spawn(async move {
        let result = match input {
            Some(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => run_ingestion(line_source(BufReader::new(file), ip_filter), queue, shutdown).await,
                Err(e) => {
                    error!("Capture input {} could not be opened: {}", path, e);
                    return;
                }
            },
            None => run_ingestion(line_source(BufReader::new(tokio::io::stdin()), ip_filter), queue, shutdown).await,
        };
        if result.is_err() {
            warn!("Ingestion task ended; serving the last published snapshot.");
        }
    });
}
