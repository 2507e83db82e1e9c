//! Prometheus metrics for the message relay
//!
//! Exposed on the /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

use crate::types::ChainId;

lazy_static! {
    // Listener metrics
    pub static ref EVENTS_OBSERVED: CounterVec = register_counter_vec!(
        "relay_events_observed_total",
        "Bridge events delivered by a listener after dedupe",
        &["chain", "kind"]
    ).unwrap();

    pub static ref DUPLICATES_DROPPED: CounterVec = register_counter_vec!(
        "relay_duplicates_dropped_total",
        "Events or messages dropped as already seen",
        &["chain", "stage"]
    ).unwrap();

    pub static ref LATEST_BLOCK: GaugeVec = register_gauge_vec!(
        "relay_latest_block",
        "Latest chain tip seen by the listener",
        &["chain"]
    ).unwrap();

    pub static ref LAST_PROCESSED_BLOCK: GaugeVec = register_gauge_vec!(
        "relay_last_processed_block",
        "Last block reconciled by the poll path",
        &["chain"]
    ).unwrap();

    pub static ref LISTENER_CONNECTED: GaugeVec = register_gauge_vec!(
        "relay_listener_connected",
        "Whether the chain listener is connected (1) or not (0)",
        &["chain"]
    ).unwrap();

    // Dispatcher metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "relay_tx_submitted_total",
        "Transactions broadcast to a destination chain",
        &["chain", "mode"]
    ).unwrap();

    pub static ref TX_OUTCOMES: CounterVec = register_counter_vec!(
        "relay_tx_outcomes_total",
        "Final outcome of submitted transactions",
        &["chain", "status"]
    ).unwrap();

    pub static ref CONSECUTIVE_FAILURES: GaugeVec = register_gauge_vec!(
        "relay_consecutive_failures",
        "Number of consecutive failures (circuit breaker)",
        &["chain"]
    ).unwrap();

    pub static ref NONCE_RESYNCS: CounterVec = register_counter_vec!(
        "relay_nonce_resyncs_total",
        "Nonce cursor resyncs after a conflict",
        &["chain"]
    ).unwrap();

    // Orchestrator metrics
    pub static ref MESSAGES_PROCESSED: CounterVec = register_counter_vec!(
        "relay_messages_processed_total",
        "Messages driven to completion",
        &["chain", "mode"]
    ).unwrap();

    pub static ref MESSAGES_FAILED: CounterVec = register_counter_vec!(
        "relay_messages_failed_total",
        "Messages dropped after exhausting retries",
        &["chain"]
    ).unwrap();

    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "relay_queue_depth",
        "Messages waiting for the next batch"
    ).unwrap();

    pub static ref PROCESSING_LATENCY: HistogramVec = register_histogram_vec!(
        "relay_processing_latency_seconds",
        "Time from observation to confirmed execution",
        &["chain"],
        vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "relay_errors_total",
        "Total number of errors",
        &["chain", "type"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "relay_up",
        "Whether the relay is up and running"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: GaugeVec = register_gauge_vec!(
        "relay_last_successful_poll_timestamp",
        "Unix timestamp of last successful poll",
        &["chain"]
    ).unwrap();
}

/// Record an event delivered by a listener
pub fn record_event_observed(chain_id: ChainId, kind: &str) {
    EVENTS_OBSERVED
        .with_label_values(&[&chain_id.to_string(), kind])
        .inc();
}

/// Record a duplicate dropped at `stage` ("listener" or "orchestrator")
pub fn record_duplicate(chain_id: ChainId, stage: &str) {
    DUPLICATES_DROPPED
        .with_label_values(&[&chain_id.to_string(), stage])
        .inc();
}

pub fn set_latest_block(chain_id: ChainId, block_number: u64) {
    LATEST_BLOCK
        .with_label_values(&[&chain_id.to_string()])
        .set(block_number as f64);
}

/// Record a completed poll pass up to `block_number`
pub fn record_successful_poll(chain_id: ChainId, block_number: u64) {
    let chain = chain_id.to_string();
    LAST_PROCESSED_BLOCK
        .with_label_values(&[&chain])
        .set(block_number as f64);
    LAST_SUCCESSFUL_POLL
        .with_label_values(&[&chain])
        .set(chrono::Utc::now().timestamp() as f64);
}

pub fn set_listener_connected(chain_id: ChainId, connected: bool) {
    LISTENER_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if connected { 1.0 } else { 0.0 });
}

pub fn record_tx_submitted(chain_id: ChainId, mode: &str) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string(), mode])
        .inc();
}

/// Record a transaction outcome ("confirmed", "failed", "cancelled")
pub fn record_tx_outcome(chain_id: ChainId, status: &str) {
    TX_OUTCOMES
        .with_label_values(&[&chain_id.to_string(), status])
        .inc();
}

/// Update consecutive failures (circuit breaker)
pub fn set_consecutive_failures(chain_id: ChainId, count: u32) {
    CONSECUTIVE_FAILURES
        .with_label_values(&[&chain_id.to_string()])
        .set(count as f64);
}

pub fn record_nonce_resync(chain_id: ChainId) {
    NONCE_RESYNCS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_message_processed(chain_id: ChainId, mode: &str) {
    MESSAGES_PROCESSED
        .with_label_values(&[&chain_id.to_string(), mode])
        .inc();
}

pub fn record_message_failed(chain_id: ChainId) {
    MESSAGES_FAILED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as f64);
}

/// Record processing latency
pub fn record_latency(chain_id: ChainId, seconds: f64) {
    PROCESSING_LATENCY
        .with_label_values(&[&chain_id.to_string()])
        .observe(seconds);
}

/// Record an error
pub fn record_error(chain_id: ChainId, error_type: &str) {
    ERRORS
        .with_label_values(&[&chain_id.to_string(), error_type])
        .inc();
}

/// Encode the default registry in Prometheus text format
pub fn render() -> eyre::Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
