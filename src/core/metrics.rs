// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the engine.
//!
//! This module uses `lazy_static` so that metrics are registered only once
//! for the whole process, no matter how many engines are started.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    // --- Gauges ---
    /// The number of connections currently registered with an engine.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("netmux_connected_clients", "Number of currently registered connections.").unwrap();

    // --- Counters ---
    /// The total number of connections admitted since startup.
    pub static ref CONNECTIONS_ACCEPTED_TOTAL: Counter =
        register_counter!("netmux_connections_accepted_total", "Total number of connections admitted.").unwrap();
    /// The total number of inbound frames decoded.
    pub static ref FRAMES_RECEIVED_TOTAL: Counter =
        register_counter!("netmux_frames_received_total", "Total number of frames received from peers.").unwrap();
    /// The total number of outbound frames written.
    pub static ref FRAMES_SENT_TOTAL: Counter =
        register_counter!("netmux_frames_sent_total", "Total number of frames written to peers.").unwrap();
    /// The total number of requests run through a task flow.
    pub static ref REQUESTS_PROCESSED_TOTAL: Counter =
        register_counter!("netmux_requests_processed_total", "Total number of requests processed.").unwrap();
    /// The total number of connections reported inactive by the keepalive sweep.
    pub static ref CONNECTIONS_DEMOTED_TOTAL: Counter =
        register_counter!("netmux_connections_demoted_total", "Total number of connections reported inactive.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
