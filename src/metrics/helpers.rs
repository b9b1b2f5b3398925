//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::connection_manager::ConnectionStats;

use super::{
    CHAT_MESSAGES_POSTED, CONNECTIONS_AUTHENTICATED, CONNECTIONS_TOTAL, FANOUT_DELIVERED_TOTAL,
    FANOUT_DELIVERIES_TOTAL, FANOUT_SKIPPED_TOTAL, HEARTBEAT_DURATION_MS, HEARTBEAT_REAPED,
    USERS_CONNECTED, WS_HANDSHAKES_TOTAL, WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Registry gauges
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn update(stats: &ConnectionStats) {
        CONNECTIONS_TOTAL.set(stats.total_connections as i64);
        CONNECTIONS_AUTHENTICATED.set(stats.authenticated_connections as i64);
        USERS_CONNECTED.set(stats.unique_users as i64);
    }
}

/// Helper struct for recording inbound WebSocket frames
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_text() {
        WS_MESSAGES_RECEIVED.with_label_values(&["text"]).inc();
    }

    pub fn record_binary() {
        WS_MESSAGES_RECEIVED.with_label_values(&["binary"]).inc();
    }
}

pub struct HandshakeMetrics;

impl HandshakeMetrics {
    pub fn record_accepted() {
        WS_HANDSHAKES_TOTAL.with_label_values(&["accepted"]).inc();
    }

    pub fn record_rejected() {
        WS_HANDSHAKES_TOTAL.with_label_values(&["rejected"]).inc();
    }

    /// Frames that were not envelopes at all
    pub fn record_decode_error() {
        WS_HANDSHAKES_TOTAL.with_label_values(&["decode_error"]).inc();
    }
}

/// Helper struct for recording fan-out metrics
pub struct FanoutMetrics;

impl FanoutMetrics {
    pub fn record_delivery() {
        FANOUT_DELIVERIES_TOTAL.inc();
    }

    pub fn record_delivered(count: u64) {
        FANOUT_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_skipped(count: u64) {
        FANOUT_SKIPPED_TOTAL.inc_by(count);
    }
}

pub struct ChatMetrics;

impl ChatMetrics {
    pub fn record_message_posted() {
        CHAT_MESSAGES_POSTED.inc();
    }
}

pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    /// Record heartbeat round duration
    pub fn record_duration_ms(duration_ms: u64) {
        HEARTBEAT_DURATION_MS.observe(duration_ms as f64);
    }

    /// Record connections closed for inactivity
    pub fn record_reaped(count: u64) {
        HEARTBEAT_REAPED.inc_by(count);
    }
}
