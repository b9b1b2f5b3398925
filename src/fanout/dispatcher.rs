use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::connection_manager::{ConnectionHandle, ConnectionRegistry};
use crate::metrics::FanoutMetrics;
use crate::websocket::{OutboundEnvelope, OutboundMessage};

/// Threshold for using pre-serialization (saves serialization overhead for larger sends)
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Outcome of a single `deliver` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Distinct user ids asked for
    pub target_users: usize,
    /// Connections the envelope was queued on
    pub delivered: usize,
    /// Connections found but not writable
    pub skipped: usize,
}

/// Statistics for the fan-out dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub total_deliveries: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_skipped: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_deliveries: self.total_deliveries.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_skipped: self.total_skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_deliveries: u64,
    pub total_delivered: u64,
    pub total_skipped: u64,
}

/// Pushes envelopes to every live connection of a set of users.
///
/// Delivery never waits on a peer. Frames go onto each connection's bounded
/// outbound queue with `try_send`; a connection that is closing, gone, or
/// backed up is skipped for that envelope.
pub struct FanoutDispatcher {
    registry: Arc<ConnectionRegistry>,
    stats: DispatcherStats,
}

impl FanoutDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    #[tracing::instrument(
        name = "fanout.deliver",
        skip(self, target_user_ids, envelope),
        fields(envelope = envelope.name(), user_count = target_user_ids.len())
    )]
    pub fn deliver(&self, target_user_ids: &HashSet<String>, envelope: &OutboundEnvelope) -> DeliveryReport {
        let connections: Vec<Arc<ConnectionHandle>> = target_user_ids
            .iter()
            .flat_map(|user_id| self.registry.find_by_user(user_id))
            .collect();

        let mut report = DeliveryReport {
            target_users: target_user_ids.len(),
            ..Default::default()
        };

        if connections.is_empty() {
            self.record(&report);
            return report;
        }

        let outbound = if connections.len() >= PRESERIALIZATION_THRESHOLD {
            match OutboundMessage::preserialized(envelope) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pre-serialize envelope, falling back to per-connection serialization");
                    OutboundMessage::Raw(envelope.clone())
                }
            }
        } else {
            OutboundMessage::Raw(envelope.clone())
        };

        for conn in &connections {
            match conn.try_send(outbound.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn.id,
                        user_id = ?conn.user_id(),
                        error = %e,
                        "Skipping connection"
                    );
                    report.skipped += 1;
                }
            }
        }

        self.record(&report);

        tracing::debug!(
            delivered = report.delivered,
            skipped = report.skipped,
            "Fan-out complete"
        );

        report
    }

    fn record(&self, report: &DeliveryReport) {
        self.stats.total_deliveries.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .total_skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);

        FanoutMetrics::record_delivery();
        FanoutMetrics::record_delivered(report.delivered as u64);
        FanoutMetrics::record_skipped(report.skipped as u64);
    }
}
