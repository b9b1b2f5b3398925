//! Graceful shutdown handling for the chat service.
//!
//! 1. Sends every connected client a Close frame ("going away")
//! 2. Signals background tasks to stop
//! 3. Waits for connection tasks to unregister, then aborts the rest

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection_manager::ConnectionRegistry;

/// Close code sent to clients when the server goes away
const GOING_AWAY: u16 = 1001;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for connections to close after the Close frame (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Polling interval while draining
    pub poll_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Handles graceful shutdown of the chat service
pub struct GracefulShutdown {
    registry: Arc<ConnectionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<ConnectionRegistry>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(registry, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        registry: Arc<ConnectionRegistry>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            registry,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.registry.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Closing client connections");
        result.clients_notified = self.close_clients(reason);

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Waiting for connections to close");
        result.connections_closed = self.wait_for_connections_to_close().await;

        result.connections_aborted = self.abort_remaining();

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            connections_aborted = result.connections_aborted,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    /// Queue a Close frame on every connection
    fn close_clients(&self, reason: &str) -> usize {
        let connections = self.registry.all();
        if connections.is_empty() {
            return 0;
        }

        let notified = connections
            .iter()
            .filter(|conn| conn.close(GOING_AWAY, reason))
            .count();

        tracing::info!(
            notified = notified,
            total = connections.len(),
            "Close frames queued"
        );

        notified
    }

    async fn wait_for_connections_to_close(&self) -> usize {
        let initial = self.registry.len();
        if initial == 0 {
            return 0;
        }

        let registry = &self.registry;
        let poll_interval = self.config.poll_interval;
        let wait_future = async {
            while !registry.is_empty() {
                tokio::time::sleep(poll_interval).await;
            }
        };

        let _ = timeout(self.config.drain_timeout, wait_future).await;

        initial.saturating_sub(self.registry.len())
    }

    /// Tear down whatever is still registered after the drain timeout
    fn abort_remaining(&self) -> usize {
        let remaining = self.registry.all();
        if remaining.is_empty() {
            return 0;
        }

        tracing::warn!(
            remaining_connections = remaining.len(),
            "Some connections did not close gracefully"
        );

        for conn in &remaining {
            conn.abort();
        }

        remaining.len()
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether shutdown completed successfully
    pub success: bool,
    /// Connections that had a Close frame queued
    pub clients_notified: usize,
    /// Connections that closed within the drain timeout
    pub connections_closed: usize,
    /// Connections torn down after the drain timeout
    pub connections_aborted: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}
