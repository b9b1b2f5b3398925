use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionRegistry;
use crate::metrics::{ConnectionMetrics, HeartbeatMetrics};
use crate::websocket::OutboundMessage;

/// Close code sent to connections reaped for inactivity
const IDLE_CLOSE_CODE: u16 = 1001;

/// Background task for keepalive pings and stale connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    registry: Arc<ConnectionRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<ConnectionRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup tasks
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval);
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval);
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats();
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_stale_connections(connection_timeout);
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a ping on every open connection.
    ///
    /// A connection whose buffer is full is not waited on; it will be reaped
    /// once it has been silent for the connection timeout.
    fn send_heartbeats(&self) {
        let connections = self.registry.all();
        let total_count = connections.len();

        if total_count == 0 {
            return;
        }

        let start = Instant::now();
        let mut sent = 0usize;
        let mut skipped = 0usize;

        for handle in &connections {
            match handle.try_send(OutboundMessage::Ping) {
                Ok(()) => sent += 1,
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(connection_id = %handle.id, error = %e, "Heartbeat not queued");
                }
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record_duration_ms(elapsed_ms);
        ConnectionMetrics::update(&self.registry.stats());

        tracing::debug!(
            total = total_count,
            sent = sent,
            skipped = skipped,
            elapsed_ms = elapsed_ms,
            "Heartbeat round completed"
        );
    }

    /// Close connections that have been silent for longer than the timeout.
    ///
    /// The connection's own task unregisters it once the socket is down.
    fn cleanup_stale_connections(&self, timeout_secs: u64) -> usize {
        let stale = self.registry.find_stale(timeout_secs);

        for handle in &stale {
            tracing::info!(
                connection_id = %handle.id,
                user_id = ?handle.user_id(),
                last_activity = %handle.last_activity(),
                "Closing idle connection"
            );
            handle.close(IDLE_CLOSE_CODE, "idle timeout");
        }

        if !stale.is_empty() {
            HeartbeatMetrics::record_reaped(stale.len() as u64);
            tracing::info!(
                removed = stale.len(),
                timeout_secs = timeout_secs,
                "Cleaned up stale connections"
            );
        }

        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::RemoteMetadata;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let config = WebSocketConfig::default();
        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config, registry, shutdown_rx);

        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_pings_connections() {
        let config = WebSocketConfig {
            heartbeat_interval: 1,
            connection_timeout: 60,
            cleanup_interval: 60,
            ..Default::default()
        };
        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(10);
        let _handle = registry.register(tx, RemoteMetadata::default());

        let task = HeartbeatTask::new(config, registry, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive heartbeat")
            .expect("Channel should not be closed");

        assert!(matches!(msg, OutboundMessage::Ping));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[test]
    fn test_cleanup_closes_idle_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(10);
        let handle = registry.register(tx, RemoteMetadata::default());
        let (_, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(WebSocketConfig::default(), registry.clone(), shutdown_rx);

        assert_eq!(task.cleanup_stale_connections(60), 0);

        // activity is tracked in whole seconds
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(task.cleanup_stale_connections(0), 1);

        assert!(matches!(
            rx.try_recv().unwrap(),
            OutboundMessage::Close { code: IDLE_CLOSE_CODE, .. }
        ));
        assert!(!handle.is_open());
        // still registered until the socket task tears it down
        assert!(registry.get(handle.id).is_some());
    }
}
