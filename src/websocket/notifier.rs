//! Per-connection error notices.

use std::sync::Arc;

use uuid::Uuid;

use crate::connection_manager::ConnectionRegistry;
use crate::error::RealtimeError;

use super::OutboundEnvelope;

/// Sends `error` envelopes to a single connection.
#[derive(Clone)]
pub struct ErrorNotifier {
    registry: Arc<ConnectionRegistry>,
}

impl ErrorNotifier {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Returns true if the notice was queued on an open connection.
    pub fn notify(&self, connection_id: Uuid, error: &RealtimeError) -> bool {
        tracing::warn!(connection_id = %connection_id, error = %error, "Connection error");

        let Some(handle) = self.registry.get(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "Dropping error notice for closed connection");
            return false;
        };

        match handle.try_send_envelope(OutboundEnvelope::error(error.to_string())) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Error notice not delivered");
                false
            }
        }
    }
}
