use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::RealtimeError;
use crate::websocket::OutboundMessage;

use super::stats::ConnectionStats;
use super::types::{ConnectionHandle, RemoteMetadata};

/// Tracks every open WebSocket connection and the user bound to it.
///
/// The registry is the only owner of connection entries. Readers always see
/// fully constructed handles: an entry is built before it is inserted and a
/// user is attached through the handle's write-once slot.
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// user_id -> Set<connection_id> (supports multiple devices)
    user_index: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
        }
    }

    /// Register a new, unauthenticated connection
    pub fn register(
        &self,
        sender: mpsc::Sender<OutboundMessage>,
        metadata: RemoteMetadata,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(sender, metadata));
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());

        tracing::info!(
            connection_id = %conn_id,
            remote_addr = ?handle.metadata.remote_addr,
            "Connection registered"
        );

        handle
    }

    /// Unregister a connection. Returns false if it was already gone.
    pub fn unregister(&self, connection_id: Uuid) -> bool {
        let Some((_, handle)) = self.connections.remove(&connection_id) else {
            return false;
        };

        handle.mark_closed();

        if let Some(user_id) = handle.user_id() {
            self.remove_from_index(user_id, connection_id);
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = ?handle.user_id(),
            "Connection unregistered"
        );

        true
    }

    /// Attach an authenticated user to a connection
    pub fn bind(&self, connection_id: Uuid, user_id: &str) -> Result<(), RealtimeError> {
        let handle = self
            .connections
            .get(&connection_id)
            .map(|h| h.clone())
            .ok_or(RealtimeError::UnknownConnection(connection_id))?;

        if !handle.bind_user(user_id) {
            return Err(RealtimeError::AlreadyBound(connection_id));
        }

        self.user_index
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id);

        // unregister may have run between the lookup and the index insert
        if !self.connections.contains_key(&connection_id) {
            self.remove_from_index(user_id, connection_id);
            return Err(RealtimeError::UnknownConnection(connection_id));
        }

        tracing::info!(connection_id = %connection_id, user_id = %user_id, "Connection bound to user");

        Ok(())
    }

    /// Connections currently bound to a user, snapshotted at call time
    pub fn find_by_user(&self, user_id: &str) -> impl Iterator<Item = Arc<ConnectionHandle>> {
        let snapshot: Vec<Arc<ConnectionHandle>> = self
            .user_index
            .get(user_id)
            .map(|conn_ids| {
                conn_ids
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default();

        snapshot.into_iter()
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// Get all connections
    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        let authenticated = self
            .connections
            .iter()
            .filter(|entry| entry.value().is_authenticated())
            .count();

        ConnectionStats {
            total_connections: self.connections.len(),
            authenticated_connections: authenticated,
            unique_users: self.user_index.len(),
        }
    }

    /// Find connections that have been inactive for longer than the timeout
    pub fn find_stale(&self, timeout_secs: u64) -> Vec<Arc<ConnectionHandle>> {
        let now = chrono::Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn remove_from_index(&self, user_id: &str, connection_id: Uuid) {
        if let Some(mut user_conns) = self.user_index.get_mut(user_id) {
            user_conns.remove(&connection_id);
        }
        self.user_index.remove_if(user_id, |_, conns| conns.is_empty());
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
