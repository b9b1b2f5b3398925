//! Connection statistics

use serde::Serialize;

/// Connection statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    /// Connections that completed the handshake
    pub authenticated_connections: usize,
    pub unique_users: usize,
}
