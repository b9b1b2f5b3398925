//! Connection management for WebSocket connections
//!
//! This module provides:
//! - Connection handle management
//! - User indexing (one user may hold several connections)
//! - Connection statistics

mod registry;
mod stats;
mod types;

pub use registry::ConnectionRegistry;
pub use stats::ConnectionStats;
pub use types::{ConnectionHandle, RemoteMetadata, TransportState};
