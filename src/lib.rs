// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Real-time core
pub mod connection_manager;
pub mod fanout;
pub mod websocket;

// Chat domain
pub mod chat;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod shutdown;
pub mod tasks;
