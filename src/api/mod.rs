//! API layer - HTTP endpoint handlers organized by domain.

mod auth;
mod chat;
mod health;
mod metrics;
mod response;
mod routes;
mod users;

pub use health::{health, stats, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use response::{ApiResponse, ApiResult};
pub use routes::{api_routes, not_found, API_PREFIX};
