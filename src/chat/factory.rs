//! Chat store factory

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::error::AppError;

use super::memory_store::MemoryChatStore;
use super::postgres_store::PostgresChatStore;
use super::store::ChatStore;

/// Create a chat store based on configuration.
///
/// - `"postgres"`: connects a pool to `database.url` and creates the schema
/// - `"memory"` (default): process-local store
///
/// Unknown backends fall back to memory with a warning.
pub async fn create_chat_store(config: &DatabaseConfig) -> Result<Arc<dyn ChatStore>, AppError> {
    match config.backend.as_str() {
        "postgres" => {
            if config.url.is_empty() {
                return Err(AppError::Internal(
                    "database.url is required for the postgres backend".to_string(),
                ));
            }

            let pool = PgPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                .connect(&config.url)
                .await?;

            tracing::info!(
                backend = "postgres",
                pool_size = config.pool_size,
                "PostgreSQL connection pool created"
            );

            let store = PostgresChatStore::new(pool);
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating in-memory chat store");
            Ok(Arc::new(MemoryChatStore::new()))
        }
        other => {
            tracing::warn!(backend = %other, "Unknown database backend, falling back to memory");
            Ok(Arc::new(MemoryChatStore::new()))
        }
    }
}
