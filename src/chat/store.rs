//! Persistence boundary for users, rooms, and messages.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;

use super::models::{ChatMessage, ChatRoom, NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field is already taken
    #[error("{0} already in use")]
    Duplicate(&'static str),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => AppError::Conflict(format!("user/{}-already-in-use", field)),
            StoreError::Postgres(e) => AppError::Database(e),
        }
    }
}

/// Storage backend for the chat domain.
///
/// Membership changes return `Ok(None)` when the room does not exist.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Users with the given ids; unknown ids are left out
    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<User>, StoreError>;

    /// Create a room whose only member is `owner`
    async fn create_room(&self, name: &str, owner: Uuid) -> Result<ChatRoom, StoreError>;

    async fn find_room(&self, id: Uuid) -> Result<Option<ChatRoom>, StoreError>;

    /// Rooms the user is a member of, oldest first
    async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, StoreError>;

    /// Idempotent
    async fn add_member(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<ChatRoom>, StoreError>;

    /// Idempotent
    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<ChatRoom>, StoreError>;

    async fn insert_message(&self, room_id: Uuid, user_id: Uuid, message: &str) -> Result<ChatMessage, StoreError>;

    /// Newest first
    async fn list_messages(&self, room_id: Uuid, skip: i64, limit: i64) -> Result<Vec<ChatMessage>, StoreError>;
}
