//! PostgreSQL-backed chat store.
//!
//! Tables:
//! - `users` - accounts, unique lower-cased email
//! - `chat_rooms` - rooms
//! - `chat_room_members` - membership, ordered by join time
//! - `chat_messages` - messages, indexed by room and creation time

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{ChatMessage, ChatRoom, NewUser, User};
use super::store::{ChatStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        profile_picture TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_rooms (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_room_members (
        room_id UUID NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
        user_id UUID NOT NULL,
        joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (room_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chat_room_members_user ON chat_room_members (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id UUID PRIMARY KEY,
        room_id UUID NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
        user_id UUID NOT NULL,
        message TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chat_messages_room_created ON chat_messages (room_id, created_at DESC)",
];

const ROOM_SELECT: &str = r#"
    SELECT r.id, r.name, r.created_at, r.updated_at,
           COALESCE(
               (SELECT array_agg(m.user_id ORDER BY m.joined_at, m.user_id)
                FROM chat_room_members m WHERE m.room_id = r.id),
               '{}'
           ) AS members
    FROM chat_rooms r
"#;

#[derive(FromRow)]
struct RoomRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    members: Vec<Uuid>,
}

impl From<RoomRow> for ChatRoom {
    fn from(row: RoomRow) -> Self {
        ChatRoom {
            id: row.id,
            name: row.name,
            members: row.members,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PostgresChatStore {
    pool: PgPool,
}

impl PostgresChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Chat schema ready");
        Ok(())
    }

    async fn touch_room(&self, room_id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        sqlx::query("UPDATE chat_rooms SET updated_at = NOW() WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        self.find_room(room_id).await
    }

    async fn room_exists(&self, room_id: Uuid) -> Result<bool, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM chat_rooms WHERE id = $1")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl ChatStore for PostgresChatStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, first_name, last_name, email, password_hash, profile_picture, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(StoreError::Duplicate("email")),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, first_name, last_name, email, password_hash, profile_picture, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, first_name, last_name, email, password_hash, profile_picture, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, User>(
            "SELECT id, first_name, last_name, email, password_hash, profile_picture, created_at, updated_at FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_room(&self, name: &str, owner: Uuid) -> Result<ChatRoom, StoreError> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO chat_rooms (id, name, created_at, updated_at) VALUES ($1, $2, $3, $3)")
            .bind(id)
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO chat_room_members (room_id, user_id, joined_at) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(owner)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(ChatRoom {
            id,
            name: name.to_string(),
            members: vec![owner],
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_room(&self, id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!("{} WHERE r.id = $1", ROOM_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ChatRoom::from))
    }

    async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, StoreError> {
        let rows = sqlx::query_as::<_, RoomRow>(&format!(
            "{} WHERE EXISTS (SELECT 1 FROM chat_room_members m WHERE m.room_id = r.id AND m.user_id = $1) ORDER BY r.created_at",
            ROOM_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChatRoom::from).collect())
    }

    async fn add_member(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        if !self.room_exists(room_id).await? {
            return Ok(None);
        }

        let result = sqlx::query(
            "INSERT INTO chat_room_members (room_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return self.touch_room(room_id).await;
        }
        self.find_room(room_id).await
    }

    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        if !self.room_exists(room_id).await? {
            return Ok(None);
        }

        let result = sqlx::query("DELETE FROM chat_room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return self.touch_room(room_id).await;
        }
        self.find_room(room_id).await
    }

    async fn insert_message(&self, room_id: Uuid, user_id: Uuid, message: &str) -> Result<ChatMessage, StoreError> {
        let now = Utc::now();
        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (id, room_id, user_id, message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, message, room_id AS room, user_id AS "user", created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room_id)
        .bind(user_id)
        .bind(message)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::trace!(message_id = %message.id, room_id = %room_id, "Message stored in PostgreSQL");

        Ok(message)
    }

    async fn list_messages(&self, room_id: Uuid, skip: i64, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, message, room_id AS room, user_id AS "user", created_at, updated_at
            FROM chat_messages
            WHERE room_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(room_id)
        .bind(skip.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }
}
