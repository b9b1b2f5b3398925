//! In-memory chat store.
//!
//! Data lives for the lifetime of the process. Used for development and
//! tests, and as the default backend.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::models::{ChatMessage, ChatRoom, NewUser, User};
use super::store::{ChatStore, StoreError};

pub struct MemoryChatStore {
    users: DashMap<Uuid, User>,
    /// email -> user id
    emails: DashMap<String, Uuid>,
    rooms: DashMap<Uuid, ChatRoom>,
    /// room id -> messages in insertion order
    messages: DashMap<Uuid, Vec<ChatMessage>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            rooms: DashMap::new(),
            messages: DashMap::new(),
        }
    }
}

impl Default for MemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            profile_picture: None,
            created_at: now,
            updated_at: now,
        };

        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate("email")),
            Entry::Vacant(slot) => {
                // user row goes in while the email slot is still locked
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
            }
        }

        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.clone()))
            .collect())
    }

    async fn create_room(&self, name: &str, owner: Uuid) -> Result<ChatRoom, StoreError> {
        let now = Utc::now();
        let room = ChatRoom {
            id: Uuid::new_v4(),
            name: name.to_string(),
            members: vec![owner],
            created_at: now,
            updated_at: now,
        };
        self.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn find_room(&self, id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        Ok(self.rooms.get(&id).map(|r| r.clone()))
    }

    async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, StoreError> {
        let mut rooms: Vec<ChatRoom> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().has_member(user_id))
            .map(|entry| entry.value().clone())
            .collect();
        rooms.sort_by_key(|room| room.created_at);
        Ok(rooms)
    }

    async fn add_member(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        let Some(mut room) = self.rooms.get_mut(&room_id) else {
            return Ok(None);
        };
        if !room.has_member(user_id) {
            room.members.push(user_id);
            room.updated_at = Utc::now();
        }
        Ok(Some(room.clone()))
    }

    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<ChatRoom>, StoreError> {
        let Some(mut room) = self.rooms.get_mut(&room_id) else {
            return Ok(None);
        };
        if room.has_member(user_id) {
            room.members.retain(|member| *member != user_id);
            room.updated_at = Utc::now();
        }
        Ok(Some(room.clone()))
    }

    async fn insert_message(&self, room_id: Uuid, user_id: Uuid, message: &str) -> Result<ChatMessage, StoreError> {
        let now = Utc::now();
        let message = ChatMessage {
            id: Uuid::new_v4(),
            message: message.to_string(),
            room: room_id,
            user: user_id,
            created_at: now,
            updated_at: now,
        };
        self.messages.entry(room_id).or_default().push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, room_id: Uuid, skip: i64, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let Some(messages) = self.messages.get(&room_id) else {
            return Ok(Vec::new());
        };

        Ok(messages
            .iter()
            .rev()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
