use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::{AppError, Result};
use crate::fanout::FanoutDispatcher;
use crate::metrics::ChatMetrics;
use crate::websocket::OutboundEnvelope;

use super::models::{ChatMessage, ChatMessageView, ChatRoom, ChatRoomView, User, UserProfile};
use super::store::ChatStore;

const NOT_FOUND: &str = "not-found";

/// Room and message flows for authenticated users.
///
/// Rooms the caller is not a member of are reported as `not-found`.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    dispatcher: Arc<FanoutDispatcher>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, dispatcher: Arc<FanoutDispatcher>, config: ChatConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub async fn create_room(&self, owner: &User, name: &str) -> Result<ChatRoomView> {
        let room = self.store.create_room(name, owner.id).await?;
        tracing::info!(room_id = %room.id, owner = %owner.id, "Chat room created");
        self.room_view(room).await
    }

    pub async fn list_rooms(&self, user: &User) -> Result<Vec<ChatRoomView>> {
        let rooms = self.store.rooms_for_user(user.id).await?;
        let mut views = Vec::with_capacity(rooms.len());
        for room in rooms {
            views.push(self.room_view(room).await?);
        }
        Ok(views)
    }

    pub async fn get_room(&self, user: &User, room_id: Uuid) -> Result<ChatRoomView> {
        let room = self.member_room(user, room_id).await?;
        self.room_view(room).await
    }

    /// Persist a message, then push it to every connected member.
    ///
    /// Delivery is best-effort; the response depends only on persistence.
    #[tracing::instrument(name = "chat.post_message", skip(self, author, text), fields(user_id = %author.id))]
    pub async fn post_message(&self, author: &User, room_id: Uuid, text: &str) -> Result<ChatMessageView> {
        let room = self.member_room(author, room_id).await?;

        let message = self.store.insert_message(room.id, author.id, text).await?;
        ChatMetrics::record_message_posted();

        let view = ChatMessageView::new(message, Some(author.profile()));

        let members: HashSet<String> = room.members.iter().map(Uuid::to_string).collect();
        let report = self
            .dispatcher
            .deliver(&members, &OutboundEnvelope::chat_message(view.clone()));

        tracing::debug!(
            message_id = %view.id,
            delivered = report.delivered,
            skipped = report.skipped,
            "Message posted"
        );

        Ok(view)
    }

    /// Newest first. Non-members get an empty page.
    pub async fn list_messages(
        &self,
        user: &User,
        room_id: Uuid,
        skip: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessageView>> {
        let room = self
            .store
            .find_room(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))?;

        if !room.has_member(user.id) {
            return Ok(Vec::new());
        }

        let (skip, limit) = self.page(skip, limit);
        let messages = self.store.list_messages(room.id, skip, limit).await?;
        self.message_views(messages).await
    }

    /// Add `target` to a room the caller belongs to
    pub async fn add_member(&self, user: &User, room_id: Uuid, target: Uuid) -> Result<ChatRoomView> {
        self.member_room(user, room_id).await?;

        if self.store.find_user(target).await?.is_none() {
            return Err(AppError::NotFound("user/not-found".to_string()));
        }

        let room = self
            .store
            .add_member(room_id, target)
            .await?
            .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))?;

        tracing::info!(room_id = %room_id, user_id = %target, added_by = %user.id, "Member added");
        self.room_view(room).await
    }

    pub async fn remove_member(&self, user: &User, room_id: Uuid, target: Uuid) -> Result<ChatRoomView> {
        self.member_room(user, room_id).await?;

        let room = self
            .store
            .remove_member(room_id, target)
            .await?
            .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))?;

        tracing::info!(room_id = %room_id, user_id = %target, removed_by = %user.id, "Member removed");
        self.room_view(room).await
    }

    fn page(&self, skip: Option<i64>, limit: Option<i64>) -> (i64, i64) {
        let skip = skip.unwrap_or(0).max(0);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size);
        (skip, limit)
    }

    async fn member_room(&self, user: &User, room_id: Uuid) -> Result<ChatRoom> {
        match self.store.find_room(room_id).await? {
            Some(room) if room.has_member(user.id) => Ok(room),
            _ => Err(AppError::NotFound(NOT_FOUND.to_string())),
        }
    }

    async fn profiles(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>> {
        let users = self.store.find_users(ids).await?;
        Ok(users.iter().map(|u| (u.id, u.profile())).collect())
    }

    async fn room_view(&self, room: ChatRoom) -> Result<ChatRoomView> {
        let mut profiles = self.profiles(&room.members).await?;
        let members = room
            .members
            .iter()
            .filter_map(|id| profiles.remove(id))
            .collect();

        Ok(ChatRoomView {
            id: room.id,
            name: room.name,
            members,
            created_at: room.created_at,
            updated_at: room.updated_at,
        })
    }

    async fn message_views(&self, messages: Vec<ChatMessage>) -> Result<Vec<ChatMessageView>> {
        let authors: Vec<Uuid> = messages
            .iter()
            .map(|m| m.user)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let profiles = self.profiles(&authors).await?;

        Ok(messages
            .into_iter()
            .map(|m| {
                let author = profiles.get(&m.user).cloned();
                ChatMessageView::new(m, author)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::NewUser;
    use crate::chat::MemoryChatStore;
    use crate::connection_manager::{ConnectionRegistry, RemoteMetadata};
    use crate::websocket::OutboundMessage;
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<MemoryChatStore>,
        registry: Arc<ConnectionRegistry>,
        service: ChatService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryChatStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(FanoutDispatcher::new(registry.clone()));
        let service = ChatService::new(
            store.clone(),
            dispatcher,
            ChatConfig {
                default_page_size: 3,
                max_page_size: 4,
            },
        );
        Fixture {
            store,
            registry,
            service,
        }
    }

    async fn user(store: &MemoryChatStore, email: &str) -> User {
        store
            .create_user(NewUser {
                first_name: "First".to_string(),
                last_name: "Last".to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
    }

    fn connect(registry: &ConnectionRegistry, user: &User) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(8);
        let handle = registry.register(tx, RemoteMetadata::default());
        registry.bind(handle.id, &user.id.to_string()).unwrap();
        rx
    }

    #[tokio::test]
    async fn test_post_message_persists_and_fans_out() {
        let f = fixture();
        let alice = user(&f.store, "alice@example.com").await;
        let bob = user(&f.store, "bob@example.com").await;
        let carol = user(&f.store, "carol@example.com").await;

        let room = f.service.create_room(&alice, "general").await.unwrap();
        f.service.add_member(&alice, room.id, bob.id).await.unwrap();

        let mut rx_alice = connect(&f.registry, &alice);
        let mut rx_bob = connect(&f.registry, &bob);
        let mut rx_carol = connect(&f.registry, &carol);

        let view = f.service.post_message(&alice, room.id, "hello").await.unwrap();
        assert_eq!(view.message, "hello");
        assert_eq!(view.user.as_ref().map(|u| u.id), Some(alice.id));

        for rx in [&mut rx_alice, &mut rx_bob] {
            match rx.try_recv().unwrap() {
                OutboundMessage::Raw(OutboundEnvelope::ChatMessage { data }) => {
                    assert_eq!(data.message.id, view.id);
                }
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        assert!(rx_carol.try_recv().is_err());

        let history = f.service.list_messages(&bob, room.id, None, None).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_post_message_requires_membership() {
        let f = fixture();
        let alice = user(&f.store, "alice@example.com").await;
        let mallory = user(&f.store, "mallory@example.com").await;
        let room = f.service.create_room(&alice, "general").await.unwrap();

        let err = f.service.post_message(&mallory, room.id, "hi").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "not-found"));

        let err = f.service.post_message(&alice, Uuid::new_v4(), "hi").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_post_without_live_connections_still_succeeds() {
        let f = fixture();
        let alice = user(&f.store, "alice@example.com").await;
        let room = f.service.create_room(&alice, "general").await.unwrap();

        assert!(f.service.post_message(&alice, room.id, "anyone?").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_messages_paging_and_visibility() {
        let f = fixture();
        let alice = user(&f.store, "alice@example.com").await;
        let outsider = user(&f.store, "eve@example.com").await;
        let room = f.service.create_room(&alice, "general").await.unwrap();

        for i in 0..6 {
            f.service.post_message(&alice, room.id, &format!("m{i}")).await.unwrap();
        }

        let texts = |views: Vec<ChatMessageView>| views.into_iter().map(|v| v.message).collect::<Vec<_>>();

        assert_eq!(
            texts(f.service.list_messages(&alice, room.id, None, None).await.unwrap()),
            vec!["m5", "m4", "m3"]
        );
        assert_eq!(
            texts(f.service.list_messages(&alice, room.id, Some(1), Some(100)).await.unwrap()),
            vec!["m4", "m3", "m2", "m1"]
        );
        assert!(f
            .service
            .list_messages(&outsider, room.id, None, None)
            .await
            .unwrap()
            .is_empty());

        let err = f
            .service
            .list_messages(&alice, Uuid::new_v4(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_room_views_populate_members() {
        let f = fixture();
        let alice = user(&f.store, "alice@example.com").await;
        let bob = user(&f.store, "bob@example.com").await;

        let room = f.service.create_room(&alice, "general").await.unwrap();
        let room = f.service.add_member(&alice, room.id, bob.id).await.unwrap();
        let emails: Vec<_> = room.members.iter().map(|m| m.email.as_str()).collect();
        assert_eq!(emails, vec!["alice@example.com", "bob@example.com"]);

        assert_eq!(f.service.list_rooms(&bob).await.unwrap().len(), 1);

        let room = f.service.remove_member(&bob, room.id, alice.id).await.unwrap();
        assert_eq!(room.members.len(), 1);
        assert!(f.service.get_room(&alice, room.id).await.is_err());
    }

    #[tokio::test]
    async fn test_add_unknown_user_is_not_found() {
        let f = fixture();
        let alice = user(&f.store, "alice@example.com").await;
        let room = f.service.create_room(&alice, "general").await.unwrap();

        let err = f.service.add_member(&alice, room.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "user/not-found"));
    }
}
