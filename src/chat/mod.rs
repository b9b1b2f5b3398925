//! Chat domain: users, rooms, messages, and their persistence.

mod factory;
mod memory_store;
mod models;
mod postgres_store;
mod service;
mod store;
mod users;

pub use factory::create_chat_store;
pub use memory_store::MemoryChatStore;
pub use models::{ChatMessage, ChatMessageView, ChatRoom, ChatRoomView, NewUser, User, UserProfile};
pub use postgres_store::PostgresChatStore;
pub use service::ChatService;
pub use store::{ChatStore, StoreError};
pub use users::{Registration, UserService};
