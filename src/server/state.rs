use std::sync::Arc;
use std::time::Instant;

use crate::auth::TokenService;
use crate::chat::{ChatService, ChatStore, UserService};
use crate::config::Settings;
use crate::connection_manager::ConnectionRegistry;
use crate::fanout::FanoutDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub token_service: Arc<TokenService>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<FanoutDispatcher>,
    pub store: Arc<dyn ChatStore>,
    pub chat: Arc<ChatService>,
    pub users: Arc<UserService>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services around a store; the registry starts empty.
    pub fn new(settings: Settings, store: Arc<dyn ChatStore>) -> Self {
        let token_service = Arc::new(TokenService::new(&settings.jwt));
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(FanoutDispatcher::new(registry.clone()));
        let chat = Arc::new(ChatService::new(
            store.clone(),
            dispatcher.clone(),
            settings.chat.clone(),
        ));
        let users = Arc::new(UserService::new(store.clone(), token_service.clone()));

        Self {
            settings: Arc::new(settings),
            token_service,
            registry,
            dispatcher,
            store,
            chat,
            users,
            start_time: Instant::now(),
        }
    }
}
