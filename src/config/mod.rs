mod settings;

pub use settings::{
    ChatConfig, DatabaseConfig, JwtConfig, OtelConfig, ServerConfig, Settings, WebSocketConfig,
};
