mod handler;
mod handshake;
mod message;
mod notifier;

pub use handler::ws_handler;
pub use handshake::{Handshake, HandshakeState};
pub use message::{ChatMessagePayload, InboundEnvelope, OutboundEnvelope, OutboundMessage};
pub use notifier::ErrorNotifier;
