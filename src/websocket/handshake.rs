//! In-band authentication of an already-open connection.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::TokenVerifier;
use crate::connection_manager::ConnectionRegistry;
use crate::error::RealtimeError;
use crate::metrics::HandshakeMetrics;

use super::{ErrorNotifier, InboundEnvelope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Unauthenticated,
    /// Terminal for the lifetime of the connection
    Authenticated { user_id: String },
}

/// Drives one connection from anonymous to user-bound.
///
/// Owned by the connection's reader task, so inbound frames are handled
/// strictly one after another.
pub struct Handshake {
    connection_id: Uuid,
    state: HandshakeState,
    registry: Arc<ConnectionRegistry>,
    verifier: Arc<dyn TokenVerifier>,
    notifier: ErrorNotifier,
}

impl Handshake {
    pub fn new(
        connection_id: Uuid,
        registry: Arc<ConnectionRegistry>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let notifier = ErrorNotifier::new(registry.clone());
        Self {
            connection_id,
            state: HandshakeState::Unauthenticated,
            registry,
            verifier,
            notifier,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, HandshakeState::Authenticated { .. })
    }

    /// Handle one inbound text frame
    pub async fn on_text(&mut self, text: &str) {
        match InboundEnvelope::decode(text) {
            Ok(envelope) => self.on_envelope(envelope).await,
            Err(e) => {
                HandshakeMetrics::record_decode_error();
                self.notifier.notify(self.connection_id, &e);
            }
        }
    }

    /// Handle a frame that is not a text frame
    pub fn on_undecodable(&self) {
        HandshakeMetrics::record_decode_error();
        self.notifier.notify(self.connection_id, &RealtimeError::Decode);
    }

    #[tracing::instrument(
        name = "ws.envelope",
        skip(self, envelope),
        fields(connection_id = %self.connection_id, name = %envelope.name())
    )]
    pub async fn on_envelope(&mut self, envelope: InboundEnvelope) {
        match envelope {
            InboundEnvelope::Auth { access_token } => self.authenticate(access_token).await,
            InboundEnvelope::Unknown { name } => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    name = %name,
                    "Ignoring envelope with unrecognized name"
                );
            }
        }
    }

    async fn authenticate(&mut self, access_token: Option<String>) {
        if let HandshakeState::Authenticated { user_id } = &self.state {
            tracing::debug!(
                connection_id = %self.connection_id,
                user_id = %user_id,
                "Ignoring auth on an authenticated connection"
            );
            return;
        }

        let Some(token) = access_token else {
            HandshakeMetrics::record_rejected();
            self.notifier.notify(self.connection_id, &RealtimeError::InvalidToken);
            return;
        };

        let user_id = match self.verifier.verify_token(&token).await {
            Ok(user_id) => user_id,
            Err(e) => {
                tracing::debug!(connection_id = %self.connection_id, error = %e, "Token rejected");
                HandshakeMetrics::record_rejected();
                self.notifier.notify(self.connection_id, &RealtimeError::InvalidToken);
                return;
            }
        };

        match self.registry.bind(self.connection_id, &user_id) {
            Ok(()) => {
                HandshakeMetrics::record_accepted();
                self.state = HandshakeState::Authenticated { user_id };
            }
            Err(e) => {
                // closed mid-handshake; nobody left to tell
                tracing::info!(
                    connection_id = %self.connection_id,
                    user_id = %user_id,
                    error = %e,
                    "Handshake finished after connection went away"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenService;
    use crate::config::JwtConfig;
    use crate::connection_manager::{ConnectionHandle, RemoteMetadata};
    use crate::websocket::{OutboundEnvelope, OutboundMessage};
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        tokens: Arc<TokenService>,
        handle: Arc<ConnectionHandle>,
        rx: mpsc::Receiver<OutboundMessage>,
        handshake: Handshake,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let tokens = Arc::new(TokenService::new(&JwtConfig {
            secret: "handshake-test-secret".to_string(),
            issuer: None,
            audience: None,
            expiration_days: 30,
        }));
        let (tx, rx) = mpsc::channel(8);
        let handle = registry.register(tx, RemoteMetadata::default());
        let handshake = Handshake::new(handle.id, registry.clone(), tokens.clone());

        Fixture {
            registry,
            tokens,
            handle,
            rx,
            handshake,
        }
    }

    fn auth_frame(token: &str) -> String {
        serde_json::json!({ "name": "auth", "data": { "accessToken": token } }).to_string()
    }

    fn drain_errors(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<String> {
        let mut errors = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            match frame {
                OutboundMessage::Raw(OutboundEnvelope::Error { error }) => errors.push(error),
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        errors
    }

    #[tokio::test]
    async fn test_valid_token_binds_user() {
        let mut f = fixture();
        let token = f.tokens.issue_token("u1").unwrap();

        assert_eq!(f.registry.find_by_user("u1").count(), 0);

        f.handshake.on_text(&auth_frame(&token)).await;

        assert_eq!(
            f.handshake.state(),
            &HandshakeState::Authenticated {
                user_id: "u1".to_string()
            }
        );
        let found: Vec<_> = f.registry.find_by_user("u1").map(|h| h.id).collect();
        assert_eq!(found, vec![f.handle.id]);
        assert!(drain_errors(&mut f.rx).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_token_sends_one_error() {
        let mut f = fixture();

        f.handshake.on_text(&auth_frame("garbage")).await;

        assert_eq!(f.handshake.state(), &HandshakeState::Unauthenticated);
        assert_eq!(
            drain_errors(&mut f.rx),
            vec!["Failed to decode access token.".to_string()]
        );
        assert!(!f.handle.is_authenticated());
    }

    #[tokio::test]
    async fn test_expired_token_rejected_then_retry_succeeds() {
        let mut f = fixture();

        let now = chrono::Utc::now().timestamp();
        let expired = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &crate::auth::Claims {
                sub: "u1".to_string(),
                exp: now - 3600,
                iat: now - 7200,
                iss: None,
                aud: None,
            },
            &jsonwebtoken::EncodingKey::from_secret(b"handshake-test-secret"),
        )
        .unwrap();

        f.handshake.on_text(&auth_frame(&expired)).await;
        assert!(!f.handshake.is_authenticated());
        assert_eq!(drain_errors(&mut f.rx).len(), 1);

        let valid = f.tokens.issue_token("u1").unwrap();
        f.handshake.on_text(&auth_frame(&valid)).await;
        assert!(f.handshake.is_authenticated());
        assert!(drain_errors(&mut f.rx).is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_is_invalid() {
        let mut f = fixture();

        f.handshake.on_text(r#"{"name":"auth","data":{}}"#).await;

        assert!(!f.handshake.is_authenticated());
        assert_eq!(
            drain_errors(&mut f.rx),
            vec!["Failed to decode access token.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_reports_decode_error() {
        let mut f = fixture();

        f.handshake.on_text("{not json").await;
        f.handshake.on_undecodable();

        assert_eq!(
            drain_errors(&mut f.rx),
            vec![
                "Failed to decode message.".to_string(),
                "Failed to decode message.".to_string()
            ]
        );
        assert!(f.registry.get(f.handle.id).is_some());
    }

    #[tokio::test]
    async fn test_unknown_envelope_has_no_effect() {
        let mut f = fixture();

        f.handshake.on_text(r#"{"name":"chat_message","data":{"message":"hi"}}"#).await;

        assert_eq!(f.handshake.state(), &HandshakeState::Unauthenticated);
        assert!(drain_errors(&mut f.rx).is_empty());
    }

    #[tokio::test]
    async fn test_second_auth_does_not_rebind() {
        let mut f = fixture();

        let first = f.tokens.issue_token("u1").unwrap();
        let second = f.tokens.issue_token("u2").unwrap();
        f.handshake.on_text(&auth_frame(&first)).await;
        f.handshake.on_text(&auth_frame(&second)).await;
        f.handshake.on_text(&auth_frame("garbage")).await;

        assert_eq!(f.handle.user_id(), Some("u1"));
        assert_eq!(f.registry.find_by_user("u2").count(), 0);
        assert!(drain_errors(&mut f.rx).is_empty());
    }

    #[tokio::test]
    async fn test_connection_closed_mid_handshake() {
        let mut f = fixture();
        let token = f.tokens.issue_token("u1").unwrap();

        f.registry.unregister(f.handle.id);
        f.handshake.on_text(&auth_frame(&token)).await;

        assert!(!f.handshake.is_authenticated());
        assert_eq!(f.registry.find_by_user("u1").count(), 0);
        assert!(drain_errors(&mut f.rx).is_empty());
    }
}
