use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessageView;
use crate::error::RealtimeError;

/// Envelopes received from clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEnvelope {
    /// `{ "name": "auth", "data": { "accessToken": "..." } }`
    Auth { access_token: Option<String> },
    /// Any other well-formed envelope; accepted and ignored.
    Unknown { name: String },
}

/// Wire shape shared by every inbound envelope.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    name: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

impl InboundEnvelope {
    pub const AUTH: &'static str = "auth";

    /// Decode a text frame.
    ///
    /// Anything that is not a JSON object with a string `name` is a decode
    /// error. An `auth` envelope whose data lacks a string `accessToken`
    /// decodes with `access_token: None`; the handshake reports that.
    pub fn decode(text: &str) -> Result<Self, RealtimeError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
            tracing::debug!(error = %e, "Inbound frame is not JSON");
            RealtimeError::Decode
        })?;

        if !value.is_object() {
            tracing::debug!("Inbound frame is not a JSON object");
            return Err(RealtimeError::Decode);
        }

        let raw: RawEnvelope = serde_json::from_value(value).map_err(|e| {
            tracing::debug!(error = %e, "Inbound frame is not an envelope");
            RealtimeError::Decode
        })?;

        if raw.name == Self::AUTH {
            let access_token = serde_json::from_value::<AuthData>(raw.data)
                .ok()
                .and_then(|data| data.access_token);
            return Ok(Self::Auth { access_token });
        }

        Ok(Self::Unknown { name: raw.name })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Auth { .. } => Self::AUTH,
            Self::Unknown { name } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessagePayload {
    pub message: ChatMessageView,
}

/// Envelopes sent to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "name")]
pub enum OutboundEnvelope {
    #[serde(rename = "chat_message")]
    ChatMessage { data: ChatMessagePayload },
    #[serde(rename = "error")]
    Error { error: String },
}

impl OutboundEnvelope {
    pub fn chat_message(message: ChatMessageView) -> Self {
        Self::ChatMessage {
            data: ChatMessagePayload { message },
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "chat_message",
            Self::Error { .. } => "error",
        }
    }
}

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Serialized by the writer task
    Raw(OutboundEnvelope),
    /// Serialized once and shared between connections
    Preserialized(Arc<str>),
    /// Transport-level keepalive
    Ping,
    /// Close handshake; the writer stops after sending it
    Close { code: u16, reason: String },
}

impl OutboundMessage {
    pub fn preserialized(envelope: &OutboundEnvelope) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(envelope)?;
        Ok(Self::Preserialized(Arc::from(json)))
    }
}
