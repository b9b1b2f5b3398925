//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::OnceLock;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::error::RealtimeError;
use crate::websocket::{OutboundEnvelope, OutboundMessage};

/// Lifecycle of the underlying transport as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Information captured from the upgrade request.
#[derive(Debug, Clone, Default)]
pub struct RemoteMetadata {
    pub remote_addr: Option<SocketAddr>,
    pub path: String,
    pub query: Option<String>,
    pub user_agent: Option<String>,
}

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub metadata: RemoteMetadata,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    /// Set once by the handshake, never cleared
    user_id: OnceLock<String>,
    state: AtomicU8,
    /// Last activity timestamp (Unix seconds) - using AtomicI64 for lock-free updates
    last_activity: AtomicI64,
    close_signal: Notify,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<OutboundMessage>, metadata: RemoteMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            metadata,
            connected_at: now,
            sender,
            user_id: OnceLock::new(),
            state: AtomicU8::new(TransportState::Open as u8),
            last_activity: AtomicI64::new(now.timestamp()),
            close_signal: Notify::new(),
        }
    }

    /// User bound by a successful handshake, if any
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.get().map(String::as_str)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.get().is_some()
    }

    /// Returns false if a user was already bound.
    pub(crate) fn bind_user(&self, user_id: &str) -> bool {
        self.user_id.set(user_id.to_string()).is_ok()
    }

    pub fn transport_state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.transport_state() == TransportState::Open && !self.sender.is_closed()
    }

    pub fn mark_closing(&self) {
        let _ = self.state.compare_exchange(
            TransportState::Open as u8,
            TransportState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn mark_closed(&self) {
        self.state.store(TransportState::Closed as u8, Ordering::Release);
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Queue a frame without waiting.
    ///
    /// Fails with `TransportUnavailable` when the connection is closing, the
    /// writer has gone away, or its buffer is full.
    pub fn try_send(&self, message: OutboundMessage) -> Result<(), RealtimeError> {
        if !self.is_open() {
            return Err(RealtimeError::TransportUnavailable(self.id));
        }

        self.sender
            .try_send(message)
            .map_err(|_| RealtimeError::TransportUnavailable(self.id))
    }

    /// Serialize and queue an envelope without waiting
    pub fn try_send_envelope(&self, envelope: OutboundEnvelope) -> Result<(), RealtimeError> {
        self.try_send(OutboundMessage::Raw(envelope))
    }

    /// Queue a close frame and stop accepting application frames.
    ///
    /// Falls back to an immediate teardown when the frame cannot be queued.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        let queued = self
            .try_send(OutboundMessage::Close {
                code,
                reason: reason.to_string(),
            })
            .is_ok();

        self.mark_closing();

        if !queued {
            self.close_signal.notify_one();
        }

        queued
    }

    /// Tear the connection down without a close handshake.
    pub fn abort(&self) {
        self.mark_closing();
        self.close_signal.notify_one();
    }

    /// Resolves once `abort` (or a failed `close`) has been requested
    pub async fn aborted(&self) {
        self.close_signal.notified().await
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id())
            .field("state", &self.transport_state())
            .field("remote_addr", &self.metadata.remote_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(buffer: usize) -> (ConnectionHandle, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ConnectionHandle::new(tx, RemoteMetadata::default()), rx)
    }

    #[test]
    fn test_user_binds_once() {
        let (handle, _rx) = handle(1);
        assert!(!handle.is_authenticated());

        assert!(handle.bind_user("u1"));
        assert!(!handle.bind_user("u2"));
        assert_eq!(handle.user_id(), Some("u1"));
    }

    #[test]
    fn test_state_transitions() {
        let (handle, _rx) = handle(1);
        assert_eq!(handle.transport_state(), TransportState::Open);

        handle.mark_closing();
        assert_eq!(handle.transport_state(), TransportState::Closing);

        handle.mark_closed();
        handle.mark_closing();
        assert_eq!(handle.transport_state(), TransportState::Closed);
    }

    #[test]
    fn test_try_send_respects_state_and_capacity() {
        let (handle, mut rx) = handle(1);

        assert!(handle.try_send(OutboundMessage::Ping).is_ok());
        assert_eq!(
            handle.try_send(OutboundMessage::Ping),
            Err(RealtimeError::TransportUnavailable(handle.id))
        );

        assert!(rx.try_recv().is_ok());
        handle.mark_closing();
        assert!(handle.try_send(OutboundMessage::Ping).is_err());
    }

    #[test]
    fn test_dropped_receiver_is_not_open() {
        let (handle, rx) = handle(1);
        drop(rx);
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_close_without_room_aborts() {
        let (handle, _rx) = handle(1);
        handle.try_send(OutboundMessage::Ping).unwrap();

        assert!(!handle.close(1001, "going away"));
        // permit stored by notify_one
        handle.aborted().await;
        assert_eq!(handle.transport_state(), TransportState::Closing);
    }
}
