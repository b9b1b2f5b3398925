use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, Uri},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::auth::TokenVerifier;
use crate::connection_manager::{ConnectionHandle, RemoteMetadata};
use crate::metrics::{
    ConnectionMetrics, WsMessageMetrics, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
    WS_CONNECTION_DURATION,
};
use crate::server::AppState;

use super::handshake::Handshake;
use super::message::OutboundMessage;

/// WebSocket upgrade handler.
///
/// Upgrades unconditionally; identity is established in-band by the `auth`
/// envelope once the socket is open.
#[tracing::instrument(name = "ws.upgrade", skip(ws, state, headers, uri), fields(remote_addr = %addr))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let metadata = RemoteMetadata {
        remote_addr: Some(addr),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, metadata))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip_all, fields(otel.kind = "server"))]
async fn handle_socket(socket: WebSocket, state: AppState, metadata: RemoteMetadata) {
    let connection_start = std::time::Instant::now();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_buffer_size);
    let handle = state.registry.register(tx, metadata);
    let connection_id = handle.id;

    WS_CONNECTIONS_OPENED.inc();
    ConnectionMetrics::update(&state.registry.stats());

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending queued frames to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match msg {
                OutboundMessage::Raw(envelope) => match serde_json::to_string(&envelope) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize envelope");
                        continue;
                    }
                },
                OutboundMessage::Preserialized(text) => Message::Text(text.to_string().into()),
                OutboundMessage::Ping => Message::Ping(Default::default()),
                OutboundMessage::Close { code, reason } => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };

            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Task for receiving frames from the socket
    let verifier: Arc<dyn TokenVerifier> = state.token_service.clone();
    let mut handshake = Handshake::new(connection_id, state.registry.clone(), verifier);
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &mut handshake, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    let send_abort = send_task.abort_handle();
    let recv_abort = recv_task.abort_handle();

    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
        _ = handle.aborted() => {
            tracing::debug!(connection_id = %connection_id, "Connection aborted");
        }
    }

    send_abort.abort();
    recv_abort.abort();

    let user_id = handle.user_id().map(str::to_string);
    state.registry.unregister(connection_id);

    WS_CONNECTIONS_CLOSED.inc();
    ConnectionMetrics::update(&state.registry.stats());
    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    tracing::info!(
        connection_id = %connection_id,
        user_id = ?user_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed
async fn process_message(
    msg: Message,
    handshake: &mut Handshake,
    handle: &Arc<ConnectionHandle>,
) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();
            WsMessageMetrics::record_text();
            handshake.on_text(text.as_str()).await;
            true
        }
        Message::Binary(_) => {
            handle.update_activity();
            WsMessageMetrics::record_binary();
            handshake.on_undecodable();
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            handle.mark_closing();
            false
        }
    }
}
