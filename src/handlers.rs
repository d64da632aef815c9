use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::metrics;

pub type WebSocketStreamType = WebSocketStream<TcpStream>;
type WsSender = SplitSink<WebSocketStreamType, WsMessage>;
type WsReceiver = SplitStream<WebSocketStreamType>;

/// An unauthenticated socket must present a credential within this bound.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn handle_websocket(ws_stream: WebSocketStreamType, addr: SocketAddr, ctx: AppContext) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // The first frame must carry a valid credential; nothing is registered
    // until it verifies, so an unauthenticated socket is never addressable.
    let user_id = match authenticate(&mut ws_sender, &mut ws_receiver, &ctx, addr).await {
        Some(id) => id,
        None => return,
    };

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    ctx.registry.register(user_id, connection_id, tx).await;
    metrics::CONNECTIONS_TOTAL.inc();
    tracing::info!(user_id = %user_id, %addr, "client connected");

    send_json(
        &mut ws_sender,
        &ServerMessage::ConnectSuccess {
            user_id: user_id.to_string(),
        },
    )
    .await;

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Send { receiver_id, text }) => {
                                handle_send(&mut ws_sender, &ctx, user_id, &receiver_id, &text).await;
                            }
                            Ok(ClientMessage::Connect { .. }) => {
                                send_error(&mut ws_sender, "already authenticated").await;
                            }
                            Err(e) => {
                                tracing::debug!(%addr, error = %e, "unparseable client frame");
                                send_error(&mut ws_sender, "invalid message format").await;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = ws_sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%addr, error = %e, "websocket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            pushed = rx.recv() => {
                match pushed {
                    Some(server_msg) => match serde_json::to_string(&server_msg) {
                        Ok(json) => {
                            if ws_sender.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "failed to serialize push"),
                    },
                    None => break,
                }
            }
        }
    }

    // Unregister before the socket is dropped: once the handler returns,
    // lookups are guaranteed to exclude this connection.
    ctx.registry.unregister(user_id, connection_id).await;
    tracing::info!(user_id = %user_id, %addr, "client disconnected");
}

/// Drive the credential handshake. Returns the verified identity, or `None`
/// after rejecting the attempt — in which case the registry was never touched.
async fn authenticate(
    ws_sender: &mut WsSender,
    ws_receiver: &mut WsReceiver,
    ctx: &AppContext,
    addr: SocketAddr,
) -> Option<Uuid> {
    let deadline = tokio::time::Instant::now() + HANDSHAKE_TIMEOUT;
    loop {
        let frame = match tokio::time::timeout_at(deadline, ws_receiver.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                tracing::debug!(%addr, error = %e, "websocket error during handshake");
                return None;
            }
            Ok(None) => return None,
            Err(_) => {
                send_error(ws_sender, "authentication timed out").await;
                return None;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                return match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Connect { session_token }) => {
                        match ctx.auth_manager.verify_identity(&session_token) {
                            Ok(identity) => Some(identity),
                            Err(e) => {
                                tracing::warn!(%addr, error = %e, "handshake rejected");
                                send_error(ws_sender, "invalid credentials").await;
                                None
                            }
                        }
                    }
                    _ => {
                        send_error(ws_sender, "expected connect frame").await;
                        None
                    }
                };
            }
            WsMessage::Ping(data) => {
                let _ = ws_sender.send(WsMessage::Pong(data)).await;
            }
            WsMessage::Close(_) => return None,
            _ => {
                send_error(ws_sender, "expected connect frame").await;
                return None;
            }
        }
    }
}

async fn handle_send(
    ws_sender: &mut WsSender,
    ctx: &AppContext,
    sender_id: Uuid,
    receiver_id: &str,
    text: &str,
) {
    match ctx.delivery.send(sender_id, receiver_id, text).await {
        Ok(message) => {
            // The sender fan-out already delivered the confirmed record to
            // this connection; nothing more to send here.
            tracing::debug!(message_id = message.id, "message persisted and fanned out");
        }
        Err(AppError::InvalidRequest(reason)) => {
            send_error(ws_sender, &reason).await;
        }
        Err(e) => {
            // Reported failed so the client rolls back its optimistic entry.
            send_json(
                ws_sender,
                &ServerMessage::DeliveryFailed {
                    reason: e.user_message(),
                },
            )
            .await;
        }
    }
}

async fn send_json(ws_sender: &mut WsSender, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let _ = ws_sender.send(WsMessage::Text(json)).await;
    }
}

async fn send_error(ws_sender: &mut WsSender, reason: &str) {
    send_json(
        ws_sender,
        &ServerMessage::Error {
            reason: reason.to_string(),
        },
    )
    .await;
}
