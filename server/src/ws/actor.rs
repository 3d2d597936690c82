use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::presence::{self, PresenceStatus};
use crate::state::AppState;
use crate::ws::protocol;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-frame write deadline: a hung peer must not wedge the writer task.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming messages, dispatches to protocol handlers
///
/// The mpsc channel allows any part of the system to send messages to this client
/// by cloning the sender.
///
/// Every exit path from the reader loop runs the same cleanup: one
/// unregister, and — only if that removed the user's last connection —
/// one last-seen write plus one offline broadcast.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Register this connection in the connection registry
    let first_connection = state.connections.register(&user_id, tx.clone());

    // Direct reply to this session only: who is online right now
    presence::send_online_snapshot(&state.connections, &tx);

    // Broadcast the online transition only on the user's first connection
    if first_connection {
        presence::broadcast_status(&state.connections, &user_id, PresenceStatus::Online, None);
    }

    tracing::info!(user_id = %user_id, "WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            // Send ping
            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            // Wait for pong within timeout
            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    // Pong timeout or channel closed — close connection
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages in arrival order.
    // Also watches the writer task: if it exits on a send failure or a
    // missed write deadline, the connection is torn down right away
    // instead of waiting for the transport to die.
    loop {
        tokio::select! {
            _ = &mut writer_handle => {
                tracing::warn!(user_id = %user_id, "Writer task exited, closing connection");
                break;
            }
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        protocol::handle_text_message(text.as_str(), &tx, &state, &user_id).await;
                    }
                    Message::Binary(_) => {
                        tracing::debug!(
                            user_id = %user_id,
                            "Received binary message (expected JSON text), dropping"
                        );
                    }
                    Message::Pong(_) => {
                        // Pong received — notify the ping task
                        let _ = pong_tx.send(());
                    }
                    Message::Ping(data) => {
                        // Respond to client pings with pong
                        let _ = tx.send(Message::Pong(data));
                    }
                    Message::Close(frame) => {
                        tracing::info!(
                            user_id = %user_id,
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    // Stream ended — client disconnected
                    tracing::info!(user_id = %user_id, "WebSocket stream ended");
                    break;
                }
            },
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    // Remove this connection from the registry; unregister reports the
    // offline transition at most once even under concurrent disconnects
    let went_offline = state.connections.unregister(&user_id, &tx);

    if went_offline {
        presence::mark_offline(&state, &user_id).await;
    }

    tracing::info!(user_id = %user_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to
/// the WebSocket sink, with a per-frame deadline.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        match timeout(WRITE_TIMEOUT, ws_sender.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                // WebSocket send failed — connection is broken
                break;
            }
            Err(_) => {
                tracing::warn!("Write deadline exceeded, closing connection");
                break;
            }
        }
    }
}
