//! JSON wire protocol: inbound event parsing and outbound event types.
//!
//! Inbound frames are JSON objects discriminated by a `type` field which
//! defaults to "message" when absent. Unknown types and events missing
//! required fields are dropped silently — the single event is discarded,
//! the session keeps running.

use axum::extract::ws::Message;
use serde::Serialize;

use crate::chat::router;
use crate::state::AppState;
use crate::ws::ConnectionSender;

/// Events pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// One-time snapshot sent to a connection right after registration.
    OnlineUsers { users: Vec<String> },
    /// Presence transition broadcast to everyone online.
    Status {
        user_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<String>,
    },
    /// Ephemeral typing indicator.
    Typing {
        sender_id: String,
        is_group: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
    },
    /// A persisted chat message.
    Message {
        sender_id: String,
        content: String,
        timestamp: String,
        is_group: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
    },
    /// Reported to the sending session when a message could not be stored.
    Error { message: String },
}

/// Parsed inbound client events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Typing {
        recipient_id: String,
        is_group: bool,
    },
    Message {
        recipient_id: String,
        content: String,
        is_group: bool,
    },
}

/// Parse an inbound text frame. Returns None for anything that should be
/// dropped: invalid JSON, unknown type, missing or empty required fields.
pub fn parse_client_event(text: &str) -> Option<ClientEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("message");
    let is_group = value
        .get("is_group")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let recipient_id = value
        .get("recipient_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())?
        .to_string();

    match kind {
        "typing" => Some(ClientEvent::Typing {
            recipient_id,
            is_group,
        }),
        "message" => {
            let content = value
                .get("content")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())?
                .to_string();
            Some(ClientEvent::Message {
                recipient_id,
                content,
                is_group,
            })
        }
        _ => None,
    }
}

/// Handle one inbound text frame from an authenticated session.
pub async fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    user_id: &str,
) {
    let Some(event) = parse_client_event(text) else {
        tracing::debug!(user_id = %user_id, "Dropping malformed or unknown client event");
        return;
    };

    match event {
        ClientEvent::Typing {
            recipient_id,
            is_group,
        } => {
            router::broadcast_typing(state, user_id, &recipient_id, is_group).await;
        }
        ClientEvent::Message {
            recipient_id,
            content,
            is_group,
        } => {
            // Persist-then-deliver: a failed insert means nothing is
            // fanned out and the sender gets an error frame.
            if let Err(err) =
                router::send_message(state, user_id, &recipient_id, &content, is_group).await
            {
                tracing::error!(user_id = %user_id, error = %err, "Failed to persist message");
                let _ = send_event(
                    tx,
                    &ServerEvent::Error {
                        message: "message could not be stored".to_string(),
                    },
                );
            }
        }
    }
}

/// Encode a server event as a WebSocket text frame.
pub fn encode_event(event: &ServerEvent) -> Option<Message> {
    serde_json::to_string(event)
        .ok()
        .map(|json| Message::Text(json.into()))
}

/// Queue an event on one connection. Best effort, never retried: the
/// returned flag says whether the frame was queued, and callers routing
/// to many connections are expected to discard it.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) -> bool {
    match encode_event(event) {
        Some(msg) => tx.send(msg).is_ok(),
        None => false,
    }
}
