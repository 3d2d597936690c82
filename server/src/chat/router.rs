//! Message router: persists content events and fans them out to live
//! connections; fans out ephemeral typing events without persistence.
//!
//! Group membership is re-read from the database on every group send so
//! fan-out always reflects membership at send time. Per-connection
//! delivery is best effort and never retried; dead connections clean
//! themselves up through their own disconnect path.

use crate::db::{self, models::MessageRow, DbPool};
use crate::state::AppState;
use crate::ws::broadcast::send_to_user;
use crate::ws::protocol::ServerEvent;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Route a content message: persist it, then deliver to live connections.
/// An insert failure aborts the send — nothing is fanned out and the
/// error is returned for the session to surface to the sender.
pub async fn send_message(
    state: &AppState,
    sender_id: &str,
    recipient_id: &str,
    content: &str,
    is_group: bool,
) -> Result<(), BoxError> {
    let message = MessageRow {
        id: uuid::Uuid::now_v7().to_string(),
        sender_id: sender_id.to_string(),
        recipient_id: recipient_id.to_string(),
        content: content.to_string(),
        timestamp: db::now_timestamp(),
        is_group,
    };

    insert_message(&state.db, message.clone()).await?;

    let event = ServerEvent::Message {
        sender_id: message.sender_id.clone(),
        content: message.content,
        timestamp: message.timestamp,
        is_group,
        group_id: is_group.then(|| recipient_id.to_string()),
    };

    if is_group {
        // Membership resolved fresh; an unknown group fans out to nobody
        // (the record is still stored)
        for member in fetch_group_members(&state.db, recipient_id).await? {
            if member == sender_id {
                continue;
            }
            send_to_user(&state.connections, &member, &event);
        }
    } else {
        send_to_user(&state.connections, recipient_id, &event);
    }

    Ok(())
}

/// Route a typing indicator. Never persisted; delivery mirrors content
/// fan-out (recipient's connections, or group members minus sender).
pub async fn broadcast_typing(
    state: &AppState,
    sender_id: &str,
    recipient_id: &str,
    is_group: bool,
) {
    let event = ServerEvent::Typing {
        sender_id: sender_id.to_string(),
        is_group,
        group_id: is_group.then(|| recipient_id.to_string()),
    };

    if is_group {
        let members = match fetch_group_members(&state.db, recipient_id).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(group_id = %recipient_id, error = %e, "Group lookup failed");
                return;
            }
        };
        for member in members {
            if member == sender_id {
                continue;
            }
            send_to_user(&state.connections, &member, &event);
        }
    } else if recipient_id != sender_id {
        send_to_user(&state.connections, recipient_id, &event);
    }
}

/// Durably insert a message before any delivery happens.
async fn insert_message(db: &DbPool, message: MessageRow) -> Result<(), BoxError> {
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
        conn.execute(
            "INSERT INTO messages (id, sender_id, recipient_id, content, timestamp, is_group)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                message.id,
                message.sender_id,
                message.recipient_id,
                message.content,
                message.timestamp,
                message.is_group,
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok::<_, String>(())
    })
    .await??;
    Ok(())
}

/// Current members of a group. Unknown groups resolve to an empty list.
async fn fetch_group_members(db: &DbPool, group_id: &str) -> Result<Vec<String>, BoxError> {
    let db = db.clone();
    let group_id = group_id.to_string();
    let members = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
        crate::groups::group_members(&conn, &group_id).map_err(|e| e.to_string())
    })
    .await??;
    Ok(members)
}
