//! Presence notifier: online/offline transition broadcasts, the one-time
//! snapshot for new connections, and the last-seen write on the final
//! disconnect.

use chrono::Utc;

use crate::db;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_all;
use crate::ws::protocol::{send_event, ServerEvent};
use crate::ws::{ConnectionRegistry, ConnectionSender};

/// Presence transition carried by a status broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Broadcast a presence transition to every connection of every online
/// user, including the subject's own other devices. `online` carries no
/// timestamp; `offline` carries the last-seen instant.
pub fn broadcast_status(
    registry: &ConnectionRegistry,
    user_id: &str,
    status: PresenceStatus,
    last_seen: Option<String>,
) {
    broadcast_to_all(
        registry,
        &ServerEvent::Status {
            user_id: user_id.to_string(),
            status: status.as_str().to_string(),
            last_seen,
        },
    );
}

/// Direct reply to a newly accepted connection: snapshot of who is online.
/// Not a broadcast — only this session receives it.
pub fn send_online_snapshot(registry: &ConnectionRegistry, tx: &ConnectionSender) {
    let _ = send_event(
        tx,
        &ServerEvent::OnlineUsers {
            users: registry.online_users(),
        },
    );
}

/// Handle the user's last connection going away: record last-seen in the
/// user record, then broadcast the offline transition with that instant.
/// The write is best-effort — a failure is logged and the broadcast still
/// goes out.
pub async fn mark_offline(state: &AppState, user_id: &str) {
    let last_seen = db::format_timestamp(Utc::now());

    let db = state.db.clone();
    let uid = user_id.to_string();
    let ts = last_seen.clone();
    let write = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| format!("DB lock error: {}", e))?;
        conn.execute(
            "UPDATE users SET last_seen = ?1 WHERE id = ?2",
            rusqlite::params![ts, uid],
        )
        .map_err(|e| e.to_string())?;
        Ok::<_, String>(())
    })
    .await;

    match write {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to record last-seen")
        }
        Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Last-seen write task failed"),
    }

    broadcast_status(
        &state.connections,
        user_id,
        PresenceStatus::Offline,
        Some(last_seen),
    );
}
