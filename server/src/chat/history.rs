//! REST endpoints for message history and read cursors.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::db;
use crate::state::AppState;

/// Page size for message history.
const HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub timestamp: String,
    pub is_group: bool,
}

/// GET /api/messages/{recipient_id} — Direct message history between the
/// caller and another user, both directions, oldest first.
pub async fn direct_history(
    State(state): State<AppState>,
    claims: Claims,
    Path(recipient_id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, StatusCode> {
    let db = state.db.clone();
    let current_uid = claims.sub.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, sender_id, recipient_id, content, timestamp, is_group
                 FROM messages
                 WHERE is_group = 0
                   AND ((sender_id = ?1 AND recipient_id = ?2)
                     OR (sender_id = ?2 AND recipient_id = ?1))
                 ORDER BY timestamp ASC LIMIT ?3",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let rows = stmt
            .query_map(
                rusqlite::params![current_uid, recipient_id, HISTORY_LIMIT],
                row_to_message,
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect::<Vec<_>>();
        Ok::<_, StatusCode>(rows)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(messages))
}

/// GET /api/messages/group/{group_id} — Group history, members only,
/// oldest first.
pub async fn group_history(
    State(state): State<AppState>,
    claims: Claims,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let is_member: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2)",
                rusqlite::params![group_id, user_id],
                |row| row.get(0),
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if !is_member {
            return Err(StatusCode::FORBIDDEN);
        }

        let mut stmt = conn
            .prepare(
                "SELECT id, sender_id, recipient_id, content, timestamp, is_group
                 FROM messages
                 WHERE is_group = 1 AND recipient_id = ?1
                 ORDER BY timestamp ASC LIMIT ?2",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let rows = stmt
            .query_map(rusqlite::params![group_id, HISTORY_LIMIT], row_to_message)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect::<Vec<_>>();
        Ok::<_, StatusCode>(rows)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(messages))
}

/// POST /api/conversations/read/{conversation_id} — Move the caller's
/// read cursor for a conversation (user or group id) to now.
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let now = db::now_timestamp();
        conn.execute(
            "INSERT INTO conversation_status (user_id, conversation_id, last_read_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, conversation_id) DO UPDATE SET last_read_at = excluded.last_read_at",
            rusqlite::params![user_id, conversation_id, now],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>(())
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageResponse> {
    Ok(MessageResponse {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        content: row.get(3)?,
        timestamp: row.get(4)?,
        is_group: row.get(5)?,
    })
}
