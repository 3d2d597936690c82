//! User directory endpoints: profile lookup and the conversation list
//! (every user annotated with last direct message and unread count).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::db::DbPool;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub last_seen: Option<String>,
    pub last_message: Option<String>,
    pub last_message_time: Option<String>,
    pub unread_count: i64,
}

/// Load a user's bare profile (no conversation annotations).
pub async fn fetch_user(db: &DbPool, user_id: &str) -> Option<UserResponse> {
    let db = db.clone();
    let user_id = user_id.to_string();
    tokio::task::spawn_blocking(move || {
        let conn = db.lock().ok()?;
        conn.query_row(
            "SELECT id, name, email, last_seen FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok(UserResponse {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    last_seen: row.get(3)?,
                    last_message: None,
                    last_message_time: None,
                    unread_count: 0,
                })
            },
        )
        .ok()
    })
    .await
    .ok()
    .flatten()
}

/// GET /api/users/{user_id} — Public profile lookup.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, StatusCode> {
    fetch_user(&state.db, &user_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/users — All users, each annotated with the most recent direct
/// message exchanged with the caller and the caller's unread count for
/// that conversation. Sorted by most recent activity.
pub async fn list_users(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<UserResponse>>, StatusCode> {
    let db = state.db.clone();
    let current_uid = claims.sub.clone();

    let mut users = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare("SELECT id, name, email, last_seen FROM users LIMIT 100")
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let rows: Vec<(String, String, String, Option<String>)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        let mut results = Vec::with_capacity(rows.len());
        for (id, name, email, last_seen) in rows {
            let (last_message, last_message_time) =
                last_direct_message(&conn, &current_uid, &id)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                    .map(|(c, t)| (Some(c), Some(t)))
                    .unwrap_or((None, None));

            let unread_count = unread_direct_count(&conn, &current_uid, &id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

            results.push(UserResponse {
                id,
                name,
                email,
                last_seen,
                last_message,
                last_message_time,
                unread_count,
            });
        }
        Ok::<_, StatusCode>(results)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    // Most recent conversation first; users with no history last
    users.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    Ok(Json(users))
}

/// Latest direct message between two users, either direction.
fn last_direct_message(
    conn: &Connection,
    a: &str,
    b: &str,
) -> rusqlite::Result<Option<(String, String)>> {
    conn.query_row(
        "SELECT content, timestamp FROM messages
         WHERE is_group = 0
           AND ((sender_id = ?1 AND recipient_id = ?2)
             OR (sender_id = ?2 AND recipient_id = ?1))
         ORDER BY timestamp DESC LIMIT 1",
        rusqlite::params![a, b],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

/// Messages from `other` to `me` newer than my read cursor for that
/// conversation. A missing cursor means the conversation was never read.
fn unread_direct_count(conn: &Connection, me: &str, other: &str) -> rusqlite::Result<i64> {
    let last_read: Option<String> = conn
        .query_row(
            "SELECT last_read_at FROM conversation_status
             WHERE user_id = ?1 AND conversation_id = ?2",
            rusqlite::params![me, other],
            |row| row.get(0),
        )
        .optional()?;
    let last_read = last_read.unwrap_or_default();

    conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE is_group = 0 AND sender_id = ?1 AND recipient_id = ?2
           AND timestamp > ?3",
        rusqlite::params![other, me, last_read],
        |row| row.get(0),
    )
}
