//! Group CRUD endpoints. Membership changes happen here, never in the
//! delivery path — the message router re-reads membership on every send.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMembersRequest {
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub id: String,
    pub name: String,
    pub members: Vec<String>,
    pub created_by: String,
    pub last_message: Option<String>,
    pub last_message_time: Option<String>,
    pub unread_count: i64,
}

/// POST /api/groups — Create a group. The creator is always a member.
pub async fn create_group(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), StatusCode> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let creator = claims.sub.clone();
    let mut members: Vec<String> = Vec::new();
    for member in body.members {
        if !members.contains(&member) {
            members.push(member);
        }
    }
    if !members.contains(&creator) {
        members.push(creator.clone());
    }

    let group = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let id = uuid::Uuid::now_v7().to_string();
        let now = db::now_timestamp();
        conn.execute(
            "INSERT INTO groups (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, name, creator, now],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        for member in &members {
            conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![id, member],
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        }

        Ok::<_, StatusCode>(GroupResponse {
            id,
            name,
            members,
            created_by: creator,
            last_message: None,
            last_message_time: None,
            unread_count: 0,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    tracing::info!(group_id = %group.id, "Group created");
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /api/groups — Groups the caller belongs to, annotated with last
/// message and unread count, most recent activity first.
pub async fn list_groups(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<GroupResponse>>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let mut groups = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare(
                "SELECT g.id, g.name, g.created_by FROM groups g
                 JOIN group_members m ON m.group_id = g.id
                 WHERE m.user_id = ?1",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let rows: Vec<(String, String, String)> = stmt
            .query_map(rusqlite::params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        let mut results = Vec::with_capacity(rows.len());
        for (id, name, created_by) in rows {
            let members =
                group_members(&conn, &id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

            let (last_message, last_message_time) = conn
                .query_row(
                    "SELECT content, timestamp FROM messages
                     WHERE is_group = 1 AND recipient_id = ?1
                     ORDER BY timestamp DESC LIMIT 1",
                    rusqlite::params![id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                .map(|(c, t)| (Some(c), Some(t)))
                .unwrap_or((None, None));

            let unread_count = unread_group_count(&conn, &user_id, &id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

            results.push(GroupResponse {
                id,
                name,
                members,
                created_by,
                last_message,
                last_message_time,
                unread_count,
            });
        }
        Ok::<_, StatusCode>(results)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    groups.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    Ok(Json(groups))
}

/// PUT /api/groups/{group_id}/members — Add members. Caller must already
/// be a member; users already in the group are skipped.
pub async fn add_members(
    State(state): State<AppState>,
    claims: Claims,
    Path(group_id): Path<String>,
    Json(body): Json<AddMembersRequest>,
) -> Result<Json<GroupResponse>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let group = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let (name, created_by): (String, String) = conn
            .query_row(
                "SELECT name, created_by FROM groups WHERE id = ?1",
                rusqlite::params![group_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|_| StatusCode::NOT_FOUND)?;

        let mut members =
            group_members(&conn, &group_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if !members.iter().any(|m| m == &user_id) {
            return Err(StatusCode::FORBIDDEN);
        }

        for member in &body.members {
            if members.contains(member) {
                continue;
            }
            conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![group_id, member],
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            members.push(member.clone());
        }

        Ok::<_, StatusCode>(GroupResponse {
            id: group_id,
            name,
            members,
            created_by,
            last_message: None,
            last_message_time: None,
            unread_count: 0,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(group))
}

/// DELETE /api/groups/{group_id} — Only the creator may delete a group.
pub async fn delete_group(
    State(state): State<AppState>,
    claims: Claims,
    Path(group_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let created_by: String = conn
            .query_row(
                "SELECT created_by FROM groups WHERE id = ?1",
                rusqlite::params![group_id],
                |row| row.get(0),
            )
            .map_err(|_| StatusCode::NOT_FOUND)?;

        if created_by != user_id {
            return Err(StatusCode::FORBIDDEN);
        }

        conn.execute("DELETE FROM groups WHERE id = ?1", rusqlite::params![group_id])
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>(())
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(StatusCode::NO_CONTENT)
}

/// Member ids for a group. An unknown group yields an empty list.
pub fn group_members(conn: &Connection, group_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM group_members WHERE group_id = ?1")?;
    let members = stmt
        .query_map(rusqlite::params![group_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(members)
}

/// Group messages newer than the caller's read cursor, excluding own sends.
fn unread_group_count(conn: &Connection, me: &str, group_id: &str) -> rusqlite::Result<i64> {
    let last_read: Option<String> = conn
        .query_row(
            "SELECT last_read_at FROM conversation_status
             WHERE user_id = ?1 AND conversation_id = ?2",
            rusqlite::params![me, group_id],
            |row| row.get(0),
        )
        .optional()?;
    let last_read = last_read.unwrap_or_default();

    conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE is_group = 1 AND recipient_id = ?1
           AND sender_id != ?2 AND timestamp > ?3",
        rusqlite::params![group_id, me, last_read],
        |row| row.get(0),
    )
}
