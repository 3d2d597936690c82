//! Database row types for all tables.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

/// User record in the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub status: String,
    pub last_seen: Option<String>,
    pub created_at: String,
}

/// Durable message record. `recipient_id` is a user id for direct
/// messages and a group id when `is_group` is set.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub timestamp: String,
    pub is_group: bool,
}

/// Group record; members live in the group_members table.
#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: String,
}
