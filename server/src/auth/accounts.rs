//! Account endpoints: registration, login, current user.

use axum::{extract::State, http::StatusCode, Form, Json};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::auth::{jwt, password};
use crate::db;
use crate::state::AppState;
use crate::users::{self, UserResponse};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// OAuth2-style password grant form: username carries the email.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// POST /api/auth/register — Create a new account.
/// Email must be unique; password is stored as an Argon2id hash.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), StatusCode> {
    let name = body.name.trim().to_string();
    let email = body.email.trim().to_lowercase();
    if name.is_empty() || body.password.is_empty() || !email.contains('@') {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let raw_password = body.password;

    let user = tokio::task::spawn_blocking(move || {
        // Argon2 hashing is CPU-bound; keep it off the async workers
        let password_hash =
            password::hash_password(&raw_password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                rusqlite::params![email],
                |row| row.get(0),
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if exists {
            return Err(StatusCode::BAD_REQUEST);
        }

        let id = uuid::Uuid::now_v7().to_string();
        let now = db::now_timestamp();
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'active', ?5)",
            rusqlite::params![id, name, email, password_hash, now],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok(UserResponse {
            id,
            name,
            email,
            last_seen: None,
            last_message: None,
            last_message_time: None,
            unread_count: 0,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/auth/token — Exchange email + password for a bearer JWT.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, StatusCode> {
    let db = state.db.clone();
    let email = form.username.trim().to_lowercase();

    let user_id = tokio::task::spawn_blocking(move || {
        let (id, password_hash) = {
            let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            conn.query_row(
                "SELECT id, password_hash FROM users WHERE email = ?1",
                rusqlite::params![email],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(|_| StatusCode::UNAUTHORIZED)?
        };

        if !password::verify_password(&form.password, &password_hash) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(id)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let access_token =
        jwt::issue_access_token(&state.jwt_secret, &user_id, state.token_ttl_minutes)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// GET /api/users/me — The authenticated user's own profile.
pub async fn me(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UserResponse>, StatusCode> {
    users::fetch_user(&state.db, &claims.sub)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
