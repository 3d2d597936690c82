use axum::{middleware, Json, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::accounts;
use crate::auth::middleware::JwtSecret;
use crate::chat::history;
use crate::groups;
use crate::state::AppState;
use crate::users;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on auth endpoints, keyed by peer IP.
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>.
    // Burst 30 so a client bootstrapping register+login stays clear.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(2)
            .burst_size(30)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // Auth routes with rate limiting
    let auth_routes = Router::new()
        .route(
            "/api/auth/register",
            axum::routing::post(accounts::register),
        )
        .route("/api/auth/token", axum::routing::post(accounts::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Authenticated routes (JWT required — Claims extractor validates token)
    let authenticated_routes = Router::new()
        .route("/api/users/me", axum::routing::get(accounts::me))
        .route("/api/users", axum::routing::get(users::list_users))
        .route("/api/users/{user_id}", axum::routing::get(users::get_user))
        .route("/api/groups", axum::routing::post(groups::create_group))
        .route("/api/groups", axum::routing::get(groups::list_groups))
        .route(
            "/api/groups/{group_id}/members",
            axum::routing::put(groups::add_members),
        )
        .route(
            "/api/groups/{group_id}",
            axum::routing::delete(groups::delete_group),
        )
        .route(
            "/api/messages/group/{group_id}",
            axum::routing::get(history::group_history),
        )
        .route(
            "/api/messages/{recipient_id}",
            axum::routing::get(history::direct_history),
        )
        .route(
            "/api/conversations/read/{conversation_id}",
            axum::routing::post(history::mark_conversation_read),
        );

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(authenticated_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}
