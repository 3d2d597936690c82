//! Integration tests for the account flow: register -> login -> JWT.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Helper: start the server on a random port and return the base URL.
async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = parley_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = parley_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = parley_server::state::AppState {
        db,
        jwt_secret,
        token_ttl_minutes: 60,
        connections: Arc::new(parley_server::ws::ConnectionRegistry::new()),
    };

    let app = parley_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr)
}

/// Register a user and return their id.
async fn register(base_url: &str, name: &str, email: &str, password: &str) -> String {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/register", base_url))
        .json(&serde_json::json!({
            "name": name,
            "email": email,
            "password": password,
        }))
        .send()
        .await
        .expect("register request failed");
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

/// Log in and return the bearer token.
async fn login(base_url: &str, email: &str, password: &str) -> String {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/token", base_url))
        .form(&[("username", email), ("password", password)])
        .send()
        .await
        .expect("login request failed");
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "bearer");
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn register_login_and_me() {
    let (base_url, _addr) = start_test_server().await;

    let user_id = register(&base_url, "Alice", "alice@example.com", "secret").await;
    let token = login(&base_url, "alice@example.com", "secret").await;

    let resp = reqwest::Client::new()
        .get(format!("{}/api/users/me", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let me: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(me["id"], user_id.as_str());
    assert_eq!(me["name"], "Alice");
    assert_eq!(me["email"], "alice@example.com");
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let (base_url, _addr) = start_test_server().await;

    register(&base_url, "Alice", "alice@example.com", "secret").await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/register", base_url))
        .json(&serde_json::json!({
            "name": "Alice Again",
            "email": "alice@example.com",
            "password": "other",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (base_url, _addr) = start_test_server().await;

    register(&base_url, "Alice", "alice@example.com", "secret").await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/token", base_url))
        .form(&[("username", "alice@example.com"), ("password", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/token", base_url))
        .form(&[("username", "nobody@example.com"), ("password", "secret")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn protected_routes_require_valid_token() {
    let (base_url, _addr) = start_test_server().await;

    let resp = reqwest::Client::new()
        .get(format!("{}/api/users/me", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = reqwest::Client::new()
        .get(format!("{}/api/users", base_url))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}
