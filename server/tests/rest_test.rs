//! Integration tests for the REST collaborator layer: user directory,
//! group CRUD and membership checks.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

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

/// Register + login in one go; returns (user_id, bearer_token).
async fn register_and_login(base_url: &str, name: &str, email: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&serde_json::json!({
            "name": name,
            "email": email,
            "password": "secret",
        }))
        .send()
        .await
        .expect("register request failed");
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let user_id = body["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/api/auth/token", base_url))
        .form(&[("username", email), ("password", "secret")])
        .send()
        .await
        .expect("login request failed");
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    (user_id, body["access_token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn user_directory_lists_everyone() {
    let (base_url, _addr) = start_test_server().await;
    let client = reqwest::Client::new();

    let (alice_id, alice_token) = register_and_login(&base_url, "Alice", "a@example.com").await;
    let (bob_id, _bob_token) = register_and_login(&base_url, "Bob", "b@example.com").await;

    let resp = client
        .get(format!("{}/api/users", base_url))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let users: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(users.len(), 2);

    let ids: Vec<&str> = users.iter().map(|u| u["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&alice_id.as_str()));
    assert!(ids.contains(&bob_id.as_str()));
    // No conversations yet: no last message, nothing unread
    for user in &users {
        assert!(user["last_message"].is_null());
        assert_eq!(user["unread_count"], 0);
    }
}

#[tokio::test]
async fn group_crud_and_membership_rules() {
    let (base_url, _addr) = start_test_server().await;
    let client = reqwest::Client::new();

    let (alice_id, alice_token) = register_and_login(&base_url, "Alice", "a@example.com").await;
    let (bob_id, bob_token) = register_and_login(&base_url, "Bob", "b@example.com").await;
    let (carol_id, carol_token) = register_and_login(&base_url, "Carol", "c@example.com").await;

    // Alice creates a group with Bob; the creator is always a member
    let resp = client
        .post(format!("{}/api/groups", base_url))
        .bearer_auth(&alice_token)
        .json(&serde_json::json!({ "name": "team", "members": [&bob_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let group: serde_json::Value = resp.json().await.unwrap();
    let group_id = group["id"].as_str().unwrap().to_string();
    let members: Vec<&str> = group["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    assert!(members.contains(&alice_id.as_str()));
    assert!(members.contains(&bob_id.as_str()));

    // Both members see the group; Carol does not
    for token in [&alice_token, &bob_token] {
        let resp = client
            .get(format!("{}/api/groups", base_url))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let groups: Vec<serde_json::Value> = resp.json().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["id"], group_id.as_str());
    }
    let resp = client
        .get(format!("{}/api/groups", base_url))
        .bearer_auth(&carol_token)
        .send()
        .await
        .unwrap();
    let groups: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(groups.is_empty());

    // A non-member cannot add members
    let resp = client
        .put(format!("{}/api/groups/{}/members", base_url, group_id))
        .bearer_auth(&carol_token)
        .json(&serde_json::json!({ "members": [&carol_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // A member can; duplicates are skipped
    let resp = client
        .put(format!("{}/api/groups/{}/members", base_url, group_id))
        .bearer_auth(&bob_token)
        .json(&serde_json::json!({ "members": [&carol_id, &bob_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let group: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(group["members"].as_array().unwrap().len(), 3);

    // A member with no messages sees an empty history
    let resp = client
        .get(format!("{}/api/messages/group/{}", base_url, group_id))
        .bearer_auth(&carol_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let messages: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(messages.is_empty());

    // Only the creator can delete
    let resp = client
        .delete(format!("{}/api/groups/{}", base_url, group_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .delete(format!("{}/api/groups/{}", base_url, group_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/groups", base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let groups: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn group_history_rejects_non_members() {
    let (base_url, _addr) = start_test_server().await;
    let client = reqwest::Client::new();

    let (_alice_id, alice_token) = register_and_login(&base_url, "Alice", "a@example.com").await;
    let (_carol_id, carol_token) = register_and_login(&base_url, "Carol", "c@example.com").await;

    let resp = client
        .post(format!("{}/api/groups", base_url))
        .bearer_auth(&alice_token)
        .json(&serde_json::json!({ "name": "private", "members": [] }))
        .send()
        .await
        .unwrap();
    let group: serde_json::Value = resp.json().await.unwrap();
    let group_id = group["id"].as_str().unwrap();

    let resp = client
        .get(format!("{}/api/messages/group/{}", base_url, group_id))
        .bearer_auth(&carol_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}
