use super::*;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    received: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl ServerState {
    async fn record(&self, label: &str, body: &[u8]) {
        let value = serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
        self.received.lock().await.push((label.to_string(), value));
    }
}

fn ann() -> User {
    User {
        id: UserId(1),
        name: "Ann".into(),
        email: "a@x.com".into(),
    }
}

async fn handle_list() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "count": 1,
        "data": [{ "id": 1, "name": "Ann", "email": "a@x.com" }],
    }))
}

async fn handle_create(
    State(state): State<ServerState>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    state.record("create", &body).await;
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "User created successfully",
            "data": { "id": 4, "name": "Dan", "email": "d@x.com" },
        })),
    )
}

async fn handle_get(Path(user_id): Path<i64>) -> (StatusCode, Json<serde_json::Value>) {
    if user_id == 1 {
        return (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "data": ann() })),
        );
    }
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "message": format!("User with ID {user_id} not found"),
        })),
    )
}

async fn handle_put(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    body: Bytes,
) -> Json<serde_json::Value> {
    state.record("put", &body).await;
    Json(serde_json::json!({
        "success": true,
        "data": { "id": user_id, "name": "ANN", "email": "a@x.com" },
    }))
}

async fn handle_patch(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    body: Bytes,
) -> Json<serde_json::Value> {
    state.record("patch", &body).await;
    Json(serde_json::json!({
        "success": true,
        "data": { "id": user_id, "name": "Annie", "email": "a@x.com" },
    }))
}

async fn handle_delete(Path(user_id): Path<i64>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": format!("User with ID {user_id} deleted successfully"),
    }))
}

async fn spawn_user_server() -> std::result::Result<(String, ServerState), std::io::Error> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/users", get(handle_list).post(handle_create))
        .route(
            "/api/users/:user_id",
            get(handle_get)
                .put(handle_put)
                .patch(handle_patch)
                .delete(handle_delete),
        )
        .route(
            "/broken/api/users",
            get(|| async { (StatusCode::OK, "not json") }),
        )
        .route(
            "/bare/api/users/:user_id",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        )
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

#[test]
fn server_url_is_validated_and_trailing_slash_trimmed() {
    let client = HttpResourceClient::new("http://localhost:5000/").expect("client");
    assert_eq!(client.server_url(), "http://localhost:5000");

    assert!(matches!(
        HttpResourceClient::new("ftp://localhost"),
        Err(ClientConfigError::InvalidServerUrl { .. })
    ));
    assert!(HttpResourceClient::new("not a url").is_err());
}

#[tokio::test]
async fn list_parses_users_and_count() {
    let (server_url, _state) = spawn_user_server().await.expect("spawn server");
    let client = HttpResourceClient::new(&server_url).expect("client");

    let listing = client.list_users().await.expect("list");
    assert_eq!(listing.count, 1);
    assert_eq!(listing.users, vec![ann()]);
}

#[tokio::test]
async fn create_posts_draft_and_returns_echo() {
    let (server_url, state) = spawn_user_server().await.expect("spawn server");
    let client = HttpResourceClient::new(&server_url).expect("client");

    let created = client
        .create_user(&UserDraft::new("Dan", "d@x.com"))
        .await
        .expect("create");
    assert_eq!(created.id, UserId(4));

    let received = state.received.lock().await;
    assert_eq!(
        received[0],
        (
            "create".to_string(),
            serde_json::json!({ "name": "Dan", "email": "d@x.com" })
        )
    );
}

#[tokio::test]
async fn replace_and_patch_hit_the_id_route() {
    let (server_url, state) = spawn_user_server().await.expect("spawn server");
    let client = HttpResourceClient::new(&server_url).expect("client");

    let replaced = client
        .replace_user(UserId(1), &UserDraft::new("ann", "a@x.com"))
        .await
        .expect("replace");
    assert_eq!(replaced.name, "ANN");

    let patched = client
        .patch_user(UserId(1), UserField::Name, "Annie")
        .await
        .expect("patch");
    assert_eq!(patched.name, "Annie");

    let received = state.received.lock().await;
    assert_eq!(received[1].0, "patch");
    assert_eq!(received[1].1, serde_json::json!({ "name": "Annie" }));
}

#[tokio::test]
async fn delete_succeeds_without_data_payload() {
    let (server_url, _state) = spawn_user_server().await.expect("spawn server");
    let client = HttpResourceClient::new(&server_url).expect("client");
    client.delete_user(UserId(3)).await.expect("delete");
}

#[tokio::test]
async fn not_found_carries_server_message() {
    let (server_url, _state) = spawn_user_server().await.expect("spawn server");
    let client = HttpResourceClient::new(&server_url).expect("client");

    let err = client.get_user(UserId(9)).await.expect_err("missing");
    assert_eq!(
        err,
        SyncError::Server {
            status: 404,
            message: Some("User with ID 9 not found".into()),
        }
    );
    assert_eq!(err.to_string(), "User with ID 9 not found");
}

#[tokio::test]
async fn failure_without_envelope_falls_back_to_status_text() {
    let (server_url, _state) = spawn_user_server().await.expect("spawn server");
    let client = HttpResourceClient::new(&format!("{server_url}/bare")).expect("client");

    let err = client.get_user(UserId(1)).await.expect_err("unavailable");
    assert_eq!(err.to_string(), "Request failed with status code 503");
}

#[tokio::test]
async fn undecodable_success_body_is_a_transport_error() {
    let (server_url, _state) = spawn_user_server().await.expect("spawn server");
    let client = HttpResourceClient::new(&format!("{server_url}/broken")).expect("client");

    let err = client.list_users().await.expect_err("malformed");
    assert!(matches!(err, SyncError::Transport(ref text) if text.contains("malformed")));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = HttpResourceClient::with_timeout(
        &format!("http://{addr}"),
        Duration::from_secs(2),
    )
    .expect("client");
    let err = client.list_users().await.expect_err("refused");
    assert!(matches!(err, SyncError::Transport(_)));
}

#[tokio::test]
async fn controller_drives_http_client_end_to_end() {
    let (server_url, _state) = spawn_user_server().await.expect("spawn server");
    let client = Arc::new(HttpResourceClient::new(&server_url).expect("client"));
    let controller = ResourceController::initialize(client).await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.users, vec![ann()]);
    assert_eq!(snapshot.status.last_message, "✅ Successfully fetched 1 users");

    controller
        .partial_modify(UserId(1), UserField::Name, "Annie")
        .await;
    assert_eq!(controller.users().await[0].name, "Annie");
}
