use super::*;
use axum::{
    body::{self, Body},
    http::Request,
};
use tower::ServiceExt;

fn test_app() -> Router {
    build_router(Arc::new(AppState {
        api: ApiContext {
            directory: UserDirectory::with_demo_users(),
        },
    }))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn json_request(method: &str, uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app();
    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn list_returns_count_and_seeded_users() {
    let app = test_app();
    let (status, json) = send(
        &app,
        Request::get("/api/users").body(Body::empty()).expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["count"], 3);
    assert_eq!(json["data"][0]["name"], "John Doe");
}

#[tokio::test]
async fn create_returns_201_with_echo() {
    let app = test_app();
    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/users",
            serde_json::json!({ "name": "Ann", "email": "a@x.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["message"], "User created successfully");
    assert_eq!(json["data"]["id"], 4);
    assert_eq!(json["data"]["name"], "Ann");
}

#[tokio::test]
async fn create_with_missing_email_returns_400_envelope() {
    let app = test_app();
    let (status, json) = send(
        &app,
        json_request("POST", "/api/users", serde_json::json!({ "name": "Ann" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Name and email are required");
}

#[tokio::test]
async fn put_patch_and_delete_round_through_the_directory() {
    let app = test_app();

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            "/api/users/2",
            serde_json::json!({ "name": "Janet", "email": "janet@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["name"], "Janet");

    let (status, json) = send(
        &app,
        json_request(
            "PATCH",
            "/api/users/2",
            serde_json::json!({ "email": "j@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["name"], "Janet");
    assert_eq!(json["data"]["email"], "j@example.com");

    let (status, json) = send(
        &app,
        Request::delete("/api/users/2")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "User with ID 2 deleted successfully");
    assert!(json.get("data").is_none());

    let (status, json) = send(
        &app,
        Request::get("/api/users/2").body(Body::empty()).expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "User with ID 2 not found");
}

#[tokio::test]
async fn patch_with_empty_object_returns_no_data_message() {
    let app = test_app();
    let (status, json) = send(
        &app,
        json_request("PATCH", "/api/users/1", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "No data provided");
}

#[tokio::test]
async fn unknown_routes_and_non_numeric_ids_return_endpoint_not_found() {
    let app = test_app();
    for uri in ["/api/nope", "/api/users/abc", "/api/users/-1", "/api/users/+2"] {
        let (status, json) = send(
            &app,
            Request::get(uri).body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "uri {uri}");
        assert_eq!(json["message"], "Endpoint not found");
    }
}

#[tokio::test]
async fn index_lists_all_six_endpoints() {
    let app = test_app();
    let (status, json) = send(&app, Request::get("/").body(Body::empty()).expect("request")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["endpoints"].as_object().map(|m| m.len()), Some(6));
}
