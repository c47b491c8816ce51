use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use server_api::{
    create_user, delete_user, get_user, list_users, patch_user, replace_user, ApiContext,
    UserDirectory,
};
use shared::{
    domain::{User, UserId},
    error::{ApiError, ErrorCode},
    protocol::Envelope,
};
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

type Rejection = (StatusCode, Json<Envelope<()>>);
type EnvelopeResult<T> = Result<(StatusCode, Json<Envelope<T>>), Rejection>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let directory = if settings.seed_demo_users {
        UserDirectory::with_demo_users()
    } else {
        UserDirectory::new()
    };

    let state = AppState {
        api: ApiContext { directory },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, seed_demo_users = settings.seed_demo_users, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/users", get(http_list_users).post(http_create_user))
        .route(
            "/api/users/:user_id",
            get(http_get_user)
                .put(http_replace_user)
                .patch(http_patch_user)
                .delete(http_delete_user),
        )
        .fallback(endpoint_not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn index() -> Json<serde_json::Value> {
    let endpoints = [
        ("GET /api/users", "Get all users"),
        ("GET /api/users/<id>", "Get user by ID"),
        ("POST /api/users", "Create new user"),
        ("PUT /api/users/<id>", "Update entire user"),
        ("PATCH /api/users/<id>", "Partially update user"),
        ("DELETE /api/users/<id>", "Delete user"),
    ];
    let endpoints: serde_json::Map<String, serde_json::Value> = endpoints
        .into_iter()
        .map(|(route, summary)| (route.to_string(), summary.into()))
        .collect();
    Json(serde_json::json!({
        "message": "Welcome to the user directory API",
        "endpoints": endpoints,
    }))
}

async fn endpoint_not_found() -> Rejection {
    (
        StatusCode::NOT_FOUND,
        Json(Envelope::failure("Endpoint not found")),
    )
}

async fn http_list_users(State(state): State<Arc<AppState>>) -> EnvelopeResult<Vec<User>> {
    let users = list_users(&state.api).await.map_err(reject)?;
    let count = users.len();
    Ok((StatusCode::OK, Json(Envelope::listing(users, count))))
}

async fn http_get_user(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> EnvelopeResult<User> {
    let user_id = parse_user_id(&raw_id)?;
    let user = get_user(&state.api, user_id).await.map_err(reject)?;
    Ok((StatusCode::OK, Json(Envelope::ok(user))))
}

async fn http_create_user(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> EnvelopeResult<User> {
    let user = create_user(&state.api, &body).await.map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(user).with_message("User created successfully")),
    ))
}

async fn http_replace_user(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> EnvelopeResult<User> {
    let user_id = parse_user_id(&raw_id)?;
    let user = replace_user(&state.api, user_id, &body)
        .await
        .map_err(reject)?;
    Ok((
        StatusCode::OK,
        Json(Envelope::ok(user).with_message("User updated successfully")),
    ))
}

async fn http_patch_user(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> EnvelopeResult<User> {
    let user_id = parse_user_id(&raw_id)?;
    let user = patch_user(&state.api, user_id, &body)
        .await
        .map_err(reject)?;
    Ok((
        StatusCode::OK,
        Json(Envelope::ok(user).with_message("User updated successfully")),
    ))
}

async fn http_delete_user(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> EnvelopeResult<()> {
    let user_id = parse_user_id(&raw_id)?;
    let message = delete_user(&state.api, user_id).await.map_err(reject)?;
    Ok((StatusCode::OK, Json(Envelope::acknowledged(message))))
}

/// Only plain decimal digits match the resource route. Anything else,
/// including a sign, reports the same 404 as an unknown endpoint.
fn parse_user_id(raw: &str) -> Result<UserId, Rejection> {
    raw.bytes()
        .all(|b| b.is_ascii_digit())
        .then(|| raw.parse::<i64>().ok())
        .flatten()
        .map(UserId)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(Envelope::failure("Endpoint not found")),
            )
        })
}

fn reject(err: ApiError) -> Rejection {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
    };
    debug!(%status, message = %err.message, "request rejected");
    (status, Json(Envelope::failure(err.message)))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
