use serde_json::{Map, Value};
use shared::{
    domain::{User, UserDraft, UserId},
    error::ApiError,
    protocol::UserPatch,
};
use tracing::info;

mod directory;

pub use directory::UserDirectory;

const MISSING_FIELDS_MESSAGE: &str = "Name and email are required";
const EMPTY_PATCH_MESSAGE: &str = "No data provided";

#[derive(Clone)]
pub struct ApiContext {
    pub directory: UserDirectory,
}

pub async fn list_users(ctx: &ApiContext) -> Result<Vec<User>, ApiError> {
    Ok(ctx.directory.list().await)
}

pub async fn get_user(ctx: &ApiContext, user_id: UserId) -> Result<User, ApiError> {
    ctx.directory
        .get(user_id)
        .await
        .ok_or_else(|| not_found(user_id))
}

pub async fn create_user(ctx: &ApiContext, body: &[u8]) -> Result<User, ApiError> {
    let draft = parse_draft(body)?;
    let user = ctx.directory.insert(draft).await;
    info!(user_id = user.id.0, "user created");
    Ok(user)
}

/// Replaces both fields of an existing user. Existence is checked before the
/// body is validated, so an unknown id reports 404 even for a bad body.
pub async fn replace_user(
    ctx: &ApiContext,
    user_id: UserId,
    body: &[u8],
) -> Result<User, ApiError> {
    if !ctx.directory.contains(user_id).await {
        return Err(not_found(user_id));
    }
    let draft = parse_draft(body)?;
    let user = ctx
        .directory
        .replace(user_id, draft)
        .await
        .ok_or_else(|| not_found(user_id))?;
    info!(user_id = user_id.0, "user replaced");
    Ok(user)
}

pub async fn patch_user(
    ctx: &ApiContext,
    user_id: UserId,
    body: &[u8],
) -> Result<User, ApiError> {
    if !ctx.directory.contains(user_id).await {
        return Err(not_found(user_id));
    }
    let patch = parse_patch(body)?;
    let user = ctx
        .directory
        .patch(user_id, patch)
        .await
        .ok_or_else(|| not_found(user_id))?;
    info!(user_id = user_id.0, "user patched");
    Ok(user)
}

/// Returns the confirmation message on success.
pub async fn delete_user(ctx: &ApiContext, user_id: UserId) -> Result<String, ApiError> {
    if !ctx.directory.remove(user_id).await {
        return Err(not_found(user_id));
    }
    info!(user_id = user_id.0, "user deleted");
    Ok(format!("User with ID {user_id} deleted successfully"))
}

fn not_found(user_id: UserId) -> ApiError {
    ApiError::not_found(format!("User with ID {user_id} not found"))
}

fn json_object(body: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn parse_draft(body: &[u8]) -> Result<UserDraft, ApiError> {
    let map = json_object(body).ok_or_else(|| ApiError::validation(MISSING_FIELDS_MESSAGE))?;
    match (non_empty_str(&map, "name"), non_empty_str(&map, "email")) {
        (Some(name), Some(email)) => Ok(UserDraft::new(name, email)),
        _ => Err(ApiError::validation(MISSING_FIELDS_MESSAGE)),
    }
}

fn parse_patch(body: &[u8]) -> Result<UserPatch, ApiError> {
    let map = json_object(body)
        .filter(|map| !map.is_empty())
        .ok_or_else(|| ApiError::validation(EMPTY_PATCH_MESSAGE))?;

    let field = |key: &str| -> Result<Option<String>, ApiError> {
        match map.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(ApiError::validation(format!("{key} must be a string"))),
        }
    };

    Ok(UserPatch {
        name: field("name")?,
        email: field("email")?,
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
