use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{User, UserDraft, UserField, UserId},
    protocol::{user_route, users_route, Envelope, UserPatch},
};
use tracing::debug;
use url::Url;

mod controller;
pub mod error;

pub use controller::{
    ControllerEvent, ControllerSnapshot, Dispatch, EditSession, Outcome, RequestStatus,
    ResourceController, FAILURE_PREFIX, SUCCESS_PREFIX,
};
pub use error::{ClientConfigError, SyncError};

/// Result of a list call: the users in server order plus the server's count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserListing {
    pub users: Vec<User>,
    pub count: usize,
}

/// The remote side of the user collection, one call per HTTP verb.
#[async_trait]
pub trait RemoteResourceClient: Send + Sync {
    async fn list_users(&self) -> Result<UserListing, SyncError>;
    async fn get_user(&self, user_id: UserId) -> Result<User, SyncError>;
    async fn create_user(&self, draft: &UserDraft) -> Result<User, SyncError>;
    async fn replace_user(&self, user_id: UserId, draft: &UserDraft) -> Result<User, SyncError>;
    async fn patch_user(
        &self,
        user_id: UserId,
        field: UserField,
        value: &str,
    ) -> Result<User, SyncError>;
    async fn delete_user(&self, user_id: UserId) -> Result<(), SyncError>;
}

pub struct HttpResourceClient {
    http: Client,
    server_url: String,
}

impl HttpResourceClient {
    pub fn new(server_url: &str) -> Result<Self, ClientConfigError> {
        Self::with_http_client(server_url, Client::new())
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self, ClientConfigError> {
        let http = Client::builder().timeout(timeout).build()?;
        Self::with_http_client(server_url, http)
    }

    pub fn with_http_client(server_url: &str, http: Client) -> Result<Self, ClientConfigError> {
        Ok(Self {
            http,
            server_url: normalize_server_url(server_url)?,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn users_url(&self) -> String {
        format!("{}{}", self.server_url, users_route())
    }

    fn user_url(&self, user_id: UserId) -> String {
        format!("{}{}", self.server_url, user_route(user_id))
    }
}

/// Validates an http(s) origin and strips any trailing slash so routes can be
/// appended directly.
fn normalize_server_url(raw: &str) -> Result<String, ClientConfigError> {
    let invalid = |reason: String| ClientConfigError::InvalidServerUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn transport(err: reqwest::Error) -> SyncError {
    SyncError::Transport(err.to_string())
}

async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, SyncError> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport)?;

    if !status.is_success() {
        let message = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.message);
        return Err(SyncError::Server {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: Envelope<T> = serde_json::from_slice(&body)
        .map_err(|e| SyncError::Transport(format!("malformed response body: {e}")))?;
    if !envelope.success {
        return Err(SyncError::Server {
            status: status.as_u16(),
            message: envelope.message,
        });
    }
    Ok(envelope)
}

fn require_data<T>(envelope: Envelope<T>) -> Result<T, SyncError> {
    envelope
        .data
        .ok_or_else(|| SyncError::Transport("malformed response body: missing data".to_string()))
}

#[async_trait]
impl RemoteResourceClient for HttpResourceClient {
    async fn list_users(&self) -> Result<UserListing, SyncError> {
        let response = self
            .http
            .get(self.users_url())
            .send()
            .await
            .map_err(transport)?;
        let envelope = read_envelope::<Vec<User>>(response).await?;
        let reported = envelope.count;
        let users = require_data(envelope)?;
        let count = reported.unwrap_or(users.len());
        debug!(count, "listed users");
        Ok(UserListing { users, count })
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, SyncError> {
        let response = self
            .http
            .get(self.user_url(user_id))
            .send()
            .await
            .map_err(transport)?;
        require_data(read_envelope(response).await?)
    }

    async fn create_user(&self, draft: &UserDraft) -> Result<User, SyncError> {
        let response = self
            .http
            .post(self.users_url())
            .json(draft)
            .send()
            .await
            .map_err(transport)?;
        require_data(read_envelope(response).await?)
    }

    async fn replace_user(&self, user_id: UserId, draft: &UserDraft) -> Result<User, SyncError> {
        let response = self
            .http
            .put(self.user_url(user_id))
            .json(draft)
            .send()
            .await
            .map_err(transport)?;
        require_data(read_envelope(response).await?)
    }

    async fn patch_user(
        &self,
        user_id: UserId,
        field: UserField,
        value: &str,
    ) -> Result<User, SyncError> {
        let response = self
            .http
            .patch(self.user_url(user_id))
            .json(&UserPatch::single(field, value))
            .send()
            .await
            .map_err(transport)?;
        require_data(read_envelope(response).await?)
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), SyncError> {
        let response = self
            .http
            .delete(self.user_url(user_id))
            .send()
            .await
            .map_err(transport)?;
        read_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
