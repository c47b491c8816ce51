use serde::{Deserialize, Serialize};

use crate::domain::{UserField, UserId};

pub fn users_route() -> &'static str {
    "/api/users"
}

pub fn user_route(user_id: UserId) -> String {
    format!("{}/{}", users_route(), user_id)
}

/// Response body shared by every `/api/users` endpoint.
///
/// `data` carries a single user or an array of users, `count` is only present
/// on list responses, and `message` explains failures (and some successes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            count: None,
            data: Some(data),
            message: None,
        }
    }

    pub fn listing(data: T, count: usize) -> Self {
        Self {
            success: true,
            count: Some(count),
            data: Some(data),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            count: None,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    pub fn acknowledged(message: impl Into<String>) -> Self {
        Self {
            success: true,
            count: None,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Body of a PATCH request. Only the fields present are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserPatch {
    pub fn single(field: UserField, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match field {
            UserField::Name => Self {
                name: value,
                email: None,
            },
            UserField::Email => Self {
                name: None,
                email: value,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}
