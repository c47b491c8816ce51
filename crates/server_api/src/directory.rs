use std::sync::Arc;

use shared::{
    domain::{User, UserDraft, UserId},
    protocol::UserPatch,
};
use tokio::sync::RwLock;

/// Process-memory user store. Cloning shares the same underlying records.
#[derive(Clone, Default)]
pub struct UserDirectory {
    inner: Arc<RwLock<DirectoryState>>,
}

#[derive(Default)]
struct DirectoryState {
    users: Vec<User>,
    last_id: i64,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with the three demo accounts (ids 1..=3).
    pub fn with_demo_users() -> Self {
        let users = vec![
            User {
                id: UserId(1),
                name: "John Doe".into(),
                email: "john@example.com".into(),
            },
            User {
                id: UserId(2),
                name: "Jane Smith".into(),
                email: "jane@example.com".into(),
            },
            User {
                id: UserId(3),
                name: "Bob Johnson".into(),
                email: "bob@example.com".into(),
            },
        ];
        Self {
            inner: Arc::new(RwLock::new(DirectoryState { users, last_id: 3 })),
        }
    }

    pub async fn list(&self) -> Vec<User> {
        self.inner.read().await.users.clone()
    }

    pub async fn get(&self, user_id: UserId) -> Option<User> {
        let guard = self.inner.read().await;
        guard.users.iter().find(|u| u.id == user_id).cloned()
    }

    pub async fn contains(&self, user_id: UserId) -> bool {
        let guard = self.inner.read().await;
        guard.users.iter().any(|u| u.id == user_id)
    }

    pub async fn insert(&self, draft: UserDraft) -> User {
        let mut guard = self.inner.write().await;
        guard.last_id += 1;
        let user = User {
            id: UserId(guard.last_id),
            name: draft.name,
            email: draft.email,
        };
        guard.users.push(user.clone());
        user
    }

    pub async fn replace(&self, user_id: UserId, draft: UserDraft) -> Option<User> {
        let mut guard = self.inner.write().await;
        let user = guard.users.iter_mut().find(|u| u.id == user_id)?;
        user.name = draft.name;
        user.email = draft.email;
        Some(user.clone())
    }

    pub async fn patch(&self, user_id: UserId, patch: UserPatch) -> Option<User> {
        let mut guard = self.inner.write().await;
        let user = guard.users.iter_mut().find(|u| u.id == user_id)?;
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        Some(user.clone())
    }

    pub async fn remove(&self, user_id: UserId) -> bool {
        let mut guard = self.inner.write().await;
        let before = guard.users.len();
        guard.users.retain(|u| u.id != user_id);
        guard.users.len() != before
    }
}
