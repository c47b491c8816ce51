//! Local user collection kept in step with the remote directory.
//!
//! Every mutating operation trusts the server's echo of the affected user as
//! the new local truth; the local delta is never applied directly.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use shared::domain::{User, UserDraft, UserField, UserId};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{error::SyncError, RemoteResourceClient};

pub const SUCCESS_PREFIX: &str = "✅";
pub const FAILURE_PREFIX: &str = "❌";

const INCOMPLETE_DRAFT_MESSAGE: &str = "Please fill in both name and email";
const CANCELLED_MESSAGE: &str = "request cancelled";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    #[default]
    None,
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestStatus {
    pub busy: bool,
    pub last_message: String,
    pub last_outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditSession {
    #[default]
    Idle,
    Editing(UserId),
}

/// Everything a UI needs to render the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub users: Vec<User>,
    pub draft: UserDraft,
    pub edit_session: EditSession,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    StatusChanged(RequestStatus),
    CollectionChanged(Vec<User>),
    EditSessionChanged {
        session: EditSession,
        draft: UserDraft,
    },
}

/// How an operation call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Succeeded,
    Failed,
    /// Another operation was in flight; nothing was changed.
    Busy,
}

struct ControllerState {
    snapshot: ControllerSnapshot,
    /// Generation of the most recently launched operation. Starts at 0, so 0
    /// never names a launched operation.
    generation: u64,
}

pub struct ResourceController {
    client: Arc<dyn RemoteResourceClient>,
    state: Mutex<ControllerState>,
    /// Generation of an operation dropped while the state lock was contended.
    /// Settled by the next `lock_state`.
    abandoned: AtomicU64,
    events: broadcast::Sender<ControllerEvent>,
}

/// Claim on the in-flight slot. Dropping it before `finish` ran (the
/// operation future was cancelled) releases the slot with a failure status.
struct InFlight<'a> {
    controller: &'a ResourceController,
    operation: &'static str,
    generation: u64,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.controller.state.try_lock() {
            Ok(mut state) => {
                self.controller
                    .release_abandoned(&mut state, self.generation, self.operation)
            }
            Err(_) => self
                .controller
                .abandoned
                .store(self.generation, Ordering::Release),
        }
    }
}

impl ResourceController {
    /// Empty collection, idle session and idle status. No request is made.
    pub fn new(client: Arc<dyn RemoteResourceClient>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            client,
            state: Mutex::new(ControllerState {
                snapshot: ControllerSnapshot::default(),
                generation: 0,
            }),
            abandoned: AtomicU64::new(0),
            events,
        }
    }

    /// Builds the controller and populates it with one list call.
    pub async fn initialize(client: Arc<dyn RemoteResourceClient>) -> Self {
        let controller = Self::new(client);
        controller.list_all().await;
        controller
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        self.lock_state().await.snapshot.clone()
    }

    pub async fn users(&self) -> Vec<User> {
        self.lock_state().await.snapshot.users.clone()
    }

    pub async fn status(&self) -> RequestStatus {
        self.lock_state().await.snapshot.status.clone()
    }

    pub async fn set_draft(&self, draft: UserDraft) {
        let mut guard = self.lock_state().await;
        guard.snapshot.draft = draft;
    }

    pub async fn set_draft_field(&self, field: UserField, value: impl Into<String>) {
        let mut guard = self.lock_state().await;
        guard.snapshot.draft.set(field, value);
    }

    /// Targets `user` with the next submit. Unsaved draft content is
    /// overwritten with the user's current fields.
    pub async fn start_edit(&self, user: &User) {
        let mut guard = self.lock_state().await;
        guard.snapshot.draft = UserDraft::from_user(user);
        guard.snapshot.edit_session = EditSession::Editing(user.id);
        debug!(user_id = user.id.0, "edit session started");
        self.emit_edit_session(&guard.snapshot);
    }

    pub async fn cancel_edit(&self) {
        let mut guard = self.lock_state().await;
        guard.snapshot.draft = UserDraft::default();
        guard.snapshot.edit_session = EditSession::Idle;
        self.emit_edit_session(&guard.snapshot);
    }

    /// Sends the held draft: a replace when an edit session is active,
    /// otherwise a create.
    pub async fn submit(&self) -> Dispatch {
        let (session, draft) = {
            let guard = self.lock_state().await;
            (guard.snapshot.edit_session, guard.snapshot.draft.clone())
        };
        match session {
            EditSession::Editing(user_id) => self.replace(user_id, draft).await,
            EditSession::Idle => self.create(draft).await,
        }
    }

    pub async fn list_all(&self) -> Dispatch {
        let in_flight = match self.begin("list_all", |_| Ok(())).await {
            Ok(in_flight) => in_flight,
            Err(dispatch) => return dispatch,
        };
        let result = self.client.list_users().await;
        self.finish(in_flight, result, true, |snapshot, listing| {
            snapshot.users = listing.users;
            format!("Successfully fetched {} users", listing.count)
        })
        .await
    }

    pub async fn get_one(&self, user_id: UserId) -> Dispatch {
        let in_flight = match self.begin("get_one", |_| Ok(())).await {
            Ok(in_flight) => in_flight,
            Err(dispatch) => return dispatch,
        };
        let result = self.client.get_user(user_id).await;
        self.finish(in_flight, result, false, |_, user| {
            format!("Found user: {} ({})", user.name, user.email)
        })
        .await
    }

    /// The draft is stored before validation so a failed create leaves it in
    /// place for correction.
    pub async fn create(&self, draft: UserDraft) -> Dispatch {
        let prepare = |snapshot: &mut ControllerSnapshot| {
            snapshot.draft = draft.clone();
            ensure_complete(&snapshot.draft)
        };
        let in_flight = match self.begin("create", prepare).await {
            Ok(in_flight) => in_flight,
            Err(dispatch) => return dispatch,
        };
        let result = self.client.create_user(&draft).await;
        self.finish(in_flight, result, true, |snapshot, user| {
            let message = format!("User created: {}", user.name);
            snapshot.users.push(user);
            snapshot.draft = UserDraft::default();
            message
        })
        .await
    }

    /// Only valid for the user targeted by the active edit session.
    pub async fn replace(&self, user_id: UserId, draft: UserDraft) -> Dispatch {
        let prepare = |snapshot: &mut ControllerSnapshot| {
            if snapshot.edit_session != EditSession::Editing(user_id) {
                return Err(SyncError::Validation(format!(
                    "User {user_id} is not being edited"
                )));
            }
            snapshot.draft = draft.clone();
            ensure_complete(&snapshot.draft)
        };
        let in_flight = match self.begin("replace", prepare).await {
            Ok(in_flight) => in_flight,
            Err(dispatch) => return dispatch,
        };
        let result = self.client.replace_user(user_id, &draft).await;
        self.finish(in_flight, result, true, |snapshot, user| {
            let message = format!("User updated: {}", user.name);
            replace_in_place(&mut snapshot.users, user_id, user);
            snapshot.draft = UserDraft::default();
            snapshot.edit_session = EditSession::Idle;
            message
        })
        .await
    }

    /// The whole server echo replaces the local entry, not just `field`.
    pub async fn partial_modify(&self, user_id: UserId, field: UserField, value: &str) -> Dispatch {
        let in_flight = match self.begin("partial_modify", |_| Ok(())).await {
            Ok(in_flight) => in_flight,
            Err(dispatch) => return dispatch,
        };
        let result = self.client.patch_user(user_id, field, value).await;
        self.finish(in_flight, result, true, |snapshot, user| {
            replace_in_place(&mut snapshot.users, user_id, user);
            format!("User partially updated: {field} changed to \"{value}\"")
        })
        .await
    }

    /// Confirmation is the caller's job. No local existence check is made.
    pub async fn remove(&self, user_id: UserId) -> Dispatch {
        let in_flight = match self.begin("remove", |_| Ok(())).await {
            Ok(in_flight) => in_flight,
            Err(dispatch) => return dispatch,
        };
        let result = self.client.delete_user(user_id).await;
        self.finish(in_flight, result, true, |snapshot, ()| {
            snapshot.users.retain(|u| u.id != user_id);
            "User deleted successfully".to_string()
        })
        .await
    }

    /// Locks the state, first settling an operation that was dropped while
    /// the lock was held elsewhere.
    async fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        let mut state = self.state.lock().await;
        let abandoned = self.abandoned.swap(0, Ordering::AcqRel);
        if abandoned != 0 {
            self.release_abandoned(&mut state, abandoned, "dropped operation");
        }
        state
    }

    /// Frees the slot held by `generation` if it is still the current one.
    fn release_abandoned(&self, state: &mut ControllerState, generation: u64, operation: &str) {
        if state.generation != generation || !state.snapshot.status.busy {
            return;
        }
        warn!(operation, generation, "request cancelled before completion");
        state.snapshot.status = RequestStatus {
            busy: false,
            last_message: failure_message(&SyncError::Transport(CANCELLED_MESSAGE.to_string())),
            last_outcome: Outcome::Failure,
        };
        let _ = self
            .events
            .send(ControllerEvent::StatusChanged(state.snapshot.status.clone()));
    }

    /// Claims the in-flight slot for one operation.
    ///
    /// When another operation holds the slot nothing is touched and
    /// `Dispatch::Busy` comes back. A failing `prepare` records the failure
    /// status without claiming the slot.
    async fn begin(
        &self,
        operation: &'static str,
        prepare: impl FnOnce(&mut ControllerSnapshot) -> Result<(), SyncError>,
    ) -> Result<InFlight<'_>, Dispatch> {
        let mut guard = self.lock_state().await;
        if guard.snapshot.status.busy {
            warn!(operation, "rejected: another request is in flight");
            return Err(Dispatch::Busy);
        }

        if let Err(err) = prepare(&mut guard.snapshot) {
            warn!(operation, %err, "local validation failed");
            guard.snapshot.status = RequestStatus {
                busy: false,
                last_message: failure_message(&err),
                last_outcome: Outcome::Failure,
            };
            let _ = self
                .events
                .send(ControllerEvent::StatusChanged(guard.snapshot.status.clone()));
            return Err(Dispatch::Failed);
        }

        guard.generation += 1;
        guard.snapshot.status.busy = true;
        guard.snapshot.status.last_message.clear();
        debug!(operation, generation = guard.generation, "request started");
        let _ = self
            .events
            .send(ControllerEvent::StatusChanged(guard.snapshot.status.clone()));
        Ok(InFlight {
            controller: self,
            operation,
            generation: guard.generation,
            finished: false,
        })
    }

    async fn finish<T>(
        &self,
        mut in_flight: InFlight<'_>,
        result: Result<T, SyncError>,
        touches_collection: bool,
        reconcile: impl FnOnce(&mut ControllerSnapshot, T) -> String,
    ) -> Dispatch {
        let operation = in_flight.operation;
        let mut guard = self.lock_state().await;
        in_flight.finished = true;

        let session_before = guard.snapshot.edit_session;
        let dispatch = match result {
            Ok(value) => {
                let message = reconcile(&mut guard.snapshot, value);
                info!(operation, %message, "request succeeded");
                guard.snapshot.status.last_message = format!("{SUCCESS_PREFIX} {message}");
                guard.snapshot.status.last_outcome = Outcome::Success;
                if touches_collection {
                    let _ = self.events.send(ControllerEvent::CollectionChanged(
                        guard.snapshot.users.clone(),
                    ));
                }
                Dispatch::Succeeded
            }
            Err(err) => {
                warn!(operation, %err, "request failed");
                guard.snapshot.status.last_message = failure_message(&err);
                guard.snapshot.status.last_outcome = Outcome::Failure;
                Dispatch::Failed
            }
        };
        guard.snapshot.status.busy = false;

        if guard.snapshot.edit_session != session_before {
            self.emit_edit_session(&guard.snapshot);
        }
        let _ = self
            .events
            .send(ControllerEvent::StatusChanged(guard.snapshot.status.clone()));
        dispatch
    }

    fn emit_edit_session(&self, snapshot: &ControllerSnapshot) {
        let _ = self.events.send(ControllerEvent::EditSessionChanged {
            session: snapshot.edit_session,
            draft: snapshot.draft.clone(),
        });
    }
}

fn ensure_complete(draft: &UserDraft) -> Result<(), SyncError> {
    if draft.is_complete() {
        Ok(())
    } else {
        Err(SyncError::Validation(INCOMPLETE_DRAFT_MESSAGE.to_string()))
    }
}

fn replace_in_place(users: &mut [User], user_id: UserId, echo: User) {
    if let Some(slot) = users.iter_mut().find(|u| u.id == user_id) {
        *slot = echo;
    }
}

fn failure_message(err: &SyncError) -> String {
    match err {
        SyncError::Validation(message) => format!("{FAILURE_PREFIX} {message}"),
        other => format!("{FAILURE_PREFIX} Error: {other}"),
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
