//! Session Actor
//!
//! One actor per identity. Every operation on that identity's session record
//! runs under the actor's lock, so concurrent create, refresh, delete and get
//! calls for the same identity are applied one at a time in arrival order.
//! Actors for different identities share nothing and never wait on each other.
//!
//! # Lazy expiry
//!
//! `get`, `validate` and `refresh` check the record against the wall clock.
//! A record past its expiry is deleted from storage inside the same call and
//! reported as absent. Reads therefore have a side effect.
//!
//! # Caching
//!
//! The actor loads its record from storage on first use and writes through on
//! every mutation (storage first, then cache). A storage failure drops the
//! cache so the next call reloads.

use std::time::Duration;

use edgevault_core::{
    Environment, ErrorKind, SessionAttributes, SessionRecord, SessionStatus, session,
};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::storage::{Storage, StorageError};

/// Errors from session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Storage failed. Nothing was applied; retryable.
    #[error("session storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Identity rejected before routing.
    #[error("invalid identity: {0}")]
    InvalidIdentity(&'static str),

    /// The gateway was shut down. Nothing was applied.
    #[error("session gateway is shut down")]
    ShutDown,
}

impl SessionError {
    /// Classification for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(err) => err.kind(),
            Self::InvalidIdentity(_) => ErrorKind::InvalidRequest,
            Self::ShutDown => ErrorKind::StorageFailure,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Mutable state guarded by the actor lock.
struct ActorState {
    /// `None` until loaded from storage; then the stored record, if any.
    cached: Option<Option<SessionRecord>>,
}

/// Serialized owner of one identity's session record.
pub struct SessionActor<E: Environment, S: Storage> {
    identity: String,
    env: E,
    storage: S,
    window: Duration,
    state: Mutex<ActorState>,
}

impl<E: Environment, S: Storage> SessionActor<E, S> {
    /// Create an actor for `identity`. Nothing is loaded until first use.
    pub fn new(identity: impl Into<String>, env: E, storage: S, window: Duration) -> Self {
        Self {
            identity: identity.into(),
            env,
            storage,
            window,
            state: Mutex::new(ActorState { cached: None }),
        }
    }

    /// Identity this actor owns.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Create or overwrite the session.
    ///
    /// Attributes replace the previous ones wholesale and `created_at_ms`
    /// restarts at now.
    pub async fn create(
        &self,
        attributes: SessionAttributes,
    ) -> Result<SessionRecord, SessionError> {
        let mut state = self.state.lock().await;

        let now_ms = self.env.wall_clock_millis();
        let record = SessionRecord::new(self.identity.clone(), attributes, now_ms, self.window);

        self.persist(&mut state, &record)?;

        tracing::debug!(
            identity = %self.identity,
            expires_at_ms = record.expires_at_ms,
            "session created"
        );
        Ok(record)
    }

    /// Current status, evicting the record if it has expired.
    ///
    /// `Expired` is reported once, by the call that evicts; later calls see
    /// `Missing`.
    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let mut state = self.state.lock().await;
        self.current(&mut state)
    }

    /// The session, or `None` if absent or expired.
    ///
    /// Evicts an expired record as a side effect.
    pub async fn get(&self) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.status().await?.into_active())
    }

    /// Whether a valid session exists. Same side effect as [`Self::get`].
    pub async fn validate(&self) -> Result<bool, SessionError> {
        Ok(self.status().await?.is_active())
    }

    /// Slide expiry to now plus the window.
    ///
    /// Absent or expired sessions are left absent; returns whether a session
    /// was refreshed.
    pub async fn refresh(&self) -> Result<bool, SessionError> {
        let mut state = self.state.lock().await;

        let SessionStatus::Active(mut record) = self.current(&mut state)? else {
            tracing::debug!(identity = %self.identity, "refresh ignored: no session");
            return Ok(false);
        };

        record.refresh(self.env.wall_clock_millis(), self.window);
        self.persist(&mut state, &record)?;

        tracing::debug!(
            identity = %self.identity,
            expires_at_ms = record.expires_at_ms,
            "session refreshed"
        );
        Ok(true)
    }

    /// Remove the session. Idempotent; returns whether one existed.
    pub async fn delete(&self) -> Result<bool, SessionError> {
        let mut state = self.state.lock().await;

        let existed = self.storage.delete_session(&self.identity).map_err(|e| {
            state.cached = None;
            self.storage_failure("delete_session", e)
        })?;
        state.cached = Some(None);

        tracing::debug!(identity = %self.identity, existed, "session deleted");
        Ok(existed)
    }

    /// Whether the actor holds a cached, unexpired record.
    ///
    /// Returns `true` while an operation is in flight. Never touches storage.
    pub fn holds_live_record(&self) -> bool {
        let Ok(state) = self.state.try_lock() else {
            return true;
        };
        match &state.cached {
            Some(Some(record)) => !record.is_expired_at(self.env.wall_clock_millis()),
            Some(None) | None => false,
        }
    }

    /// Resolve the record under the lock, applying lazy expiry.
    fn current(&self, state: &mut ActorState) -> Result<SessionStatus, SessionError> {
        let record = match state.cached.clone() {
            Some(cached) => cached,
            None => {
                let loaded = self.storage.load_session(&self.identity).map_err(|e| {
                    self.storage_failure("load_session", e)
                })?;
                state.cached = Some(loaded.clone());
                loaded
            },
        };

        let Some(record) = record else {
            return Ok(SessionStatus::Missing);
        };

        let now_ms = self.env.wall_clock_millis();
        if !record.is_expired_at(now_ms) {
            return Ok(SessionStatus::Active(record));
        }

        // An expired record must never be returned as valid, so an eviction
        // failure is reported rather than downgraded to "absent".
        self.storage.delete_session(&self.identity).map_err(|e| {
            state.cached = None;
            self.storage_failure("delete_session", e)
        })?;
        state.cached = Some(None);

        tracing::info!(
            identity = %self.identity,
            expired_at_ms = record.expires_at_ms,
            now_ms,
            "session expired; evicted"
        );
        Ok(SessionStatus::Expired { expired_at_ms: record.expires_at_ms })
    }

    fn persist(&self, state: &mut ActorState, record: &SessionRecord) -> Result<(), SessionError> {
        if let Err(e) = self.storage.store_session(record) {
            state.cached = None;
            return Err(self.storage_failure("store_session", e));
        }
        state.cached = Some(Some(record.clone()));
        Ok(())
    }

    fn storage_failure(&self, operation: &'static str, err: StorageError) -> SessionError {
        tracing::warn!(
            identity = %self.identity,
            operation,
            error = %err,
            "session storage failure"
        );
        SessionError::Storage(err)
    }
}

/// Reject identities that cannot be routed.
pub(crate) fn check_identity(identity: &str) -> Result<(), SessionError> {
    match session::identity_problem(identity) {
        Some(problem) => Err(SessionError::InvalidIdentity(problem)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use edgevault_harness::SimEnv;

    use super::*;
    use crate::storage::{ChaoticStorage, MemoryStorage};

    const WINDOW: Duration = Duration::from_millis(1000);

    fn attrs() -> SessionAttributes {
        SessionAttributes::new("a@x.com", "student")
    }

    fn actor(env: &SimEnv, storage: MemoryStorage) -> SessionActor<SimEnv, MemoryStorage> {
        SessionActor::new("u1", env.clone(), storage, WINDOW)
    }

    #[tokio::test(start_paused = true)]
    async fn create_then_get_returns_attributes() {
        let env = SimEnv::with_seed(1);
        let actor = actor(&env, MemoryStorage::new());

        let created = actor.create(attrs()).await.unwrap();
        let fetched = actor.get().await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.attributes, attrs());
        assert!(fetched.expires_at_ms > fetched.created_at_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_record_is_evicted_on_read() {
        let env = SimEnv::with_seed(2);
        let storage = MemoryStorage::new();
        let actor = actor(&env, storage.clone());

        actor.create(attrs()).await.unwrap();
        env.advance(Duration::from_millis(1500));

        assert!(matches!(actor.status().await.unwrap(), SessionStatus::Expired { .. }));
        assert_eq!(storage.load_session("u1").unwrap(), None);
        assert_eq!(actor.status().await.unwrap(), SessionStatus::Missing);
        assert!(!actor.validate().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_does_not_resurrect() {
        let env = SimEnv::with_seed(3);
        let actor = actor(&env, MemoryStorage::new());

        assert!(!actor.refresh().await.unwrap());
        assert_eq!(actor.get().await.unwrap(), None);

        actor.create(attrs()).await.unwrap();
        actor.delete().await.unwrap();
        assert!(!actor.refresh().await.unwrap());
        assert_eq!(actor.get().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_slides_expiry() {
        let env = SimEnv::with_seed(4);
        let actor = actor(&env, MemoryStorage::new());

        let created = actor.create(attrs()).await.unwrap();
        env.advance(Duration::from_millis(800));
        assert!(actor.refresh().await.unwrap());

        env.advance(Duration::from_millis(800));
        let current = actor.get().await.unwrap().unwrap();
        assert_eq!(current.created_at_ms, created.created_at_ms);
        assert_eq!(current.expires_at_ms, created.expires_at_ms + 800);
    }

    #[tokio::test(start_paused = true)]
    async fn picks_up_record_written_before_actor_existed() {
        let env = SimEnv::with_seed(5);
        let storage = MemoryStorage::new();
        let record = SessionRecord::new("u1", attrs(), env.wall_clock_millis(), WINDOW);
        storage.store_session(&record).unwrap();

        let actor = actor(&env, storage);
        assert_eq!(actor.get().await.unwrap(), Some(record));
        assert!(actor.holds_live_record());
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_is_reported_not_absent() {
        let env = SimEnv::with_seed(6);
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        let actor = SessionActor::new("u1", env, chaotic, WINDOW);

        let err = actor.get().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
        assert!(err.is_retryable());

        let err = actor.create(attrs()).await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(StorageError::Io(_))));
    }

    #[test]
    fn identity_checks() {
        assert!(check_identity("u1").is_ok());
        assert_eq!(check_identity("").unwrap_err().kind(), ErrorKind::InvalidRequest);
    }
}
