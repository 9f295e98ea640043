//! Session Gateway
//!
//! Routes identity-keyed session requests to the owning [`SessionActor`],
//! creating actors on demand. The routing table lock is held only to find or
//! insert an actor, never while an operation runs, so identities proceed in
//! parallel.
//!
//! A gateway is an explicit value: construct one per server (or per test) and
//! clone it to share. [`SessionGateway::shutdown`] tears the routing table
//! down and closes the gateway: later requests fail with
//! [`SessionError::ShutDown`] rather than spawning a second actor next to one
//! that may still be mid-operation.

use std::{collections::HashMap, sync::Arc};

use edgevault_core::{
    EdgeConfig, Environment, SessionAttributes, SessionRecord, SessionRequest, SessionResponse,
    SessionStatus, SessionView,
};
use tokio::sync::RwLock;

use crate::{
    session_actor::{SessionActor, SessionError, check_identity},
    storage::Storage,
};

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stored records examined
    pub scanned: usize,
    /// Expired records evicted
    pub expired: usize,
    /// Evictions that failed (retried next sweep)
    pub failed: usize,
    /// Idle actors released afterwards
    pub released: usize,
}

/// Routing table. `closed` flips once, under the write lock.
struct Routes<E: Environment, S: Storage> {
    actors: HashMap<String, Arc<SessionActor<E, S>>>,
    closed: bool,
}

/// Routes session operations to per-identity actors.
pub struct SessionGateway<E: Environment, S: Storage> {
    env: E,
    storage: S,
    config: EdgeConfig,
    routes: Arc<RwLock<Routes<E, S>>>,
}

impl<E: Environment, S: Storage> Clone for SessionGateway<E, S> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            storage: self.storage.clone(),
            config: self.config,
            routes: Arc::clone(&self.routes),
        }
    }
}

impl<E: Environment, S: Storage> SessionGateway<E, S> {
    /// Create a gateway with an empty routing table.
    pub fn new(env: E, storage: S, config: EdgeConfig) -> Self {
        let routes = Routes { actors: HashMap::new(), closed: false };
        Self { env, storage, config, routes: Arc::new(RwLock::new(routes)) }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Create or overwrite the session for `identity`.
    pub async fn create(
        &self,
        identity: &str,
        attributes: SessionAttributes,
    ) -> Result<SessionRecord, SessionError> {
        self.actor(identity).await?.create(attributes).await
    }

    /// The session for `identity`, or `None`. Evicts an expired record.
    pub async fn get(&self, identity: &str) -> Result<Option<SessionRecord>, SessionError> {
        self.actor(identity).await?.get().await
    }

    /// Refresh the session for `identity`. No-op when absent.
    pub async fn refresh(&self, identity: &str) -> Result<bool, SessionError> {
        self.actor(identity).await?.refresh().await
    }

    /// Delete the session for `identity`. Idempotent.
    pub async fn delete(&self, identity: &str) -> Result<bool, SessionError> {
        self.actor(identity).await?.delete().await
    }

    /// Whether `identity` has a valid session. Evicts an expired record.
    pub async fn validate(&self, identity: &str) -> Result<bool, SessionError> {
        self.actor(identity).await?.validate().await
    }

    /// Internal status for `identity`, distinguishing expired from missing.
    pub async fn status(&self, identity: &str) -> Result<SessionStatus, SessionError> {
        self.actor(identity).await?.status().await
    }

    /// Dispatch a method-tagged request.
    pub async fn handle(&self, request: SessionRequest) -> Result<SessionResponse, SessionError> {
        match request {
            SessionRequest::Create { identity, email, role, name } => {
                let mut attributes = SessionAttributes::new(email, role);
                attributes.display_name = name;
                self.create(&identity, attributes).await?;
                Ok(SessionResponse::Done)
            },
            SessionRequest::Get { identity } => {
                let session = self.get(&identity).await?;
                Ok(SessionResponse::Lookup {
                    exists: session.is_some(),
                    session: session.as_ref().map(SessionView::from),
                })
            },
            SessionRequest::Refresh { identity } => {
                self.refresh(&identity).await?;
                Ok(SessionResponse::Done)
            },
            SessionRequest::Delete { identity } => {
                self.delete(&identity).await?;
                Ok(SessionResponse::Done)
            },
        }
    }

    /// Evict every stored record that has expired, then release idle actors.
    ///
    /// Each eviction goes through the owning actor, so it is serialized with
    /// any request for the same identity. A record refreshed between listing
    /// and eviction survives.
    pub async fn sweep_expired(&self) -> Result<SweepReport, SessionError> {
        let records = self.storage.list_sessions().map_err(|e| {
            tracing::warn!(error = %e, "sweep could not list sessions");
            SessionError::Storage(e)
        })?;

        let now_ms = self.env.wall_clock_millis();
        let mut report = SweepReport { scanned: records.len(), ..SweepReport::default() };

        for record in records.iter().filter(|r| r.is_expired_at(now_ms)) {
            match self.status(&record.identity).await {
                Ok(SessionStatus::Expired { .. }) => report.expired += 1,
                Ok(SessionStatus::Active(_) | SessionStatus::Missing) => {},
                Err(e) => {
                    tracing::warn!(
                        identity = %record.identity,
                        error = %e,
                        "sweep eviction failed"
                    );
                    report.failed += 1;
                },
            }
        }

        report.released = self.release_idle().await;
        Ok(report)
    }

    /// Drop actors that nobody is using and that hold no live record.
    ///
    /// Returns how many were released. A released identity gets a fresh actor
    /// on its next request, which reloads from storage.
    pub async fn release_idle(&self) -> usize {
        let mut routes = self.routes.write().await;
        let actors = &mut routes.actors;
        let before = actors.len();

        // Clones are only handed out under the routing lock, so a count of one
        // here means no caller holds the actor.
        actors.retain(|_, actor| Arc::strong_count(actor) > 1 || actor.holds_live_record());

        before - actors.len()
    }

    /// Number of routed actors.
    pub async fn actor_count(&self) -> usize {
        self.routes.read().await.actors.len()
    }

    /// Clear the routing table and refuse further routing.
    ///
    /// In-flight operations finish on the actors they already hold; stored
    /// records are untouched. Every later request, on any clone, fails with
    /// [`SessionError::ShutDown`].
    pub async fn shutdown(&self) {
        let mut routes = self.routes.write().await;
        routes.closed = true;
        let released = routes.actors.len();
        routes.actors.clear();
        tracing::debug!(released, "session gateway shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub async fn is_shut_down(&self) -> bool {
        self.routes.read().await.closed
    }

    async fn actor(&self, identity: &str) -> Result<Arc<SessionActor<E, S>>, SessionError> {
        check_identity(identity)?;

        {
            let routes = self.routes.read().await;
            if routes.closed {
                return Err(SessionError::ShutDown);
            }
            if let Some(actor) = routes.actors.get(identity) {
                return Ok(Arc::clone(actor));
            }
        }

        let mut routes = self.routes.write().await;
        if routes.closed {
            return Err(SessionError::ShutDown);
        }
        let actor = routes.actors.entry(identity.to_string()).or_insert_with(|| {
            tracing::trace!(identity, "spawning session actor");
            Arc::new(SessionActor::new(
                identity,
                self.env.clone(),
                self.storage.clone(),
                self.config.session_window(),
            ))
        });
        Ok(Arc::clone(actor))
    }
}
