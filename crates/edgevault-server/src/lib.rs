//! Edgevault server.
//!
//! Per-identity session actors and a one-time prekey service behind a framed
//! TCP endpoint, with system time and cryptographic RNG.
//!
//! # Architecture
//!
//! Session and prekey logic is generic over [`Environment`] and [`Storage`],
//! so the same code runs under [`SystemEnv`] in production and under the
//! simulation harness in tests. [`Server`] wires the pieces to a Tokio TCP
//! listener.
//!
//! # Components
//!
//! - [`SessionActor`]: serialized owner of one identity's session record
//! - [`SessionGateway`]: routes session requests to actors, created on demand
//! - [`PrekeyManager`]: batch issuance and exactly-once consumption of prekeys
//! - [`ExpirySweeper`]: background eviction of sessions nobody reads
//! - [`RequestHandler`]: request-to-response dispatch
//! - [`storage`]: in-memory, Redb and fault-injecting backends
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod gateway;
mod handler;
mod prekey_manager;
mod session_actor;
pub mod storage;
mod sweeper;
mod system_env;
pub mod transport;

use std::{future::Future, net::SocketAddr, path::PathBuf};

use edgevault_core::{EdgeConfig, Environment};
pub use error::ServerError;
pub use gateway::{SessionGateway, SweepReport};
pub use handler::RequestHandler;
pub use prekey_manager::{BatchFailure, BatchOutcome, PrekeyError, PrekeyManager};
pub use session_actor::{SessionActor, SessionError};
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
pub use sweeper::{ExpirySweeper, SweeperHandle};
pub use system_env::SystemEnv;
use tokio::net::TcpListener;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:7878")
    pub bind_address: String,
    /// Redb database file; in-memory storage when absent
    pub db_path: Option<PathBuf>,
    /// Session and prekey options
    pub edge: EdgeConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7878".to_string(),
            db_path: None,
            edge: EdgeConfig::default(),
        }
    }
}

/// Production Edgevault server.
pub struct Server<S: Storage> {
    listener: TcpListener,
    handler: RequestHandler<SystemEnv, S>,
    env: SystemEnv,
}

impl<S: Storage> Server<S> {
    /// Validate the configuration and bind the listener.
    pub async fn bind(config: &ServerRuntimeConfig, storage: S) -> Result<Self, ServerError> {
        config.edge.validate()?;

        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ServerError::Config(format!("invalid bind address '{}': {e}", config.bind_address))
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        let env = SystemEnv::new();
        let handler = RequestHandler::new(env.clone(), storage, config.edge);

        Ok(Self { listener, handler, env })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Request handler (for inspection in tests).
    pub fn handler(&self) -> &RequestHandler<SystemEnv, S> {
        &self.handler
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// Serve until `shutdown` completes, then stop the sweeper and clear the
    /// actor table.
    ///
    /// Connections already accepted keep their tasks, but once the gateway is
    /// shut down their session requests fail with a retryable error instead
    /// of reaching a new actor.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tracing::info!(addr = %self.local_addr()?, "edgevault server listening");

        let sweeper = ExpirySweeper::new(self.handler.sessions().clone(), self.env.clone()).spawn();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = self.handler.clone();
                        let connection_id = self.env.random_u64();
                        tracing::debug!(connection_id, %peer, "accepted connection");

                        tokio::spawn(async move {
                            if let Err(e) =
                                transport::serve_connection(stream, handler, connection_id).await
                            {
                                tracing::warn!(connection_id, error = %e, "connection error");
                            }
                        });
                    },
                    Err(e) => tracing::error!(error = %e, "accept error"),
                },
            }
        }

        tracing::info!("edgevault server shutting down");
        sweeper.shutdown().await;
        self.handler.sessions().shutdown().await;
        Ok(())
    }
}

/// Open the configured storage and serve until Ctrl-C.
pub async fn run(config: ServerRuntimeConfig) -> Result<(), ServerError> {
    match &config.db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using redb storage");
            let storage = RedbStorage::open(path)?;
            Server::bind(&config, storage).await?.run().await
        },
        None => {
            tracing::warn!("no database path given; sessions and prekeys are not durable");
            Server::bind(&config, MemoryStorage::new()).await?.run().await
        },
    }
}
