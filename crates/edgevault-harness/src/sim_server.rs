//! Turmoil-backed server and client.
//!
//! `SimServer` runs the production [`serve_connection`] loop over turmoil's
//! simulated TCP, with a [`SimEnv`] driving time and randomness. `SimClient`
//! speaks the same framing, so tests exercise the full request path including
//! encoding, routing, and concurrent connections.

use std::io;

use edgevault_core::{
    EdgeConfig, KeyId, PrekeyRequest, Request, Response, SessionRequest,
};
use edgevault_server::{
    MemoryStorage, RequestHandler, Storage,
    transport::{call, serve_connection},
};
use turmoil::net::{TcpListener, TcpStream};

use crate::SimEnv;

/// Simulated server host.
pub struct SimServer<S: Storage = MemoryStorage> {
    listener: TcpListener,
    handler: RequestHandler<SimEnv, S>,
    next_connection_id: u64,
}

impl SimServer<MemoryStorage> {
    /// Bind with in-memory storage and default options.
    pub async fn bind(address: &str, env: SimEnv) -> io::Result<Self> {
        Self::bind_with(address, env, MemoryStorage::new(), EdgeConfig::default()).await
    }
}

impl<S: Storage> SimServer<S> {
    /// Bind with explicit storage and options.
    pub async fn bind_with(
        address: &str,
        env: SimEnv,
        storage: S,
        config: EdgeConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let handler = RequestHandler::new(env, storage, config);
        Ok(Self { listener, handler, next_connection_id: 1 })
    }

    /// Request handler (for inspecting state from the host).
    pub fn handler(&self) -> &RequestHandler<SimEnv, S> {
        &self.handler
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(mut self) -> io::Result<()> {
        loop {
            self.accept_one().await?;
        }
    }

    /// Accept exactly `count` connections, serve each on its own task, and
    /// return once all of them have closed.
    pub async fn serve_connections(&mut self, count: usize) -> io::Result<()> {
        let mut tasks = Vec::with_capacity(count);
        for _ in 0..count {
            tasks.push(self.accept_one().await?);
        }
        for task in tasks {
            task.await.map_err(io::Error::other)?;
        }
        Ok(())
    }

    async fn accept_one(&mut self) -> io::Result<tokio::task::JoinHandle<()>> {
        let (stream, peer) = self.listener.accept().await?;

        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;
        tracing::debug!(connection_id, %peer, "sim connection accepted");

        let handler = self.handler.clone();
        Ok(tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, handler, connection_id).await {
                tracing::warn!(connection_id, error = %e, "sim connection error");
            }
        }))
    }
}

/// Simulated client connection.
pub struct SimClient {
    stream: TcpStream,
}

impl SimClient {
    /// Connect to a [`SimServer`].
    pub async fn connect(address: &str) -> io::Result<Self> {
        Ok(Self { stream: TcpStream::connect(address).await? })
    }

    /// Send one request and wait for its response.
    pub async fn call(&mut self, request: Request) -> io::Result<Response> {
        call(&mut self.stream, &request).await.map_err(|e| io::Error::other(e.to_string()))
    }

    /// `POST session`.
    pub async fn create_session(
        &mut self,
        identity: &str,
        email: &str,
        role: &str,
    ) -> io::Result<Response> {
        self.call(Request::Session(SessionRequest::Create {
            identity: identity.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            name: None,
        }))
        .await
    }

    /// `GET session`.
    pub async fn get_session(&mut self, identity: &str) -> io::Result<Response> {
        self.call(Request::Session(SessionRequest::Get { identity: identity.to_string() })).await
    }

    /// `PUT session`.
    pub async fn refresh_session(&mut self, identity: &str) -> io::Result<Response> {
        self.call(Request::Session(SessionRequest::Refresh { identity: identity.to_string() }))
            .await
    }

    /// `DELETE session`.
    pub async fn delete_session(&mut self, identity: &str) -> io::Result<Response> {
        self.call(Request::Session(SessionRequest::Delete { identity: identity.to_string() }))
            .await
    }

    /// `generate`.
    pub async fn generate(
        &mut self,
        identity: &str,
        start_id: KeyId,
        count: u32,
    ) -> io::Result<Response> {
        self.call(Request::Prekey(PrekeyRequest::Generate {
            identity: identity.to_string(),
            start_id: Some(start_id),
            count: Some(count),
        }))
        .await
    }

    /// `export`, first page.
    pub async fn export(&mut self, identity: &str) -> io::Result<Response> {
        self.export_after(identity, None).await
    }

    /// `export`, the page after `after`.
    pub async fn export_after(
        &mut self,
        identity: &str,
        after: Option<KeyId>,
    ) -> io::Result<Response> {
        self.call(Request::Prekey(PrekeyRequest::Export { identity: identity.to_string(), after }))
            .await
    }

    /// `consume`.
    pub async fn consume(&mut self, identity: &str, key_id: KeyId) -> io::Result<Response> {
        let identity = identity.to_string();
        self.call(Request::Prekey(PrekeyRequest::Consume { identity, key_id })).await
    }
}
