//! Request dispatch.
//!
//! Turns decoded [`Request`]s into gateway and prekey-manager calls and every
//! outcome, error included, into a [`Response`]. Errors cross the boundary as
//! an [`ErrorKind`] plus message; an expired session is indistinguishable from
//! a missing one here.

use edgevault_core::{
    EdgeConfig, Environment, ErrorKind, ErrorPayload, MAX_PREKEYS_PER_RESPONSE, PrekeyRequest,
    PrekeyResponse, Request, Response, WireBatchFailure,
};

use crate::{
    gateway::SessionGateway,
    prekey_manager::{PrekeyError, PrekeyManager},
    storage::{Storage, StorageError},
};

/// Dispatches session and prekey requests.
pub struct RequestHandler<E: Environment, S: Storage> {
    sessions: SessionGateway<E, S>,
    prekeys: PrekeyManager<E, S>,
}

impl<E: Environment, S: Storage> Clone for RequestHandler<E, S> {
    fn clone(&self) -> Self {
        Self { sessions: self.sessions.clone(), prekeys: self.prekeys.clone() }
    }
}

impl<E: Environment, S: Storage> RequestHandler<E, S> {
    /// Handler with a fresh gateway and manager over shared storage.
    pub fn new(env: E, storage: S, config: EdgeConfig) -> Self {
        Self {
            sessions: SessionGateway::new(env.clone(), storage.clone(), config),
            prekeys: PrekeyManager::new(env, storage, config),
        }
    }

    /// The session gateway.
    pub fn sessions(&self) -> &SessionGateway<E, S> {
        &self.sessions
    }

    /// The prekey manager.
    pub fn prekeys(&self) -> &PrekeyManager<E, S> {
        &self.prekeys
    }

    /// Handle one request. Never fails; errors become [`Response::Error`].
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Session(request) => match self.sessions.handle(request).await {
                Ok(response) => Response::Session(response),
                Err(e) => error_response(e.kind(), e.to_string()),
            },
            Request::Prekey(request) => match self.handle_prekey(request) {
                Ok(response) => Response::Prekey(response),
                Err(e) => error_response(e.kind(), e.to_string()),
            },
        }
    }

    fn handle_prekey(&self, request: PrekeyRequest) -> Result<PrekeyResponse, PrekeyError> {
        match request {
            PrekeyRequest::Generate { identity, start_id, count } => {
                let config = self.sessions.config();
                let outcome = self.prekeys.generate_batch(
                    &identity,
                    start_id.unwrap_or(config.default_start_id),
                    count.unwrap_or(config.default_batch_size),
                )?;

                Ok(PrekeyResponse::Generated {
                    prekeys: outcome.issued.iter().map(|p| p.to_wire()).collect(),
                    failures: outcome
                        .failed
                        .iter()
                        .map(|f| {
                            let message = failure_message(&f.error);
                            WireBatchFailure::new(f.key_id, f.error.kind(), message)
                        })
                        .collect(),
                })
            },
            PrekeyRequest::Export { identity, after } => {
                let page = self.prekeys.export_page(&identity, after, MAX_PREKEYS_PER_RESPONSE)?;
                Ok(PrekeyResponse::Exported {
                    prekeys: page.prekeys.iter().map(|p| p.to_wire()).collect(),
                    next_after: page.next_after,
                })
            },
            PrekeyRequest::Consume { identity, key_id } => {
                let pair = self.prekeys.consume(&identity, key_id)?;
                Ok(PrekeyResponse::Consumed {
                    key_id,
                    public_key: pair.public_key_base64(),
                    private_key: pair.private_key_base64(),
                })
            },
        }
    }
}

// The caller already knows the identity; leaving it out keeps each entry small.
fn failure_message(error: &StorageError) -> String {
    match error {
        StorageError::Conflict { .. } => "key id already issued".to_string(),
        StorageError::Io(_) | StorageError::Serialization(_) => error.to_string(),
    }
}

fn error_response(kind: ErrorKind, message: String) -> Response {
    Response::Error(ErrorPayload::new(kind, message))
}
