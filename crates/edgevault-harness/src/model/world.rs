//! Model world: the reference implementation.
//!
//! Plain maps and a millisecond counter. No actors, no storage, no
//! concurrency. It is the oracle the real gateway and prekey manager are
//! checked against.

use std::collections::{BTreeMap, BTreeSet};

use super::operation::{
    ModelSession, ModelUser, Operation, OperationError, OperationResult, identity,
};

/// Observable state for oracle comparison.
///
/// Stored records, not what a reader would see: an expired record nobody has
/// read yet is still here, just as it is still in real storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservableState {
    /// `(identity, created_at_ms, expires_at_ms)`, sorted by identity.
    pub sessions: Vec<(String, u64, u64)>,
    /// Live prekey ids per identity, both sorted; identities with none omitted.
    pub prekeys: Vec<(String, Vec<u32>)>,
}

/// Reference model of sessions and prekeys.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    now_ms: u64,
    window_ms: u64,
    max_batch_size: u32,
    sessions: BTreeMap<String, ModelSession>,
    prekeys: BTreeMap<String, BTreeSet<u32>>,
    consumed: BTreeMap<String, BTreeSet<u32>>,
}

impl ModelWorld {
    /// Model starting at `now_ms` with the given session window and batch cap.
    pub fn new(now_ms: u64, window_ms: u64, max_batch_size: u32) -> Self {
        Self {
            now_ms,
            window_ms,
            max_batch_size,
            sessions: BTreeMap::new(),
            prekeys: BTreeMap::new(),
            consumed: BTreeMap::new(),
        }
    }

    /// Current model time (Unix ms).
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Apply an operation and return the result.
    ///
    /// The result should match the real implementation's result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::CreateSession { user, variant, named } => {
                let (email, role, name) = ModelSession::attributes(*variant, *named);
                let session = ModelSession {
                    email,
                    role,
                    name,
                    created_at_ms: self.now_ms,
                    expires_at_ms: self.now_ms + self.window_ms,
                };
                self.sessions.insert(identity(*user), session);
                OperationResult::Ok
            },
            Operation::GetSession { user } => OperationResult::Session(self.read(*user)),
            Operation::ValidateSession { user } => {
                OperationResult::Valid(self.read(*user).is_some())
            },
            Operation::RefreshSession { user } => {
                let refreshed = self.read(*user).is_some();
                if let Some(session) = self.sessions.get_mut(&identity(*user)) {
                    session.expires_at_ms = session.expires_at_ms.max(self.now_ms + self.window_ms);
                }
                OperationResult::Refreshed(refreshed)
            },
            Operation::DeleteSession { user } => {
                OperationResult::Deleted(self.sessions.remove(&identity(*user)).is_some())
            },
            Operation::AdvanceTime { millis } => {
                self.now_ms += u64::from(*millis);
                OperationResult::Ok
            },
            Operation::GenerateBatch { user, start_id, count } => {
                self.apply_generate(*user, u32::from(*start_id), u32::from(*count))
            },
            Operation::ConsumePrekey { user, key_id } => {
                let key_id = u32::from(*key_id);
                let identity = identity(*user);
                let removed =
                    self.prekeys.get_mut(&identity).is_some_and(|keys| keys.remove(&key_id));
                if self.prekeys.get(&identity).is_some_and(BTreeSet::is_empty) {
                    self.prekeys.remove(&identity);
                }
                if removed {
                    self.consumed.entry(identity).or_default().insert(key_id);
                    OperationResult::Consumed(key_id)
                } else {
                    OperationResult::Error(OperationError::NotFound)
                }
            },
            Operation::ExportPrekeys { user } => OperationResult::Prekeys(
                self.prekeys
                    .get(&identity(*user))
                    .map(|keys| keys.iter().copied().collect())
                    .unwrap_or_default(),
            ),
        }
    }

    /// Stored state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            sessions: self
                .sessions
                .iter()
                .map(|(id, s)| (id.clone(), s.created_at_ms, s.expires_at_ms))
                .collect(),
            prekeys: self
                .prekeys
                .iter()
                .map(|(id, keys)| (id.clone(), keys.iter().copied().collect()))
                .collect(),
        }
    }

    /// Lookup with lazy expiry.
    fn read(&mut self, user: ModelUser) -> Option<ModelSession> {
        let identity = identity(user);
        let expired = self.sessions.get(&identity).is_some_and(|s| s.expires_at_ms < self.now_ms);
        if expired {
            self.sessions.remove(&identity);
        }
        self.sessions.get(&identity).cloned()
    }

    fn apply_generate(&mut self, user: ModelUser, start_id: u32, count: u32) -> OperationResult {
        if count == 0 || count > self.max_batch_size {
            return OperationResult::Error(OperationError::InvalidBatch);
        }

        let retired = self.consumed.get(&identity(user)).cloned().unwrap_or_default();
        let keys = self.prekeys.entry(identity(user)).or_default();
        let (mut issued, mut failed) = (Vec::new(), Vec::new());
        for key_id in start_id..start_id + count {
            if !retired.contains(&key_id) && keys.insert(key_id) {
                issued.push(key_id);
            } else {
                failed.push(key_id);
            }
        }
        OperationResult::Issued { issued, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_expires_lazily() {
        let mut world = ModelWorld::new(0, 1000, 10);
        world.apply(&Operation::CreateSession { user: 0, variant: 0, named: false });
        world.apply(&Operation::AdvanceTime { millis: 1500 });

        // Still stored until someone reads it.
        assert_eq!(world.observable_state().sessions.len(), 1);
        assert_eq!(world.apply(&Operation::GetSession { user: 0 }), OperationResult::Session(None));
        assert!(world.observable_state().sessions.is_empty());
    }

    #[test]
    fn model_consumes_once() {
        let mut world = ModelWorld::new(0, 1000, 10);
        world.apply(&Operation::GenerateBatch { user: 1, start_id: 10, count: 3 });

        assert_eq!(
            world.apply(&Operation::ConsumePrekey { user: 1, key_id: 11 }),
            OperationResult::Consumed(11)
        );
        assert_eq!(
            world.apply(&Operation::ConsumePrekey { user: 1, key_id: 11 }),
            OperationResult::Error(OperationError::NotFound)
        );
        assert_eq!(
            world.apply(&Operation::ExportPrekeys { user: 1 }),
            OperationResult::Prekeys(vec![10, 12])
        );

        // Consumed ids are retired for good.
        assert_eq!(
            world.apply(&Operation::GenerateBatch { user: 1, start_id: 11, count: 1 }),
            OperationResult::Issued { issued: vec![], failed: vec![11] }
        );
    }
}
