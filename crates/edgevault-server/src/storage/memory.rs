#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use edgevault_core::{KeyId, PrekeyPair, PublicPrekey, SessionRecord};

use super::{Storage, StorageError};

/// In-memory storage implementation for testing and single-process use.
///
/// All state sits behind one `Arc<Mutex<_>>`, so clones share it. The lock is
/// held only for the duration of one map operation and never across an await,
/// so identities contend only for that instant. Prekeys per identity live in a
/// `BTreeMap`, which keeps listings ascending by id. Taken ids are kept in a
/// per-identity set and never accepted again.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    /// Session record per identity
    sessions: HashMap<String, SessionRecord>,

    /// Live prekeys per identity, keyed by id
    prekeys: HashMap<String, BTreeMap<KeyId, PrekeyPair>>,

    /// Consumed ids per identity
    consumed: HashMap<String, BTreeSet<KeyId>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStorageInner {
                sessions: HashMap::new(),
                prekeys: HashMap::new(),
                consumed: HashMap::new(),
            })),
        }
    }

    /// Number of stored session records, expired ones included.
    pub fn session_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.sessions.len())
    }

    /// Number of live prekeys across all identities.
    pub fn prekey_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.prekeys.values().map(BTreeMap::len).sum())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("memory storage lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn store_session(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.sessions.insert(record.identity.clone(), record.clone());
        Ok(())
    }

    fn load_session(&self, identity: &str) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.lock()?.sessions.get(identity).cloned())
    }

    fn delete_session(&self, identity: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.sessions.remove(identity).is_some())
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        Ok(self.lock()?.sessions.values().cloned().collect())
    }

    fn store_prekey(&self, identity: &str, pair: &PrekeyPair) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let inner = &mut *inner;

        let consumed = inner.consumed.get(identity).is_some_and(|ids| ids.contains(&pair.key_id));
        let keys = inner.prekeys.entry(identity.to_string()).or_default();
        if consumed || keys.contains_key(&pair.key_id) {
            return Err(StorageError::Conflict {
                identity: identity.to_string(),
                key_id: pair.key_id,
            });
        }

        keys.insert(pair.key_id, pair.clone());
        Ok(())
    }

    fn take_prekey(
        &self,
        identity: &str,
        key_id: KeyId,
    ) -> Result<Option<PrekeyPair>, StorageError> {
        let mut inner = self.lock()?;

        let Some(keys) = inner.prekeys.get_mut(identity) else {
            return Ok(None);
        };
        let taken = keys.remove(&key_id);

        if keys.is_empty() {
            inner.prekeys.remove(identity);
        }
        if taken.is_some() {
            inner.consumed.entry(identity.to_string()).or_default().insert(key_id);
        }

        Ok(taken)
    }

    fn list_prekeys(&self, identity: &str) -> Result<Vec<PublicPrekey>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .prekeys
            .get(identity)
            .map(|keys| keys.values().map(PrekeyPair::public).collect())
            .unwrap_or_default())
    }
}
