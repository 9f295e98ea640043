//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Sessions and live prekeys survive server restarts; a consumed prekey stays
//! consumed, and its id is never issued again.

use std::{fmt, path::Path, sync::Arc};

use edgevault_core::{KeyId, PrekeyPair, PublicPrekey, SessionRecord};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use super::{Storage, StorageError};

/// Table: sessions
/// Key: identity as UTF-8 bytes
/// Value: CBOR-encoded SessionRecord
const SESSIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sessions");

/// Table: prekeys
/// Key: [identity_len: 4 bytes BE][identity][key_id: 4 bytes BE]
/// Value: CBOR-encoded PrekeyPair
const PREKEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("prekeys");

/// Table: consumed
/// Key: same layout as PREKEYS
/// Value: unit; presence marks the id as taken
const CONSUMED: TableDefinition<&[u8], ()> = TableDefinition::new("consumed");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Write transactions are
/// serialized by Redb, which is what makes [`Storage::take_prekey`] a
/// compare-and-delete. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (SESSIONS, PREKEYS, CONSUMED).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(SESSIONS).map_err(io)?;
            let _ = txn.open_table(PREKEYS).map_err(io)?;
            let _ = txn.open_table(CONSUMED).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        tracing::debug!(path = %path.as_ref().display(), "opened redb storage");

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn store_session(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let bytes = encode_value(record)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(SESSIONS).map_err(io)?;
            table.insert(record.identity.as_bytes(), bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn load_session(&self, identity: &str) -> Result<Option<SessionRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(SESSIONS).map_err(io)?;

        match table.get(identity.as_bytes()).map_err(io)? {
            Some(value) => Ok(Some(decode_value(value.value())?)),
            None => Ok(None),
        }
    }

    fn delete_session(&self, identity: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let existed = {
            let mut table = txn.open_table(SESSIONS).map_err(io)?;
            table.remove(identity.as_bytes()).map_err(io)?.is_some()
        };
        txn.commit().map_err(io)?;

        Ok(existed)
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(SESSIONS).map_err(io)?;

        let mut records = Vec::new();
        for result in table.iter().map_err(io)? {
            let (_, value) = result.map_err(io)?;
            records.push(decode_value(value.value())?);
        }

        Ok(records)
    }

    fn store_prekey(&self, identity: &str, pair: &PrekeyPair) -> Result<(), StorageError> {
        let bytes = encode_value(pair)?;
        let key = encode_prekey_key(identity, pair.key_id);

        let txn = self.db.begin_write().map_err(io)?;
        {
            let consumed = txn.open_table(CONSUMED).map_err(io)?;
            let mut table = txn.open_table(PREKEYS).map_err(io)?;

            let taken_before = consumed.get(key.as_slice()).map_err(io)?.is_some();
            if taken_before || table.get(key.as_slice()).map_err(io)?.is_some() {
                return Err(StorageError::Conflict {
                    identity: identity.to_string(),
                    key_id: pair.key_id,
                });
            }

            table.insert(key.as_slice(), bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn take_prekey(
        &self,
        identity: &str,
        key_id: KeyId,
    ) -> Result<Option<PrekeyPair>, StorageError> {
        let key = encode_prekey_key(identity, key_id);

        // Remove, mark consumed and return inside one write transaction. If
        // decoding fails the transaction is dropped uncommitted and the row
        // stays.
        let txn = self.db.begin_write().map_err(io)?;
        let taken = {
            let mut table = txn.open_table(PREKEYS).map_err(io)?;
            let removed = table.remove(key.as_slice()).map_err(io)?;
            match removed {
                Some(value) => Some(decode_value::<PrekeyPair>(value.value())?),
                None => None,
            }
        };
        if taken.is_some() {
            let mut consumed = txn.open_table(CONSUMED).map_err(io)?;
            consumed.insert(key.as_slice(), ()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(taken)
    }

    fn list_prekeys(&self, identity: &str) -> Result<Vec<PublicPrekey>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(PREKEYS).map_err(io)?;

        let start_key = encode_prekey_key(identity, 0);
        let end_key = encode_prekey_key(identity, KeyId::MAX);

        let mut prekeys = Vec::new();
        for result in table.range(start_key.as_slice()..=end_key.as_slice()).map_err(io)? {
            let (_, value) = result.map_err(io)?;
            let pair: PrekeyPair = decode_value(value.value())?;
            prekeys.push(pair.public());
        }

        Ok(prekeys)
    }
}

fn io(e: impl fmt::Display) -> StorageError {
    StorageError::Io(e.to_string())
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encode (identity, key_id) as a prekey table key.
///
/// Layout: [identity_len: 4 bytes BE][identity][key_id: 4 bytes BE]
/// The length prefix keeps one identity's range from overlapping another's,
/// and the big-endian id makes lexicographic order match numeric order.
fn encode_prekey_key(identity: &str, key_id: KeyId) -> Vec<u8> {
    let identity = identity.as_bytes();
    let mut key = Vec::with_capacity(4 + identity.len() + 4);
    key.extend_from_slice(&(identity.len() as u32).to_be_bytes());
    key.extend_from_slice(identity);
    key.extend_from_slice(&key_id.to_be_bytes());
    key
}
