//! Fuzz target for prekey storage
//!
//! Applies arbitrary store/take/list sequences to `MemoryStorage` and checks
//! them against a set of live ids.
//!
//! # Invariants
//!
//! - A take returns a key only if its id is live, and only once
//! - A store conflicts exactly when the id is live or was ever taken
//! - Listing is ascending and matches the live set
//! - Returned pairs are the pairs that were stored

#![no_main]

use std::collections::{BTreeMap, BTreeSet};

use arbitrary::Arbitrary;
use edgevault_core::{PrekeyPair, PrivateKey};
use edgevault_server::{MemoryStorage, Storage, StorageError};
use libfuzzer_sys::fuzz_target;

const IDENTITIES: [&str; 3] = ["alice", "bob", "carol"];

#[derive(Debug, Arbitrary)]
enum Op {
    Store { who: u8, key_id: u8, secret: [u8; 32] },
    Take { who: u8, key_id: u8 },
    List { who: u8 },
}

fn pair(key_id: u32, secret: [u8; 32]) -> PrekeyPair {
    let private_key = PrivateKey::from_bytes(secret);
    PrekeyPair { key_id, public_key: private_key.public_key(), private_key }
}

fuzz_target!(|ops: Vec<Op>| {
    let storage = MemoryStorage::new();
    let mut live: BTreeMap<(usize, u32), PrekeyPair> = BTreeMap::new();
    let mut retired: BTreeSet<(usize, u32)> = BTreeSet::new();

    for op in ops {
        match op {
            Op::Store { who, key_id, secret } => {
                let who = usize::from(who) % IDENTITIES.len();
                let key_id = u32::from(key_id % 16);
                let pair = pair(key_id, secret);

                match storage.store_prekey(IDENTITIES[who], &pair) {
                    Ok(()) => {
                        assert!(!retired.contains(&(who, key_id)));
                        assert!(live.insert((who, key_id), pair).is_none());
                    },
                    Err(StorageError::Conflict { .. }) => {
                        assert!(
                            live.contains_key(&(who, key_id)) || retired.contains(&(who, key_id))
                        );
                    },
                    Err(e) => panic!("memory storage failed: {e}"),
                }
            },
            Op::Take { who, key_id } => {
                let who = usize::from(who) % IDENTITIES.len();
                let key_id = u32::from(key_id % 16);

                let taken = storage.take_prekey(IDENTITIES[who], key_id).expect("take failed");
                let expected = live.remove(&(who, key_id));
                if expected.is_some() {
                    retired.insert((who, key_id));
                }
                assert_eq!(taken, expected);
            },
            Op::List { who } => {
                let who = usize::from(who) % IDENTITIES.len();
                let listed: Vec<u32> = storage
                    .list_prekeys(IDENTITIES[who])
                    .expect("list failed")
                    .iter()
                    .map(|p| p.key_id)
                    .collect();
                let expected: Vec<u32> =
                    live.keys().filter(|(w, _)| *w == who).map(|(_, id)| *id).collect();
                assert_eq!(listed, expected);
            },
        }
    }
});
