//! Exactly-once consumption under real thread contention.
//!
//! Many OS threads race to consume the same key id. Whatever the
//! interleaving, exactly one wins and every other caller sees `NotFound`.

use std::{
    sync::{Arc, Barrier},
    thread,
};

use edgevault_core::EdgeConfig;
use edgevault_harness::SimEnv;
use edgevault_server::{MemoryStorage, PrekeyError, PrekeyManager, RedbStorage, Storage};
use tempfile::tempdir;

const CONTENDERS: usize = 16;

fn race<S: Storage>(manager: PrekeyManager<SimEnv, S>, key_id: u32) -> (usize, usize) {
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.consume("bob", key_id)
            })
        })
        .collect();

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(pair) => {
                assert_eq!(pair.key_id, key_id);
                assert!(pair.public_matches());
                won += 1;
            },
            Err(PrekeyError::NotFound { .. }) => lost += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    (won, lost)
}

#[test]
fn memory_storage_single_winner() {
    for round in 0..20u32 {
        let env = SimEnv::with_seed(u64::from(round));
        let manager = PrekeyManager::new(env, MemoryStorage::new(), EdgeConfig::default());
        manager.generate_batch("bob", 1000, 3).unwrap();

        let (won, lost) = race(manager.clone(), 1001);
        assert_eq!(won, 1, "round {round}");
        assert_eq!(lost, CONTENDERS - 1);

        let left: Vec<u32> =
            manager.export_public("bob").unwrap().iter().map(|p| p.key_id).collect();
        assert_eq!(left, vec![1000, 1002]);
    }
}

#[test]
fn redb_storage_single_winner() {
    let dir = tempdir().unwrap();
    let storage = RedbStorage::open(dir.path().join("race.redb")).unwrap();
    let manager = PrekeyManager::new(SimEnv::with_seed(9), storage, EdgeConfig::default());

    for key_id in 0..5u32 {
        manager.generate_batch("bob", key_id, 1).unwrap();
        let (won, lost) = race(manager.clone(), key_id);
        assert_eq!(won, 1, "key {key_id}");
        assert_eq!(lost, CONTENDERS - 1);
    }

    assert!(manager.export_public("bob").unwrap().is_empty());
}

#[test]
fn distinct_ids_consumed_concurrently_all_succeed() {
    let manager =
        PrekeyManager::new(SimEnv::with_seed(3), MemoryStorage::new(), EdgeConfig::default());
    manager.generate_batch("bob", 0, 32).unwrap();

    let handles: Vec<_> = (0..32u32)
        .map(|key_id| {
            let manager = manager.clone();
            thread::spawn(move || manager.consume("bob", key_id))
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
    assert_eq!(manager.storage().prekey_count().unwrap(), 0);
}
