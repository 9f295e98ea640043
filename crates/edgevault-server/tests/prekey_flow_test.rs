//! Prekey issuance, export and consumption through the manager.

use edgevault_core::{EdgeConfig, PrekeyPair};
use edgevault_harness::SimEnv;
use edgevault_server::{MemoryStorage, PrekeyError, PrekeyManager, Storage, StorageError};

fn manager(config: EdgeConfig) -> PrekeyManager<SimEnv, MemoryStorage> {
    PrekeyManager::new(SimEnv::with_seed(42), MemoryStorage::new(), config)
}

fn ids(manager: &PrekeyManager<SimEnv, MemoryStorage>, identity: &str) -> Vec<u32> {
    manager.export_public(identity).unwrap().iter().map(|p| p.key_id).collect()
}

#[test]
fn consume_once_then_not_found() {
    let manager = manager(EdgeConfig::default());

    let outcome = manager.generate_batch("U", 1000, 3).unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.issued.iter().map(|p| p.key_id).collect::<Vec<_>>(), vec![1000, 1001, 1002]);

    let pair = manager.consume("U", 1001).unwrap();
    assert_eq!(pair.key_id, 1001);
    assert!(pair.public_matches());

    let second = manager.consume("U", 1001);
    assert!(matches!(second, Err(PrekeyError::NotFound { key_id: 1001 })));

    assert_eq!(ids(&manager, "U"), vec![1000, 1002]);
}

#[test]
fn consumed_pair_matches_issued_public_half() {
    let manager = manager(EdgeConfig::default());

    let outcome = manager.generate_batch("U", 7, 2).unwrap();
    let issued = outcome.issued.iter().find(|p| p.key_id == 8).unwrap().clone();

    let pair = manager.consume("U", 8).unwrap();
    assert_eq!(pair.public_key, issued.public_key);
}

#[test]
fn consumed_pair_survives_base64_transport() {
    let manager = manager(EdgeConfig::default());
    manager.generate_batch("U", 1, 1).unwrap();

    let pair = manager.consume("U", 1).unwrap();
    let rebuilt =
        PrekeyPair::from_wire(pair.key_id, &pair.public_key_base64(), &pair.private_key_base64())
            .unwrap();

    assert_eq!(rebuilt.public_key, pair.public_key);
    assert_eq!(rebuilt.private_key.as_bytes(), pair.private_key.as_bytes());
    assert!(rebuilt.public_matches());
}

#[test]
fn export_never_exposes_private_material() {
    let manager = manager(EdgeConfig::default());
    manager.generate_batch("U", 1, 4).unwrap();

    let exported = manager.export_public("U").unwrap();
    let stored: Vec<PrekeyPair> =
        (1..=4).map(|id| manager.consume("U", id).unwrap()).collect();

    for (public, pair) in exported.iter().zip(&stored) {
        assert_eq!(public.public_key, pair.public_key);
        assert_ne!(&public.public_key, pair.private_key.as_bytes());
    }
}

#[test]
fn default_batch_uses_configured_range() {
    let config =
        EdgeConfig { default_start_id: 500, default_batch_size: 5, ..EdgeConfig::default() };
    let manager = manager(config);

    manager.generate_default_batch("U").unwrap();
    assert_eq!(ids(&manager, "U"), vec![500, 501, 502, 503, 504]);
}

#[test]
fn live_ids_are_not_overwritten() {
    let manager = manager(EdgeConfig::default());

    let first = manager.generate_batch("U", 1, 3).unwrap();
    let second = manager.generate_batch("U", 2, 3).unwrap();

    assert_eq!(second.issued.iter().map(|p| p.key_id).collect::<Vec<_>>(), vec![4]);
    assert_eq!(second.retry_ids(), vec![2, 3]);
    assert!(second.failed.iter().all(|f| matches!(f.error, StorageError::Conflict { .. })));

    // Original key material is intact.
    let pair = manager.consume("U", 2).unwrap();
    let original = first.issued.iter().find(|p| p.key_id == 2).unwrap();
    assert_eq!(pair.public_key, original.public_key);
}

#[test]
fn consumed_id_cannot_be_reissued() {
    let manager = manager(EdgeConfig::default());

    manager.generate_batch("U", 1001, 1).unwrap();
    let first = manager.consume("U", 1001).unwrap();

    let reissue = manager.generate_batch("U", 1000, 3).unwrap();
    assert_eq!(reissue.issued.iter().map(|p| p.key_id).collect::<Vec<_>>(), vec![1000, 1002]);
    assert_eq!(reissue.failed.len(), 1);
    assert_eq!(reissue.failed[0].key_id, 1001);
    assert!(matches!(reissue.failed[0].error, StorageError::Conflict { .. }));

    // A retried consume never hands out fresh material for the same id.
    assert!(matches!(manager.consume("U", 1001), Err(PrekeyError::NotFound { key_id: 1001 })));
    assert_eq!(ids(&manager, "U"), vec![1000, 1002]);
    assert!(first.public_matches());
}

#[test]
fn invalid_batches_are_rejected_whole() {
    let manager = manager(EdgeConfig { max_batch_size: 10, ..EdgeConfig::default() });

    assert!(matches!(manager.generate_batch("U", 1, 0), Err(PrekeyError::InvalidBatch(_))));
    assert!(matches!(manager.generate_batch("U", 1, 11), Err(PrekeyError::InvalidBatch(_))));
    assert!(matches!(
        manager.generate_batch("U", u32::MAX, 2),
        Err(PrekeyError::InvalidBatch(_))
    ));
    assert!(matches!(manager.generate_batch("", 1, 1), Err(PrekeyError::InvalidIdentity(_))));

    assert_eq!(manager.storage().prekey_count().unwrap(), 0);
}

#[test]
fn batch_ending_at_max_id_is_accepted() {
    let manager = manager(EdgeConfig::default());

    let outcome = manager.generate_batch("U", u32::MAX - 1, 2).unwrap();
    assert_eq!(outcome.issued.len(), 2);
    assert!(manager.consume("U", u32::MAX).is_ok());
}

#[test]
fn identities_have_separate_key_spaces() {
    let manager = manager(EdgeConfig::default());

    manager.generate_batch("alice", 1, 2).unwrap();
    manager.generate_batch("bob", 1, 2).unwrap();

    manager.consume("alice", 1).unwrap();
    assert_eq!(ids(&manager, "alice"), vec![2]);
    assert_eq!(ids(&manager, "bob"), vec![1, 2]);
    assert!(manager.consume("bob", 1).is_ok());
}

#[test]
fn unknown_identity_is_empty_not_an_error() {
    let manager = manager(EdgeConfig::default());

    assert!(manager.export_public("nobody").unwrap().is_empty());
    assert!(matches!(manager.consume("nobody", 1), Err(PrekeyError::NotFound { .. })));
    assert!(manager.storage().list_prekeys("nobody").unwrap().is_empty());
}
