//! Tests for DurableListStore
//!
//! These tests verify:
//! - Append/read/trim/delete per key
//! - Key lifecycle and id assignment
//! - Crash recovery from the WAL, including rebuilt payloads
//! - Whole-history replacement is all or nothing
//! - Snapshot compaction and reopen
//! - Storage growth, StoreFull and RegionTooLarge
//! - Read-only inspection of a store directory
//! - Metrics emitted along the way

use std::fs;
use std::path::Path;
use std::sync::Arc;

use caravan::config::{Config, WalSyncStrategy};
use caravan::engine::{DurableListStore, Entry, KeyState};
use caravan::error::CaravanError;
use caravan::keymap::Key;
use caravan::metrics::MetricsRegistry;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .storage_file_size(4096)
        .max_storage_files(1)
        .snapshot_every_records(0)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite) // Sync every write for test reliability
        .build()
}

fn open(config: Config) -> (DurableListStore, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new());
    let store = DurableListStore::open(config, metrics.clone()).unwrap();
    (store, metrics)
}

fn setup_temp_store() -> (TempDir, DurableListStore, Arc<MetricsRegistry>) {
    let temp_dir = TempDir::new().unwrap();
    let (store, metrics) = open(test_config(temp_dir.path()));
    (temp_dir, store, metrics)
}

fn payloads(store: &DurableListStore, key: &Key) -> Vec<Vec<u8>> {
    store
        .read(key, ..)
        .unwrap()
        .into_iter()
        .map(|entry| entry.payload.to_vec())
        .collect()
}

fn seqs(store: &DurableListStore, key: &Key) -> Vec<i32> {
    store.read(key, ..).unwrap().into_iter().map(|e| e.seq).collect()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_open_creates_files() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("store");

    let (_store, _) = open(test_config(&data_dir));

    assert!(DurableListStore::wal_path(&data_dir).exists());
    let data_file = DurableListStore::data_path(&data_dir, 0);
    assert_eq!(fs::metadata(data_file).unwrap().len(), 4096);
}

#[test]
fn test_append_then_read() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("docs", "a");

    let first = store.append(&key, b"one", 1, 0).unwrap();
    let second = store.append(&key, b"two", 2, 512).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.region.position, 3);
    let entries = store.read(&key, ..).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].payload.as_ref(), b"one");
    assert_eq!(entries[1].asset_bytes, 512);
}

#[test]
fn test_read_by_sequence_range() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("docs", "a");
    for seq in 1..=5 {
        store.append(&key, format!("v{}", seq).as_bytes(), seq, 0).unwrap();
    }

    let middle: Vec<i32> = store.read(&key, 2..=4).unwrap().iter().map(|e| e.seq).collect();
    let tail: Vec<i32> = store.read(&key, 4..).unwrap().iter().map(|e| e.seq).collect();

    assert_eq!(middle, vec![2, 3, 4]);
    assert_eq!(tail, vec![4, 5]);
    assert!(store.read(&key, 10..).unwrap().is_empty());
}

#[test]
fn test_read_unknown_key_is_empty() {
    let (_temp, store, _) = setup_temp_store();

    assert!(store.read(&Key::new("docs", "missing"), ..).unwrap().is_empty());
}

#[test]
fn test_keys_are_independent() {
    let (_temp, mut store, _) = setup_temp_store();
    let a = Key::new("docs", "a");
    let b = Key::new("docs", "b");
    let other_space = Key::new("other", "a");

    store.append(&a, b"a1", 1, 0).unwrap();
    store.append(&b, b"b1", 1, 0).unwrap();
    store.append(&other_space, b"o1", 1, 0).unwrap();

    assert_eq!(payloads(&store, &a), vec![b"a1".to_vec()]);
    assert_eq!(payloads(&store, &other_space), vec![b"o1".to_vec()]);
    assert_eq!(store.stats().keys, 3);
}

#[test]
fn test_empty_payload() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("docs", "empty");

    store.append(&key, b"", 1, 0).unwrap();

    let entries = store.read(&key, ..).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].payload.is_empty());
}

// =============================================================================
// Key Lifecycle Tests
// =============================================================================

#[test]
fn test_key_state_transitions() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("docs", "a");

    assert_eq!(store.key_state(&key), KeyState::Unknown);
    let id = store.map_key(&key).unwrap();
    assert_eq!(store.key_state(&key), KeyState::Mapped);
    assert_eq!(store.map_key(&key).unwrap(), id);

    store.append(&key, b"x", 1, 0).unwrap();
    assert_eq!(store.key_state(&key), KeyState::HasData);

    assert!(store.delete(&key).unwrap());
    assert_eq!(store.key_state(&key), KeyState::Unknown);
}

#[test]
fn test_deleted_key_gets_new_id() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("space", "key");

    let first = store.append(&key, b"x", 1, 0).unwrap().id;
    store.delete(&key).unwrap();
    let second = store.append(&key, b"y", 1, 0).unwrap().id;

    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(payloads(&store, &key), vec![b"y".to_vec()]);
}

#[test]
fn test_delete_unknown_key_returns_false() {
    let (_temp, mut store, _) = setup_temp_store();

    assert!(!store.delete(&Key::new("docs", "nope")).unwrap());
}

#[test]
fn test_delete_returns_space() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("docs", "a");
    store.append(&key, &[7u8; 100], 1, 0).unwrap();
    store.append(&key, &[8u8; 100], 2, 0).unwrap();

    store.delete(&key).unwrap();

    let stats = store.stats();
    assert_eq!(stats.heap_available, stats.heap_max);
    assert_eq!(stats.referenced_bytes, 0);
}

// =============================================================================
// Trim Tests
// =============================================================================

#[test]
fn test_trim_keeps_newest() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("docs", "a");
    for seq in 1..=4 {
        store.append(&key, &[seq as u8; 10], seq, 0).unwrap();
    }

    assert_eq!(store.trim(&key, 2), 2);

    assert_eq!(seqs(&store, &key), vec![3, 4]);
    assert_eq!(store.stats().heap_available, 4096 - 20);
    assert_eq!(store.trim(&key, 2), 0);
    assert_eq!(store.trim(&Key::new("docs", "none"), 0), 0);
}

#[test]
fn test_trim_to_zero_keeps_mapping() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("docs", "a");
    store.append(&key, b"x", 1, 0).unwrap();

    store.trim(&key, 0);

    assert_eq!(store.key_state(&key), KeyState::Mapped);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_reopen_after_close() {
    let temp_dir = TempDir::new().unwrap();
    let key = Key::new("docs", "a");
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&key, b"alpha", 1, 0).unwrap();
        store.append(&key, b"beta", 2, 0).unwrap();
        store.close().unwrap();
    }

    let (store, _) = open(test_config(temp_dir.path()));

    assert_eq!(payloads(&store, &key), vec![b"alpha".to_vec(), b"beta".to_vec()]);
    assert_eq!(store.stats().records_since_snapshot, 3);
}

#[test]
fn test_payloads_rebuilt_from_wal() {
    let temp_dir = TempDir::new().unwrap();
    let key = Key::new("docs", "a");
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&key, b"survives", 1, 0).unwrap();
        // Dropped without close: simulated crash
    }

    // Lose the data file contents entirely
    let data_file = DurableListStore::data_path(temp_dir.path(), 0);
    fs::write(&data_file, vec![0u8; 4096]).unwrap();

    let (store, _) = open(test_config(temp_dir.path()));
    assert_eq!(payloads(&store, &key), vec![b"survives".to_vec()]);
}

#[test]
fn test_torn_wal_tail_is_ignored_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let key = Key::new("docs", "a");
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&key, b"kept", 1, 0).unwrap();
    }
    let wal = DurableListStore::wal_path(temp_dir.path());
    let mut bytes = fs::read(&wal).unwrap();
    bytes.extend_from_slice(&[caravan::wal::APPEND_TAG, 1, 0]);
    fs::write(&wal, &bytes).unwrap();

    let (mut store, _) = open(test_config(temp_dir.path()));

    assert_eq!(payloads(&store, &key), vec![b"kept".to_vec()]);
    store.append(&key, b"next", 2, 0).unwrap();
    drop(store);
    let (store, _) = open(test_config(temp_dir.path()));
    assert_eq!(seqs(&store, &key), vec![1, 2]);
}

#[test]
fn test_corrupt_wal_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&Key::new("docs", "a"), b"x", 1, 0).unwrap();
        store.append(&Key::new("docs", "a"), b"y", 2, 0).unwrap();
    }
    let wal = DurableListStore::wal_path(temp_dir.path());
    let mut bytes = fs::read(&wal).unwrap();
    bytes[0] = 0xEE;
    fs::write(&wal, &bytes).unwrap();

    let result = DurableListStore::open(test_config(temp_dir.path()), Arc::new(MetricsRegistry::new()));

    assert!(matches!(result, Err(CaravanError::WalCorruption { .. })));
}

#[test]
fn test_forgotten_trim_is_superset_after_crash() {
    let temp_dir = TempDir::new().unwrap();
    let key = Key::new("docs", "a");
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        for seq in 1..=3 {
            store.append(&key, &[seq as u8; 10], seq, 0).unwrap();
        }
        store.trim(&key, 1);
        assert_eq!(seqs(&store, &key), vec![3]);
    }

    let (store, _) = open(test_config(temp_dir.path()));

    assert_eq!(seqs(&store, &key), vec![1, 2, 3]);
}

#[test]
fn test_trimmed_space_reused_before_crash() {
    let temp_dir = TempDir::new().unwrap();
    let key = Key::new("docs", "a");
    let before;
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&key, b"0123456789", 1, 0).unwrap();
        store.append(&key, b"abcdefghij", 2, 0).unwrap();
        store.trim(&key, 1);
        let reused = store.append(&key, b"ABCDEFGHIJ", 3, 0).unwrap();
        assert_eq!(reused.region.position, 0);
        before = payloads(&store, &key);
    }

    let (store, _) = open(test_config(temp_dir.path()));

    assert_eq!(payloads(&store, &key), before);
    assert_eq!(seqs(&store, &key), vec![2, 3]);
    let stats = store.stats();
    assert_eq!(stats.wasted_bytes(), 0);
}

#[test]
fn test_reuse_of_newer_trimmed_entry_drops_older_ones_on_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let a = Key::new("docs", "a");
    let b = Key::new("docs", "b");
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&a, &[1; 20], 1, 0).unwrap();
        store.append(&b, &[2; 5], 1, 0).unwrap();
        store.append(&a, &[3; 10], 2, 0).unwrap();
        store.append(&a, &[4; 10], 3, 0).unwrap();
        store.trim(&a, 1);
        // Best fit picks the hole left by seq 2, not the one left by seq 1
        let reused = store.append(&b, &[5; 10], 2, 0).unwrap();
        assert_eq!(reused.region.position, 25);
        assert_eq!(seqs(&store, &a), vec![3]);
    }

    let (store, _) = open(test_config(temp_dir.path()));

    assert_eq!(seqs(&store, &a), vec![3]);
    assert_eq!(payloads(&store, &b), vec![vec![2; 5], vec![5; 10]]);
}

#[test]
fn test_non_blocking_flush_syncs_wal() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.wal_sync_strategy = WalSyncStrategy::EveryNEntries { count: 100 };
    let (mut store, _) = open(config);
    store.append(&Key::new("docs", "a"), b"x", 1, 0).unwrap();
    assert_eq!(store.unsynced_records(), 2);

    store.flush(false).unwrap();

    assert_eq!(store.unsynced_records(), 0);
}

// =============================================================================
// Replace Tests
// =============================================================================

fn entries(payload_size: usize, seqs: std::ops::RangeInclusive<i32>) -> Vec<Entry> {
    seqs.map(|seq| Entry {
        seq,
        asset_bytes: i64::from(seq) * 10,
        payload: vec![seq as u8; payload_size].into(),
    })
    .collect()
}

#[test]
fn test_replace_swaps_history_under_new_id() {
    let temp_dir = TempDir::new().unwrap();
    let key = Key::new("docs", "a");
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&key, b"old", 7, 0).unwrap();
        let old_id = store.id_of(&key).unwrap();

        let stored = store.replace(&key, &entries(8, 1..=2)).unwrap();

        assert_eq!(stored, 2);
        assert!(store.id_of(&key).unwrap() > old_id);
        assert_eq!(store.read(&key, ..).unwrap(), entries(8, 1..=2));
        assert_eq!(store.stats().referenced_bytes, 16);
    }

    let (store, _) = open(test_config(temp_dir.path()));
    assert_eq!(store.read(&key, ..).unwrap(), entries(8, 1..=2));
}

#[test]
fn test_replace_with_no_entries_deletes() {
    let (_temp, mut store, _) = setup_temp_store();
    let key = Key::new("docs", "a");
    store.append(&key, b"x", 1, 0).unwrap();

    assert_eq!(store.replace(&key, &[]).unwrap(), 0);
    assert_eq!(store.key_state(&key), KeyState::Unknown);
}

#[test]
fn test_replace_that_does_not_fit_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let a = Key::new("docs", "a");
    let c = Key::new("docs", "c");
    let before;
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        for seq in 1..=3 {
            store.append(&a, &[seq as u8; 1000], seq, 0).unwrap();
        }
        store.trim(&a, 1);
        store.append(&c, &[9; 2000], 1, 0).unwrap();
        let id = store.id_of(&a);
        before = store.stats();

        let result = store.replace(&a, &entries(1000, 1..=3));

        assert!(matches!(result, Err(CaravanError::StoreFull { .. })));
        assert_eq!(seqs(&store, &a), vec![3]);
        assert_eq!(payloads(&store, &a), vec![vec![3; 1000]]);
        assert_eq!(store.id_of(&a), id);
        assert_eq!(store.stats(), before);

        // Still usable afterwards
        store.append(&a, &[4; 10], 4, 0).unwrap();
    }

    let (store, _) = open(test_config(temp_dir.path()));
    assert_eq!(seqs(&store, &a), vec![3, 4]);
    assert_eq!(payloads(&store, &c), vec![vec![9; 2000]]);
}

#[test]
fn test_replace_rejects_oversized_entry_before_touching_state() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.max_region_size = Some(16);
    let (mut store, _) = open(config);
    let key = Key::new("docs", "a");
    store.append(&key, b"keep", 1, 0).unwrap();

    let result = store.replace(&key, &entries(32, 1..=1));

    assert!(matches!(result, Err(CaravanError::RegionTooLarge { .. })));
    assert_eq!(payloads(&store, &key), vec![b"keep".to_vec()]);
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_snapshot_compacts_wal() {
    let (temp_dir, mut store, metrics) = setup_temp_store();
    let key = Key::new("docs", "a");
    for seq in 1..=20 {
        store.append(&key, &[1u8; 64], seq, 0).unwrap();
    }
    let before = store.stats().wal_bytes;

    store.snapshot_and_compact().unwrap();

    let after = store.stats().wal_bytes;
    assert!(after < before, "wal went from {} to {}", before, after);
    assert_eq!(store.stats().records_since_snapshot, 0);
    assert_eq!(metrics.counter("caravan.snapshots"), 1);
    assert_eq!(
        fs::metadata(DurableListStore::wal_path(temp_dir.path())).unwrap().len(),
        after
    );
}

#[test]
fn test_reopen_after_compaction() {
    let temp_dir = TempDir::new().unwrap();
    let a = Key::new("docs", "a");
    let b = Key::new("docs", "b");
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&a, b"a1", 1, 0).unwrap();
        store.append(&b, b"b1", 1, 0).unwrap();
        store.trim(&a, 0);
        store.snapshot_and_compact().unwrap();
        store.append(&a, b"a2", 2, 0).unwrap();
        store.append(&b, b"b2", 2, 0).unwrap();
        store.close().unwrap();
    }

    let (mut store, _) = open(test_config(temp_dir.path()));

    // The trim was captured by the snapshot
    assert_eq!(payloads(&store, &a), vec![b"a2".to_vec()]);
    assert_eq!(payloads(&store, &b), vec![b"b1".to_vec(), b"b2".to_vec()]);
    assert_eq!(store.stats().records_since_snapshot, 2);
    // The id generator survived too
    let c = store.append(&Key::new("docs", "c"), b"c1", 1, 0).unwrap();
    assert_eq!(c.id, 3);
}

#[test]
fn test_automatic_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .storage_file_size(4096)
        .max_storage_files(1)
        .snapshot_every_records(5)
        .build();
    let (mut store, metrics) = open(config.clone());
    let key = Key::new("docs", "a");

    for seq in 1..=10 {
        store.append(&key, b"entry", seq, 0).unwrap();
    }

    assert!(metrics.counter("caravan.snapshots") >= 1);
    assert!(store.stats().records_since_snapshot < 5);
    store.close().unwrap();

    let (store, _) = open(config);
    assert_eq!(seqs(&store, &key), (1..=10).collect::<Vec<_>>());
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_store_full_without_growth() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .storage_file_size(64)
        .max_storage_files(1)
        .snapshot_every_records(0)
        .build();
    let (mut store, metrics) = open(config);
    let key = Key::new("docs", "a");
    store.append(&key, &[1u8; 60], 1, 0).unwrap();
    let before = store.stats();

    let err = store.append(&Key::new("docs", "b"), &[2u8; 10], 1, 0).unwrap_err();

    assert!(matches!(err, CaravanError::StoreFull { requested: 10 }));
    assert_eq!(metrics.counter("caravan.store_full"), 1);
    // Nothing half-done is left behind
    assert_eq!(store.key_state(&Key::new("docs", "b")), KeyState::Unknown);
    assert_eq!(store.stats().heap_available, before.heap_available);
    assert_eq!(store.stats().keys, 1);
}

#[test]
fn test_growth_adds_data_files() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .storage_file_size(64)
        .max_storage_files(3)
        .snapshot_every_records(0)
        .build();
    let key = Key::new("docs", "a");
    {
        let (mut store, _) = open(config.clone());
        for seq in 1..=3 {
            let appended = store.append(&key, &[seq as u8; 60], seq, 0).unwrap();
            assert_eq!(appended.region.position, 64 * (seq as u64 - 1));
        }
        assert_eq!(store.stats().storage_files, 3);
        assert!(DurableListStore::data_path(temp_dir.path(), 2).exists());

        let err = store.append(&key, &[9u8; 60], 4, 0).unwrap_err();
        assert!(matches!(err, CaravanError::StoreFull { .. }));
        store.close().unwrap();
    }

    let (store, _) = open(config);
    assert_eq!(store.stats().storage_files, 3);
    assert_eq!(
        payloads(&store, &key),
        vec![vec![1u8; 60], vec![2u8; 60], vec![3u8; 60]]
    );
}

#[test]
fn test_payload_larger_than_file_does_not_grow() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .storage_file_size(64)
        .max_storage_files(4)
        .build();
    let (mut store, _) = open(config);

    let err = store.append(&Key::new("docs", "a"), &[0u8; 100], 1, 0).unwrap_err();

    assert!(matches!(err, CaravanError::StoreFull { requested: 100 }));
    assert_eq!(store.stats().storage_files, 1);
}

#[test]
fn test_region_too_large() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .storage_file_size(4096)
        .max_storage_files(1)
        .max_region_size(16)
        .build();
    let (mut store, _) = open(config);
    let key = Key::new("docs", "a");

    let err = store.append(&key, &[0u8; 17], 1, 0).unwrap_err();

    assert!(matches!(
        err,
        CaravanError::RegionTooLarge {
            requested: 17,
            limit: 16
        }
    ));
    assert_eq!(store.key_state(&key), KeyState::Unknown);
    assert!(store.append(&key, &[0u8; 16], 1, 0).is_ok());
}

#[test]
fn test_missing_data_file_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .storage_file_size(64)
        .max_storage_files(4)
        .build();
    fs::write(DurableListStore::data_path(temp_dir.path(), 0), vec![0u8; 64]).unwrap();
    fs::write(DurableListStore::data_path(temp_dir.path(), 2), vec![0u8; 64]).unwrap();

    let result = DurableListStore::open(config, Arc::new(MetricsRegistry::new()));

    assert!(matches!(result, Err(CaravanError::Storage(_))));
}

#[test]
fn test_oversized_capacity_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .storage_file_size(1 << 30)
        .max_storage_files(2)
        .build();

    let result = DurableListStore::open(config, Arc::new(MetricsRegistry::new()));

    assert!(matches!(result, Err(CaravanError::Config(_))));
}

// =============================================================================
// Inspection Tests
// =============================================================================

#[test]
fn test_inspect_leaves_files_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let key = Key::new("docs", "a");
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&key, b"alpha", 1, 0).unwrap();
        store.append(&key, b"beta", 2, 0).unwrap();
    }
    let wal = DurableListStore::wal_path(temp_dir.path());
    let mut bytes = fs::read(&wal).unwrap();
    let valid_len = bytes.len() as u64;
    bytes.extend_from_slice(&[caravan::wal::APPEND_TAG, 1]);
    fs::write(&wal, &bytes).unwrap();
    let data = fs::read(DurableListStore::data_path(temp_dir.path(), 0)).unwrap();

    let metrics = MetricsRegistry::new();
    let stats = DurableListStore::inspect(&test_config(temp_dir.path()), &metrics).unwrap();

    assert_eq!(stats.keys, 1);
    assert_eq!(stats.regions, 2);
    assert_eq!(stats.referenced_bytes, 9);
    assert_eq!(stats.wal_bytes, valid_len);
    assert_eq!(stats.records_since_snapshot, 3);
    assert!(metrics.gauge_value("caravan.heap.max").is_some());
    // Torn tail and data file are left exactly as found
    assert_eq!(fs::read(&wal).unwrap(), bytes);
    assert_eq!(fs::read(DurableListStore::data_path(temp_dir.path(), 0)).unwrap(), data);
}

#[test]
fn test_inspect_rejects_mismatched_file_size() {
    let temp_dir = TempDir::new().unwrap();
    {
        let (mut store, _) = open(test_config(temp_dir.path()));
        store.append(&Key::new("docs", "a"), b"x", 1, 0).unwrap();
    }
    let mut config = test_config(temp_dir.path());
    config.storage_file_size = 8192;

    let result = DurableListStore::inspect(&config, &MetricsRegistry::new());

    assert!(matches!(result, Err(CaravanError::Config(_))));
    let data_file = DurableListStore::data_path(temp_dir.path(), 0);
    assert_eq!(fs::metadata(data_file).unwrap().len(), 4096);
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn test_sequence_skips_are_counted() {
    let (_temp, mut store, metrics) = setup_temp_store();
    let key = Key::new("docs", "a");

    store.append(&key, b"1", 1, 0).unwrap();
    store.append(&key, b"2", 2, 0).unwrap();
    store.append(&key, b"5", 5, 0).unwrap();

    assert_eq!(metrics.counter("caravan.sequence_skips"), 1);
}

#[test]
fn test_report_tracks_wasted_space() {
    let (_temp, mut store, metrics) = setup_temp_store();
    let key = Key::new("docs", "a");
    store.append(&key, &[0u8; 100], 1, 0).unwrap();
    store.append(&key, &[0u8; 50], 2, 0).unwrap();

    store.report();

    assert_eq!(metrics.gauge_value("caravan.wasted_space"), Some(0));
    assert_eq!(metrics.gauge_value("caravan.heap.available"), Some(4096 - 150));
    assert_eq!(metrics.gauge_value("caravan.index.ids"), Some(1));
    assert_eq!(metrics.counter("caravan.data_loss"), 0);
}
