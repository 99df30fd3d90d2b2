//! Tests for LimitHeap and SequenceHeap
//!
//! These tests verify:
//! - Size limits reject oversized requests only
//! - Sequences translate offsets transparently
//! - A sequence heap and a sequence storage agree on the address space
//! - Snapshots of sequences survive growth

use caravan::codec::Decoder;
use caravan::heap::{FreeListHeap, Heap, LimitHeap, SequenceHeap};
use caravan::region::Region;
use caravan::storage::{MemoryStorage, SequenceStorage, Storage};

// =============================================================================
// Helper Functions
// =============================================================================

fn sequence_of(sizes: &[u64]) -> SequenceHeap {
    SequenceHeap::new(
        sizes
            .iter()
            .map(|&size| Box::new(FreeListHeap::new(size)) as Box<dyn Heap>)
            .collect(),
    )
}

// =============================================================================
// LimitHeap Tests
// =============================================================================

#[test]
fn test_limit_rejects_oversized_ask() {
    let mut heap = LimitHeap::new(Box::new(FreeListHeap::new(1024)), 128);

    assert!(heap.ask(129).is_none());
    assert_eq!(heap.ask(128).unwrap(), Region::new(0, 128));
    assert_eq!(heap.size_limit(), 128);
}

#[test]
fn test_limit_delegates_bookkeeping() {
    let mut heap = LimitHeap::new(Box::new(FreeListHeap::new(1024)), 512);
    let region = heap.ask(100).unwrap();

    assert_eq!(heap.available(), 924);
    heap.free(region);
    assert_eq!(heap.available(), 1024);
    assert_eq!(heap.max(), 1024);
    assert!(heap.reserve(Region::new(600, 10)));
    assert_eq!(heap.free_runs().len(), 2);
}

// =============================================================================
// SequenceHeap Tests
// =============================================================================

#[test]
fn test_sequence_fills_first_child_first() {
    let mut heap = sequence_of(&[100, 100]);

    assert_eq!(heap.ask(60).unwrap(), Region::new(0, 60));
    // Does not fit in the 40 bytes left in child 0
    assert_eq!(heap.ask(60).unwrap(), Region::new(100, 60));
    assert_eq!(heap.ask(40).unwrap(), Region::new(60, 40));
    assert_eq!(heap.available(), 40);
    assert_eq!(heap.max(), 200);
}

#[test]
fn test_sequence_regions_never_straddle_children() {
    let mut heap = sequence_of(&[100, 100]);

    assert!(heap.ask(150).is_none());
}

#[test]
fn test_sequence_free_translates_back() {
    let mut heap = sequence_of(&[100, 100]);
    let _first = heap.ask(100).unwrap();
    let second = heap.ask(30).unwrap();
    assert_eq!(second, Region::new(100, 30));

    heap.free(second);

    assert_eq!(heap.free_runs(), vec![Region::new(100, 100)]);
}

#[test]
fn test_sequence_reserve_in_second_child() {
    let mut heap = sequence_of(&[100, 100]);

    assert!(heap.reserve(Region::new(150, 20)));
    assert!(!heap.reserve(Region::new(160, 5)));
    // Crossing the child boundary is never valid
    assert!(!heap.reserve(Region::new(90, 20)));
    assert!(!heap.reserve(Region::new(250, 1)));

    assert_eq!(
        heap.free_runs(),
        vec![Region::new(0, 100), Region::new(100, 50), Region::new(170, 30)]
    );
}

#[test]
fn test_sequence_push_extends_address_space() {
    let mut heap = sequence_of(&[100]);
    heap.ask(100).unwrap();
    assert!(heap.ask(1).is_none());

    heap.push(Box::new(FreeListHeap::new(50)));

    assert_eq!(heap.len(), 2);
    assert_eq!(heap.ask(10).unwrap(), Region::new(100, 10));
}

#[test]
fn test_sequence_snapshot_loads_into_grown_heap() {
    let mut heap = sequence_of(&[100, 100]);
    heap.ask(70).unwrap();
    heap.ask(50).unwrap();
    let mut buf = Vec::new();
    heap.snapshot(&mut buf);

    let mut grown = sequence_of(&[100, 100, 100]);
    grown.reserve(Region::new(250, 10));
    grown.load(&mut Decoder::new(&buf)).unwrap();

    let mut expected = heap.free_runs();
    expected.push(Region::new(200, 100));
    assert_eq!(grown.free_runs(), expected);
}

#[test]
fn test_sequence_snapshot_rejects_fewer_children() {
    let heap = sequence_of(&[100, 100]);
    let mut buf = Vec::new();
    heap.snapshot(&mut buf);

    let mut shrunk = sequence_of(&[100]);
    assert!(shrunk.load(&mut Decoder::new(&buf)).is_err());
}

// =============================================================================
// Heap + Storage Agreement Tests
// =============================================================================

#[test]
fn test_sequence_heap_and_storage_share_addresses() {
    let mut heap = sequence_of(&[64, 64]);
    let mut storage = SequenceStorage::new(vec![
        Box::new(MemoryStorage::new(64)) as Box<dyn Storage>,
        Box::new(MemoryStorage::new(64)),
    ]);

    let first = heap.ask(48).unwrap();
    let second = heap.ask(48).unwrap();
    assert_eq!(second.position, 64);

    storage.write(first, &[1u8; 48]).unwrap();
    storage.write(second, &[2u8; 48]).unwrap();

    assert_eq!(storage.read(first).unwrap().as_ref(), &[1u8; 48][..]);
    assert_eq!(storage.read(second).unwrap().as_ref(), &[2u8; 48][..]);
    assert_eq!(storage.size(), heap.max());
}
