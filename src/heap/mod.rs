//! Heap Module
//!
//! Region allocators over a logical byte address space.
//!
//! ## Responsibilities
//! - Hand out disjoint regions (`ask`) and take them back (`free`)
//! - Mark explicit regions allocated during WAL replay (`reserve`)
//! - Persist and restore the free-list for snapshots
//!
//! ## Composition
//! ```text
//!   SequenceHeap ──┬── LimitHeap ── FreeListHeap   [0, max₁)
//!                  ├── LimitHeap ── FreeListHeap   [max₁, max₁+max₂)
//!                  └── ...
//! ```
//! `LimitHeap` caps request sizes, `SequenceHeap` chains heaps end to end so
//! capacity grows without touching existing data.
//!
//! ## Snapshot Format
//! Every value is a zigzag varint.
//! ```text
//! FreeListHeap   max | run count | (position, size)*   position order
//! SequenceHeap   child count | child snapshot*
//! LimitHeap      parent snapshot
//! ```

mod free_list;
mod limit;
mod sequence;

pub use free_list::FreeListHeap;
pub use limit::LimitHeap;
pub use sequence::SequenceHeap;

use crate::codec::{CodecError, Decoder};
use crate::metrics::Metrics;
use crate::region::Region;

/// A region allocator
///
/// Freeing a region that is not currently allocated, or freeing twice, is a
/// caller bug and leaves the heap in an unspecified state.
pub trait Heap: Send {
    /// Allocate `size` bytes, or `None` when no free extent is large enough
    fn ask(&mut self, size: u64) -> Option<Region>;

    /// Return a region to the free-list, merging with free neighbours
    fn free(&mut self, region: Region);

    /// Mark an explicit region allocated; false if any byte is already taken
    fn reserve(&mut self, region: Region) -> bool;

    /// Return every byte to the free-list
    fn reset(&mut self);

    /// Free bytes
    fn available(&self) -> u64;

    /// Size of the address space managed by this heap
    fn max(&self) -> u64;

    /// Free extents in position order
    fn free_runs(&self) -> Vec<Region>;

    /// Append the free-list to `buf`
    fn snapshot(&self, buf: &mut Vec<u8>);

    /// Replace the free-list with one written by `snapshot`
    fn load(&mut self, decoder: &mut Decoder<'_>) -> Result<(), CodecError>;

    /// Emit occupancy gauges
    fn report(&self, metrics: &dyn Metrics) {
        metrics.gauge("caravan.heap.available", self.available() as i64);
        metrics.gauge("caravan.heap.max", self.max() as i64);
        metrics.gauge("caravan.heap.fragments", self.free_runs().len() as i64);
    }
}
