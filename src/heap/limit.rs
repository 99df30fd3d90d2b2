//! Size-limited heap
//!
//! Rejects requests above a fixed size and delegates everything else. Used
//! to keep large payloads out of a pool tuned for small ones.

use crate::codec::{CodecError, Decoder};
use crate::region::Region;

use super::Heap;

/// Decorator rejecting oversized `ask` calls
pub struct LimitHeap {
    parent: Box<dyn Heap>,
    size_limit: u64,
}

impl LimitHeap {
    pub fn new(parent: Box<dyn Heap>, size_limit: u64) -> Self {
        Self { parent, size_limit }
    }

    /// Largest request this heap accepts
    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }
}

impl Heap for LimitHeap {
    fn ask(&mut self, size: u64) -> Option<Region> {
        if size > self.size_limit {
            return None;
        }
        self.parent.ask(size)
    }

    fn free(&mut self, region: Region) {
        self.parent.free(region)
    }

    fn reserve(&mut self, region: Region) -> bool {
        self.parent.reserve(region)
    }

    fn reset(&mut self) {
        self.parent.reset()
    }

    fn available(&self) -> u64 {
        self.parent.available()
    }

    fn max(&self) -> u64 {
        self.parent.max()
    }

    fn free_runs(&self) -> Vec<Region> {
        self.parent.free_runs()
    }

    fn snapshot(&self, buf: &mut Vec<u8>) {
        self.parent.snapshot(buf)
    }

    fn load(&mut self, decoder: &mut Decoder<'_>) -> Result<(), CodecError> {
        self.parent.load(decoder)
    }
}
