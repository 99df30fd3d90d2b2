//! Sequence heap
//!
//! Presents several heaps as one address space laid end to end. Child `i`
//! owns `[offset_i, offset_i + max_i)` where `offset_i` is the sum of the
//! preceding children's `max()`. Regions never straddle two children.

use crate::codec::{put_varint, CodecError, Decoder};
use crate::region::Region;

use super::Heap;

/// Heaps chained end to end with offset translation
#[derive(Default)]
pub struct SequenceHeap {
    children: Vec<Box<dyn Heap>>,
}

impl SequenceHeap {
    pub fn new(children: Vec<Box<dyn Heap>>) -> Self {
        Self { children }
    }

    /// Append a child heap after the existing address space
    pub fn push(&mut self, heap: Box<dyn Heap>) {
        self.children.push(heap);
    }

    /// Number of chained heaps
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child owning `position` and that child's starting offset
    fn locate(&mut self, position: u64) -> Option<(&mut Box<dyn Heap>, u64)> {
        let mut offset = 0;
        for child in self.children.iter_mut() {
            let max = child.max();
            if position < offset + max {
                return Some((child, offset));
            }
            offset += max;
        }
        None
    }
}

impl Heap for SequenceHeap {
    fn ask(&mut self, size: u64) -> Option<Region> {
        let mut offset = 0;
        for child in self.children.iter_mut() {
            if let Some(region) = child.ask(size) {
                return Some(region.shifted(offset));
            }
            offset += child.max();
        }
        None
    }

    fn free(&mut self, region: Region) {
        if region.is_empty() {
            return;
        }
        match self.locate(region.position) {
            Some((child, offset)) => child.free(Region::new(region.position - offset, region.size)),
            None => debug_assert!(false, "freeing a region outside every child heap"),
        }
    }

    fn reserve(&mut self, region: Region) -> bool {
        if region.is_empty() {
            return true;
        }
        match self.locate(region.position) {
            Some((child, offset)) => {
                let local = Region::new(region.position - offset, region.size);
                local.end() <= child.max() && child.reserve(local)
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        for child in self.children.iter_mut() {
            child.reset();
        }
    }

    fn available(&self) -> u64 {
        self.children.iter().map(|child| child.available()).sum()
    }

    fn max(&self) -> u64 {
        self.children.iter().map(|child| child.max()).sum()
    }

    fn free_runs(&self) -> Vec<Region> {
        let mut runs = Vec::new();
        let mut offset = 0;
        for child in &self.children {
            runs.extend(child.free_runs().into_iter().map(|run| run.shifted(offset)));
            offset += child.max();
        }
        runs
    }

    fn snapshot(&self, buf: &mut Vec<u8>) {
        put_varint(buf, self.children.len() as i64);
        for child in &self.children {
            child.snapshot(buf);
        }
    }

    fn load(&mut self, decoder: &mut Decoder<'_>) -> Result<(), CodecError> {
        let count = decoder.get_unsigned_varint("heap child count")? as usize;
        if count > self.children.len() {
            return Err(CodecError::Invalid(format!(
                "heap snapshot has {} children, only {} present",
                count,
                self.children.len()
            )));
        }
        for child in self.children.iter_mut().take(count) {
            child.load(decoder)?;
        }
        // Children added after the snapshot was taken start out empty
        for child in self.children.iter_mut().skip(count) {
            child.reset();
        }
        Ok(())
    }
}
