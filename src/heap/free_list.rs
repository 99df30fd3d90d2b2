//! Free-list heap
//!
//! Best-fit allocator over `[0, max)`. Free extents are indexed twice: by
//! position (for coalescing) and by `(size, position)` (for picking the
//! smallest adequate extent). Both indexes always hold the same extents.

use std::collections::{BTreeMap, BTreeSet};

use crate::codec::{put_varint, CodecError, Decoder};
use crate::region::Region;

use super::Heap;

/// Best-fit free-list allocator
#[derive(Debug, Clone)]
pub struct FreeListHeap {
    /// Size of the managed address space
    max: u64,
    /// Free extents: position → size
    by_position: BTreeMap<u64, u64>,
    /// Free extents ordered by (size, position) for best-fit lookup
    by_size: BTreeSet<(u64, u64)>,
    /// Sum of all free extent sizes
    available: u64,
}

impl FreeListHeap {
    /// Create a heap with `[0, max)` entirely free
    pub fn new(max: u64) -> Self {
        let mut heap = Self {
            max,
            by_position: BTreeMap::new(),
            by_size: BTreeSet::new(),
            available: 0,
        };
        heap.reset();
        heap
    }

    fn insert_extent(&mut self, position: u64, size: u64) {
        if size == 0 {
            return;
        }
        self.by_position.insert(position, size);
        self.by_size.insert((size, position));
        self.available += size;
    }

    fn remove_extent(&mut self, position: u64, size: u64) {
        self.by_position.remove(&position);
        self.by_size.remove(&(size, position));
        self.available -= size;
    }
}

impl Heap for FreeListHeap {
    fn ask(&mut self, size: u64) -> Option<Region> {
        if size == 0 {
            return Some(Region::new(0, 0));
        }
        if size > self.max {
            return None;
        }

        // Smallest extent that fits; ties resolve to the lowest position
        let (extent_size, extent_position) = *self.by_size.range((size, 0)..).next()?;
        self.remove_extent(extent_position, extent_size);
        self.insert_extent(extent_position + size, extent_size - size);

        Some(Region::new(extent_position, size))
    }

    fn free(&mut self, region: Region) {
        if region.is_empty() {
            return;
        }
        debug_assert!(region.end() <= self.max, "freeing outside the heap");

        let mut position = region.position;
        let mut size = region.size;

        // Merge with the extent ending exactly where this one starts
        if let Some((&prev_position, &prev_size)) = self.by_position.range(..position).next_back() {
            debug_assert!(prev_position + prev_size <= position, "double free");
            if prev_position + prev_size == position {
                self.remove_extent(prev_position, prev_size);
                position = prev_position;
                size += prev_size;
            }
        }

        // Merge with the extent starting exactly where this one ends
        if let Some(&next_size) = self.by_position.get(&region.end()) {
            self.remove_extent(region.end(), next_size);
            size += next_size;
        }

        self.insert_extent(position, size);
    }

    fn reserve(&mut self, region: Region) -> bool {
        if region.is_empty() {
            return true;
        }
        let (extent_position, extent_size) =
            match self.by_position.range(..=region.position).next_back() {
                Some((&p, &s)) => (p, s),
                None => return false,
            };
        let extent_end = extent_position + extent_size;
        if extent_end < region.end() {
            return false;
        }

        self.remove_extent(extent_position, extent_size);
        self.insert_extent(extent_position, region.position - extent_position);
        self.insert_extent(region.end(), extent_end - region.end());
        true
    }

    fn reset(&mut self) {
        self.by_position.clear();
        self.by_size.clear();
        self.available = 0;
        self.insert_extent(0, self.max);
    }

    fn available(&self) -> u64 {
        self.available
    }

    fn max(&self) -> u64 {
        self.max
    }

    fn free_runs(&self) -> Vec<Region> {
        self.by_position
            .iter()
            .map(|(&position, &size)| Region::new(position, size))
            .collect()
    }

    fn snapshot(&self, buf: &mut Vec<u8>) {
        put_varint(buf, self.max as i64);
        put_varint(buf, self.by_position.len() as i64);
        for (&position, &size) in &self.by_position {
            put_varint(buf, position as i64);
            put_varint(buf, size as i64);
        }
    }

    fn load(&mut self, decoder: &mut Decoder<'_>) -> Result<(), CodecError> {
        let max = decoder.get_unsigned_varint("heap max")?;
        if max != self.max {
            return Err(CodecError::Invalid(format!(
                "heap snapshot covers {} bytes, heap manages {}",
                max, self.max
            )));
        }

        let count = decoder.get_unsigned_varint("heap run count")?;
        let mut runs = Vec::new();
        let mut previous_end: Option<u64> = None;
        for _ in 0..count {
            let position = decoder.get_unsigned_varint("run position")?;
            let size = decoder.get_unsigned_varint("run size")?;
            // Runs must be non-empty, sorted, and separated by allocated bytes
            let touches_previous = previous_end.is_some_and(|end| position <= end);
            let end = position.checked_add(size).unwrap_or(u64::MAX);
            if touches_previous || size == 0 || end > max {
                return Err(CodecError::Invalid(format!(
                    "free run at {} of {} bytes is out of order or out of bounds",
                    position, size
                )));
            }
            previous_end = Some(end);
            runs.push((position, size));
        }

        self.by_position.clear();
        self.by_size.clear();
        self.available = 0;
        for (position, size) in runs {
            self.insert_extent(position, size);
        }
        Ok(())
    }
}
