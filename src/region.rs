//! Regions
//!
//! A region is an immutable `(position, size)` byte extent inside a logical
//! address space. Regions are never mutated in place, only freed.

/// A byte extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Region {
    /// First byte of the extent
    pub position: u64,
    /// Number of bytes
    pub size: u64,
}

impl Region {
    pub fn new(position: u64, size: u64) -> Self {
        Self { position, size }
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.position + self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// True when both regions share at least one byte
    pub fn overlaps(&self, other: &Region) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.position < other.end()
            && other.position < self.end()
    }

    /// Shift the region by `offset` bytes (used by sequence compositions)
    pub fn shifted(&self, offset: u64) -> Region {
        Region::new(self.position + offset, self.size)
    }
}

/// A region plus the bookkeeping the index keeps for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotatedRegion {
    pub region: Region,
    /// Caller supplied, per-id increasing sequence number
    pub seq: i32,
    /// Bytes held outside the store for this entry (large assets)
    pub asset_bytes: i64,
}

impl AnnotatedRegion {
    pub fn new(region: Region, seq: i32, asset_bytes: i64) -> Self {
        Self {
            region,
            seq,
            asset_bytes,
        }
    }
}
