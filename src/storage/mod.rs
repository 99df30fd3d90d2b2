//! Storage Module
//!
//! Byte-addressable durable media backing heap regions.
//!
//! ## Responsibilities
//! - Write payload bytes at the region the heap handed out
//! - Read regions back
//! - Flush to the OS / disk on request
//!
//! ## Layout
//! ```text
//! ┌────────────────────────┬────────────────────────┬───────┐
//! │ data_000000.bin        │ data_000001.bin        │  ...  │
//! │ [0, size₀)             │ [size₀, size₀+size₁)   │       │
//! └────────────────────────┴────────────────────────┴───────┘
//!   SequenceStorage maps the logical address space onto the files exactly
//!   as SequenceHeap maps it onto child heaps.
//! ```

mod memory;
mod mmap;
mod sequence;

pub use memory::MemoryStorage;
pub use mmap::MmapStorage;
pub use sequence::SequenceStorage;

use bytes::Bytes;

use crate::error::{CaravanError, Result};
use crate::region::Region;

/// A byte-addressable medium
pub trait Storage: Send {
    /// Bytes of `region`, or `None` when it lies outside the medium
    fn read(&self, region: Region) -> Option<Bytes>;

    /// Overwrite `region` with `bytes` (lengths must match)
    fn write(&mut self, region: Region, bytes: &[u8]) -> Result<()>;

    /// Push written bytes to durable media
    fn flush(&mut self) -> Result<()>;

    /// Flush and release the medium; later calls fail
    fn close(&mut self) -> Result<()>;

    /// Size of the medium in bytes
    fn size(&self) -> u64;
}

/// Shared bounds check for `write` implementations
pub(crate) fn check_write(region: Region, bytes: &[u8], size: u64) -> Result<()> {
    if bytes.len() as u64 != region.size {
        return Err(CaravanError::Storage(format!(
            "payload of {} bytes does not match region of {} bytes",
            bytes.len(),
            region.size
        )));
    }
    if region.end() > size {
        return Err(CaravanError::Storage(format!(
            "region [{}, {}) is beyond storage of {} bytes",
            region.position,
            region.end(),
            size
        )));
    }
    Ok(())
}
