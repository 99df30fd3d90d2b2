//! Sequence storage
//!
//! Concatenates several storages into one logical address space using the
//! same offset translation as `SequenceHeap`, so a region allocated from a
//! sequence heap maps 1:1 onto the matching sequence storage.

use bytes::Bytes;

use crate::error::{CaravanError, Result};
use crate::region::Region;

use super::Storage;

/// Storages laid end to end
#[derive(Default)]
pub struct SequenceStorage {
    children: Vec<Box<dyn Storage>>,
}

impl SequenceStorage {
    pub fn new(children: Vec<Box<dyn Storage>>) -> Self {
        Self { children }
    }

    /// Append a storage after the existing address space
    pub fn push(&mut self, storage: Box<dyn Storage>) {
        self.children.push(storage);
    }

    /// Number of chained storages
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Index of the child owning `position` and that child's offset
    fn locate(&self, position: u64) -> Option<(usize, u64)> {
        let mut offset = 0;
        for (i, child) in self.children.iter().enumerate() {
            if position < offset + child.size() {
                return Some((i, offset));
            }
            offset += child.size();
        }
        None
    }
}

impl Storage for SequenceStorage {
    fn read(&self, region: Region) -> Option<Bytes> {
        if region.is_empty() {
            return (region.position <= self.size()).then(Bytes::new);
        }
        let (i, offset) = self.locate(region.position)?;
        self.children[i].read(Region::new(region.position - offset, region.size))
    }

    fn write(&mut self, region: Region, bytes: &[u8]) -> Result<()> {
        if region.is_empty() && bytes.is_empty() {
            return Ok(());
        }
        let (i, offset) = self.locate(region.position).ok_or_else(|| {
            CaravanError::Storage(format!(
                "region at {} is beyond storage of {} bytes",
                region.position,
                self.size()
            ))
        })?;
        self.children[i].write(Region::new(region.position - offset, region.size), bytes)
    }

    fn flush(&mut self) -> Result<()> {
        for child in self.children.iter_mut() {
            child.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        for child in self.children.iter_mut() {
            child.close()?;
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.children.iter().map(|child| child.size()).sum()
    }
}
