//! Region Index
//!
//! Per-id ordered history of annotated regions. Entry order is append order,
//! which is also the caller-supplied sequence order; the index never invents
//! sequence numbers.
//!
//! The index only hands regions back to its caller. Returning them to the
//! heap is the caller's job.

use std::collections::BTreeMap;

use crate::codec::{put_varint, CodecError, Decoder};
use crate::keymap::Id;
use crate::metrics::Metrics;
use crate::region::{AnnotatedRegion, Region};

/// id → regions in append order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<Id, Vec<AnnotatedRegion>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a region, creating the id's list if needed
    pub fn append(&mut self, id: Id, region: AnnotatedRegion) {
        self.entries.entry(id).or_default().push(region);
    }

    /// Keep only the `keep` newest regions
    ///
    /// Returns the removed regions oldest first, or `None` when the id is
    /// unknown or already holds at most `keep` regions.
    pub fn trim(&mut self, id: Id, keep: usize) -> Option<Vec<Region>> {
        let list = self.entries.get_mut(&id)?;
        if list.len() <= keep {
            return None;
        }
        let excess = list.len() - keep;
        Some(list.drain(..excess).map(|entry| entry.region).collect())
    }

    /// Forget the id, returning every region it held
    pub fn delete(&mut self, id: Id) -> Vec<Region> {
        self.entries
            .remove(&id)
            .map(|list| list.into_iter().map(|entry| entry.region).collect())
            .unwrap_or_default()
    }

    pub fn exists(&self, id: Id) -> bool {
        self.entries.contains_key(&id)
    }

    /// Regions held for an id, oldest first
    pub fn of(&self, id: Id) -> Option<&[AnnotatedRegion]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    /// Known ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes referenced by every region in the index
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .values()
            .flat_map(|list| list.iter())
            .map(|entry| entry.region.size)
            .sum()
    }

    /// Remove every entry sharing a byte with `region`, along with every
    /// older entry of the same id
    ///
    /// Only replay needs this: when a logged append lands on bytes the index
    /// still holds, those entries were trimmed before the crash. A trim only
    /// ever drops the oldest entries, so everything ahead of them went too.
    pub fn evict_overlapping(&mut self, region: Region) -> Vec<Region> {
        let mut evicted = Vec::new();
        for list in self.entries.values_mut() {
            let last = list
                .iter()
                .rposition(|entry| entry.region.overlaps(&region));
            if let Some(last) = last {
                evicted.extend(list.drain(..=last).map(|entry| entry.region));
            }
        }
        evicted
    }

    /// Append the index to `buf`
    ///
    /// ```text
    /// id count | (id, region count, (position, size, seq, asset_bytes)*)*
    /// ```
    /// All values are zigzag varints; ids ascend, regions keep list order.
    pub fn snapshot(&self, buf: &mut Vec<u8>) {
        put_varint(buf, self.entries.len() as i64);
        for (&id, list) in &self.entries {
            put_varint(buf, i64::from(id));
            put_varint(buf, list.len() as i64);
            for entry in list {
                put_varint(buf, entry.region.position as i64);
                put_varint(buf, entry.region.size as i64);
                put_varint(buf, i64::from(entry.seq));
                put_varint(buf, entry.asset_bytes);
            }
        }
    }

    /// Replace the index with one written by `snapshot`
    pub fn load(&mut self, decoder: &mut Decoder<'_>) -> Result<(), CodecError> {
        let id_count = decoder.get_unsigned_varint("index id count")?;
        let mut entries = BTreeMap::new();
        for _ in 0..id_count {
            let raw_id = decoder.get_varint()?;
            let id = Id::try_from(raw_id)
                .map_err(|_| CodecError::Invalid(format!("index id {} out of range", raw_id)))?;
            let count = decoder.get_unsigned_varint("index region count")?;
            let mut list = Vec::new();
            for _ in 0..count {
                let position = decoder.get_unsigned_varint("region position")?;
                let size = decoder.get_unsigned_varint("region size")?;
                let raw_seq = decoder.get_varint()?;
                let seq = i32::try_from(raw_seq).map_err(|_| {
                    CodecError::Invalid(format!("sequence number {} out of range", raw_seq))
                })?;
                let asset_bytes = decoder.get_varint()?;
                list.push(AnnotatedRegion::new(Region::new(position, size), seq, asset_bytes));
            }
            if entries.insert(id, list).is_some() {
                return Err(CodecError::Invalid(format!("index id {} appears twice", id)));
            }
        }
        self.entries = entries;
        Ok(())
    }

    /// Emit per-id size and count histograms
    pub fn report(&self, metrics: &dyn Metrics) {
        metrics.gauge("caravan.index.ids", self.entries.len() as i64);
        for list in self.entries.values() {
            let bytes: u64 = list.iter().map(|entry| entry.region.size).sum();
            metrics.histogram("caravan.index.regions_per_id", list.len() as u64);
            metrics.histogram("caravan.index.bytes_per_id", bytes);
        }
    }
}
