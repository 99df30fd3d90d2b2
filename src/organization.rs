//! Organization
//!
//! The in-memory half of a store: heap, index and key map, plus the fold
//! that rebuilds them from log records.
//!
//! Folding performs no I/O. Appends yield a `PendingWrite` describing the
//! payload bytes the caller must put back into storage, which keeps replay
//! testable against plain record lists.

use bytes::Bytes;

use crate::codec::{CodecError, Decoder};
use crate::error::{CaravanError, Result};
use crate::heap::{Heap, SequenceHeap};
use crate::index::Index;
use crate::keymap::KeyMap;
use crate::region::Region;
use crate::wal::{Append, LogRecord, OrganizationSnapshot};

/// Payload bytes a replayed append needs written to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub region: Region,
    pub payload: Bytes,
}

/// Heap + index + key map
pub struct Organization {
    pub heap: SequenceHeap,
    pub index: Index,
    pub keymap: KeyMap,
}

impl Organization {
    /// Empty index and key map over the given heap
    pub fn new(heap: SequenceHeap) -> Self {
        Self {
            heap,
            index: Index::new(),
            keymap: KeyMap::new(),
        }
    }

    /// Capture the full state as a snapshot record
    pub fn snapshot(&self) -> OrganizationSnapshot {
        let mut heap = Vec::new();
        self.heap.snapshot(&mut heap);
        let mut index = Vec::new();
        self.index.snapshot(&mut index);
        let mut keymap = Vec::new();
        self.keymap.snapshot(&mut keymap);

        OrganizationSnapshot {
            heap: heap.into(),
            index: index.into(),
            keymap: keymap.into(),
        }
    }

    /// Replace the full state with a snapshot
    ///
    /// Nothing changes unless all three parts decode.
    pub fn load(&mut self, snapshot: &OrganizationSnapshot) -> Result<()> {
        let mut index = Index::new();
        decode_all(&snapshot.index, |decoder| index.load(decoder))?;
        let mut keymap = KeyMap::new();
        decode_all(&snapshot.keymap, |decoder| keymap.load(decoder))?;

        let mut previous_heap = Vec::new();
        self.heap.snapshot(&mut previous_heap);
        if let Err(e) = decode_all(&snapshot.heap, |decoder| self.heap.load(decoder)) {
            // Put the heap back the way it was before reporting
            let _ = decode_all(&previous_heap, |decoder| self.heap.load(decoder));
            return Err(e);
        }

        self.index = index;
        self.keymap = keymap;
        Ok(())
    }

    /// Fold one record into the state
    pub fn apply(&mut self, record: &LogRecord) -> Result<Option<PendingWrite>> {
        match record {
            LogRecord::Append(append) => self.apply_append(append).map(Some),
            LogRecord::MapKey(map) => {
                self.keymap.apply_map(map);
                Ok(None)
            }
            LogRecord::DelKey(del) => {
                if let Some(id) = self.keymap.get(&del.key) {
                    for region in self.index.delete(id) {
                        self.heap.free(region);
                    }
                }
                self.keymap.apply_del(del);
                Ok(None)
            }
            LogRecord::Snapshot(snapshot) => {
                self.load(snapshot)?;
                Ok(None)
            }
        }
    }

    /// Fold a whole record stream
    ///
    /// Starts from the last snapshot in the stream (records before it never
    /// need replay) and returns the storage writes in record order.
    pub fn replay(&mut self, records: &[LogRecord]) -> Result<Vec<PendingWrite>> {
        let start = records
            .iter()
            .rposition(|record| matches!(record, LogRecord::Snapshot(_)))
            .unwrap_or(0);

        let mut writes = Vec::new();
        for record in &records[start..] {
            if let Some(write) = self.apply(record)? {
                writes.push(write);
            }
        }
        Ok(writes)
    }

    fn apply_append(&mut self, append: &Append) -> Result<PendingWrite> {
        let region = append.region();

        if !self.heap.reserve(region) {
            // The bytes are still held by entries that were trimmed before
            // the crash; trims are not logged, so drop those entries now.
            let evicted = self.index.evict_overlapping(region);
            tracing::debug!(
                id = append.id,
                position = region.position,
                evicted = evicted.len(),
                "evicting regions superseded by replayed append"
            );
            for stale in evicted {
                self.heap.free(stale);
            }
            if !self.heap.reserve(region) {
                return Err(CaravanError::WalCorruption {
                    offset: region.position,
                    reason: format!(
                        "append for id {} at [{}, {}) overlaps unreleased space",
                        append.id,
                        region.position,
                        region.end()
                    ),
                });
            }
        }

        self.index.append(append.id, append.annotated_region());
        Ok(PendingWrite {
            region,
            payload: append.payload.clone(),
        })
    }
}

/// Run `load` over `bytes`, requiring it to consume them exactly
fn decode_all(
    bytes: &[u8],
    load: impl FnOnce(&mut Decoder<'_>) -> std::result::Result<(), CodecError>,
) -> Result<()> {
    let mut decoder = Decoder::new(bytes);
    load(&mut decoder)?;
    if !decoder.is_empty() {
        return Err(CodecError::Invalid(format!(
            "{} unread bytes after snapshot section",
            decoder.remaining()
        ))
        .into());
    }
    Ok(())
}
