//! Engine Module
//!
//! The durable list store: coordinates heap, storage, index, key map and WAL.
//!
//! ## Responsibilities
//! - Append payloads for a key and make them durable through the WAL
//! - Serve reads by sequence range
//! - Trim and delete history, returning space to the heap
//! - Snapshot state and compact the WAL
//! - Recover state on startup
//!
//! ## Per-key lifecycle
//! ```text
//!   Unknown ──append/map_key──▶ Mapped ──append──▶ HasData
//!      ▲                          │                   │
//!      └──────────── delete ──────┴───────────────────┘
//! ```

use std::fs;
use std::ops::RangeBounds;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::config::Config;
use crate::error::{CaravanError, Result};
use crate::heap::{FreeListHeap, Heap, LimitHeap, SequenceHeap};
use crate::keymap::{Id, Key};
use crate::metrics::{Metrics, NoopMetrics};
use crate::organization::Organization;
use crate::region::{AnnotatedRegion, Region};
use crate::storage::{MmapStorage, SequenceStorage, Storage};
use crate::wal::{Append, DelKey, LogRecord, MapKey, WalRecovery, WalWriter};

/// Outcome of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub id: Id,
    pub seq: i32,
    pub region: Region,
}

/// One stored payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub seq: i32,
    pub asset_bytes: i64,
    pub payload: Bytes,
}

/// Where a key is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// No id assigned
    Unknown,
    /// Id assigned, nothing stored
    Mapped,
    /// At least one region stored
    HasData,
}

/// Point-in-time store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub keys: usize,
    pub regions: usize,
    pub referenced_bytes: u64,
    pub heap_available: u64,
    pub heap_max: u64,
    pub storage_files: usize,
    pub wal_bytes: u64,
    pub records_since_snapshot: u64,
}

impl StoreStats {
    /// Bytes the heap considers allocated but no index entry references
    pub fn wasted_bytes(&self) -> u64 {
        (self.heap_max - self.heap_available).saturating_sub(self.referenced_bytes)
    }
}

/// Durable per-key append-only list store
///
/// ## Concurrency Model: single execution context
///
/// Every method takes `&mut self` or `&self` and is expected to run on one
/// thread (see `CaravanService`). Safety comes from that serialization; the
/// store holds no locks.
///
/// ## Durability
///
/// Append records carry their payload, so the WAL alone can rebuild the data
/// files. Data files only need to be flushed before the WAL is compacted.
pub struct DurableListStore {
    /// Store configuration
    config: Config,

    /// Heap, index and key map
    organization: Organization,

    /// Data files laid end to end, mirroring the heap
    storage: SequenceStorage,

    /// Write-ahead log
    wal: WalWriter,

    metrics: Arc<dyn Metrics>,

    /// Records appended since the last snapshot
    records_since_snapshot: u64,
}

impl DurableListStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const DATA_PREFIX: &'static str = "data_";
    const DATA_SUFFIX: &'static str = ".bin";

    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Map every existing data file (creating the first)
    /// 3. Recover heap, index and key map from the WAL
    /// 4. Rewrite replayed payloads into the data files
    pub fn open(config: Config, metrics: Arc<dyn Metrics>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        // Step 1: Discover data files (contiguous from 0)
        let mut file_ids = Self::discover_data_files(&config.data_dir)?;
        if file_ids.is_empty() {
            file_ids.push(0);
        }
        for (expected, &found) in file_ids.iter().enumerate() {
            if expected as u64 != found {
                return Err(CaravanError::Storage(format!(
                    "data file {} is missing",
                    Self::data_path(&config.data_dir, expected as u64).display()
                )));
            }
        }
        if file_ids.len() > config.max_storage_files {
            return Err(CaravanError::Config(format!(
                "{} data files present but max_storage_files is {}",
                file_ids.len(),
                config.max_storage_files
            )));
        }

        // Step 2: Build the heap and storage sequences
        let mut heap = SequenceHeap::default();
        let mut storage = SequenceStorage::default();
        for &file_id in &file_ids {
            heap.push(Self::make_heap(&config));
            let path = Self::data_path(&config.data_dir, file_id);
            storage.push(Box::new(MmapStorage::open(&path, config.storage_file_size)?));
        }

        // Step 3: Recover from the WAL
        let mut organization = Organization::new(heap);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);
        let mut records_since_snapshot = 0;
        if wal_path.exists() {
            let (records, result) = WalRecovery::recover(&wal_path)?;
            let writes = organization.replay(&records)?;
            for write in &writes {
                storage.write(write.region, &write.payload)?;
            }
            storage.flush()?;

            records_since_snapshot = match result.last_snapshot {
                Some(at) => (records.len() - at - 1) as u64,
                None => records.len() as u64,
            };

            tracing::info!(
                records = result.records_recovered,
                payloads = writes.len(),
                keys = organization.keymap.len(),
                torn_bytes = result.torn_bytes,
                "recovered store from WAL"
            );
        }

        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        Ok(Self {
            config,
            organization,
            storage,
            wal,
            metrics,
            records_since_snapshot,
        })
    }

    /// Rebuild statistics for a store directory without changing any file
    ///
    /// The WAL is read but not truncated, and data files are checked against
    /// the configured size but never created, mapped or resized. Heap and
    /// index metrics go to `metrics`.
    pub fn inspect(config: &Config, metrics: &dyn Metrics) -> Result<StoreStats> {
        config.validate()?;

        let file_ids = Self::discover_data_files(&config.data_dir)?;
        let mut heap = SequenceHeap::default();
        for (expected, &found) in file_ids.iter().enumerate() {
            let path = Self::data_path(&config.data_dir, expected as u64);
            if expected as u64 != found {
                return Err(CaravanError::Storage(format!(
                    "data file {} is missing",
                    path.display()
                )));
            }
            let len = fs::metadata(&path)?.len();
            if len != config.storage_file_size {
                return Err(CaravanError::Config(format!(
                    "data file {} holds {} bytes but storage_file_size is {}",
                    path.display(),
                    len,
                    config.storage_file_size
                )));
            }
            heap.push(Self::make_heap(config));
        }

        let mut organization = Organization::new(heap);
        let wal_path = Self::wal_path(&config.data_dir);
        let (records, result) = if wal_path.exists() {
            WalRecovery::scan(&wal_path)?
        } else {
            Default::default()
        };
        organization.replay(&records)?;
        Self::report_organization(&organization, metrics);

        let records_since_snapshot = match result.last_snapshot {
            Some(at) => (records.len() - at - 1) as u64,
            None => records.len() as u64,
        };
        Ok(Self::stats_of(
            &organization,
            file_ids.len(),
            result.valid_len,
            records_since_snapshot,
        ))
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config, Arc::new(NoopMetrics))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Assign an id to a key without storing anything
    pub fn map_key(&mut self, key: &Key) -> Result<Id> {
        if let Some(id) = self.organization.keymap.get(key) {
            return Ok(id);
        }
        let record = self.invent(key)?;
        if let Err(e) = self.wal.append(&LogRecord::MapKey(record.clone())) {
            self.undo_invention(Some(&record));
            return Err(e);
        }
        self.records_since_snapshot += 1;
        Ok(record.id)
    }

    /// Append a payload to a key's history
    ///
    /// Steps:
    /// 1. Invent an id if the key is unmapped
    /// 2. Allocate a region (growing storage if permitted)
    /// 3. Write the payload to storage
    /// 4. Write `[MapKey?, Append]` to the WAL in one write
    /// 5. Record the region in the index
    ///
    /// A failure at any step undoes the earlier ones.
    pub fn append(
        &mut self,
        key: &Key,
        payload: &[u8],
        seq: i32,
        asset_bytes: i64,
    ) -> Result<Appended> {
        let size = payload.len() as u64;
        if let Some(limit) = self.config.max_region_size {
            if size > limit {
                return Err(CaravanError::RegionTooLarge {
                    requested: size,
                    limit,
                });
            }
        }

        // Step 1: Resolve or invent the id
        let invented = match self.organization.keymap.get(key) {
            Some(_) => None,
            None => Some(self.invent(key)?),
        };
        let id = match &invented {
            Some(record) => record.id,
            None => self.resolve(key)?,
        };

        // Step 2: Allocate
        let region = match self.allocate(size) {
            Ok(region) => region,
            Err(e) => {
                self.undo_invention(invented.as_ref());
                return Err(e);
            }
        };

        // Step 3: Write the payload
        if let Err(e) = self.storage.write(region, payload) {
            self.organization.heap.free(region);
            self.undo_invention(invented.as_ref());
            return Err(e);
        }

        // Step 4: Log it
        let mut records = Vec::with_capacity(2);
        if let Some(record) = &invented {
            records.push(LogRecord::MapKey(record.clone()));
        }
        records.push(LogRecord::Append(Append {
            id,
            position: region.position,
            payload: Bytes::copy_from_slice(payload),
            seq,
            asset_bytes,
        }));
        if let Err(e) = self.wal.append_all(&records) {
            self.organization.heap.free(region);
            self.undo_invention(invented.as_ref());
            return Err(e);
        }

        // Step 5: Index it
        if let Some(last) = self.organization.index.of(id).and_then(|list| list.last()) {
            if i64::from(seq) != i64::from(last.seq) + 1 {
                self.metrics.increment("caravan.sequence_skips", 1);
                tracing::debug!(%key, previous = last.seq, seq, "sequence number skipped");
            }
        }
        self.organization
            .index
            .append(id, AnnotatedRegion::new(region, seq, asset_bytes));

        self.records_since_snapshot += records.len() as u64;
        self.maybe_snapshot();

        Ok(Appended { id, seq, region })
    }

    /// Read the entries of a key whose sequence number falls in `seqs`
    ///
    /// Unknown keys read as empty.
    pub fn read(&self, key: &Key, seqs: impl RangeBounds<i32>) -> Result<Vec<Entry>> {
        let Some(id) = self.organization.keymap.get(key) else {
            return Ok(Vec::new());
        };
        let Some(list) = self.organization.index.of(id) else {
            return Ok(Vec::new());
        };

        list.iter()
            .filter(|entry| seqs.contains(&entry.seq))
            .map(|entry| {
                let payload = self.storage.read(entry.region).ok_or_else(|| {
                    CaravanError::Storage(format!(
                        "region [{}, {}) for {} is beyond storage",
                        entry.region.position,
                        entry.region.end(),
                        key
                    ))
                })?;
                Ok(Entry {
                    seq: entry.seq,
                    asset_bytes: entry.asset_bytes,
                    payload,
                })
            })
            .collect()
    }

    /// Keep only the `keep` newest entries of a key, returning how many
    /// were dropped
    ///
    /// Not logged: after a crash the dropped entries may come back, never
    /// the other way round.
    pub fn trim(&mut self, key: &Key, keep: usize) -> usize {
        let Some(id) = self.organization.keymap.get(key) else {
            return 0;
        };
        match self.organization.index.trim(id, keep) {
            None => 0,
            Some(regions) => {
                let count = regions.len();
                for region in regions {
                    self.organization.heap.free(region);
                }
                tracing::debug!(%key, dropped = count, keep, "trimmed history");
                count
            }
        }
    }

    /// Delete a key and all its entries; false if the key was unknown
    pub fn delete(&mut self, key: &Key) -> Result<bool> {
        let Some(id) = self.organization.keymap.get(key) else {
            return Ok(false);
        };

        let record = DelKey { key: key.clone() };
        self.wal.append(&LogRecord::DelKey(record.clone()))?;

        for region in self.organization.index.delete(id) {
            self.organization.heap.free(region);
        }
        self.organization.keymap.apply_del(&record);

        self.records_since_snapshot += 1;
        self.maybe_snapshot();
        Ok(true)
    }

    /// Replace a key's whole history with `entries`, returning how many
    /// were stored
    ///
    /// All or nothing: space for every entry is claimed before anything is
    /// logged, and `[DelKey?, MapKey, Append*]` goes to the WAL in one write.
    /// The key gets a new id. An empty `entries` deletes the key.
    ///
    /// Payloads reach the data files only after the WAL write, since the new
    /// regions may overlap the old history. A failure at that point is
    /// returned, but the replacement stands; the next open rewrites the
    /// payloads from the WAL.
    pub fn replace(&mut self, key: &Key, entries: &[Entry]) -> Result<usize> {
        if entries.is_empty() {
            self.delete(key)?;
            return Ok(0);
        }
        if let Some(limit) = self.config.max_region_size {
            if let Some(size) = entries
                .iter()
                .map(|entry| entry.payload.len() as u64)
                .find(|&size| size > limit)
            {
                return Err(CaravanError::RegionTooLarge {
                    requested: size,
                    limit,
                });
            }
        }

        // Step 1: Release the old history in the heap only
        let old_id = self.organization.keymap.get(key);
        let old_regions: Vec<Region> = old_id
            .and_then(|id| self.organization.index.of(id))
            .map(|list| list.iter().map(|entry| entry.region).collect())
            .unwrap_or_default();
        for &region in &old_regions {
            self.organization.heap.free(region);
        }

        // Step 2: Claim space for every entry
        let mut regions = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.allocate(entry.payload.len() as u64) {
                Ok(region) => regions.push(region),
                Err(e) => {
                    self.release_claims(&regions, &old_regions);
                    return Err(e);
                }
            }
        }

        // Step 3: Remap and log
        let del = old_id.map(|_| DelKey { key: key.clone() });
        if let Some(record) = &del {
            self.organization.keymap.apply_del(record);
        }
        let map = match self.invent(key) {
            Ok(record) => record,
            Err(e) => {
                self.restore_mapping(key, old_id);
                self.release_claims(&regions, &old_regions);
                return Err(e);
            }
        };
        let mut records = Vec::with_capacity(entries.len() + 2);
        if let Some(record) = del {
            records.push(LogRecord::DelKey(record));
        }
        records.push(LogRecord::MapKey(map.clone()));
        for (entry, region) in entries.iter().zip(&regions) {
            records.push(LogRecord::Append(Append {
                id: map.id,
                position: region.position,
                payload: entry.payload.clone(),
                seq: entry.seq,
                asset_bytes: entry.asset_bytes,
            }));
        }
        if let Err(e) = self.wal.append_all(&records) {
            self.undo_invention(Some(&map));
            self.restore_mapping(key, old_id);
            self.release_claims(&regions, &old_regions);
            return Err(e);
        }

        // Step 4: Index the new history
        if let Some(id) = old_id {
            self.organization.index.delete(id);
        }
        for (entry, &region) in entries.iter().zip(&regions) {
            self.organization.index.append(
                map.id,
                AnnotatedRegion::new(region, entry.seq, entry.asset_bytes),
            );
        }
        self.records_since_snapshot += records.len() as u64;
        tracing::debug!(%key, id = map.id, entries = entries.len(), "replaced history");

        // Step 5: Write the payloads
        for (entry, &region) in entries.iter().zip(&regions) {
            self.storage.write(region, &entry.payload)?;
        }

        self.maybe_snapshot();
        Ok(entries.len())
    }

    /// Make logged records durable and, when `blocking`, the data files too
    ///
    /// Syncs the WAL whenever it holds unsynced records. The data files can
    /// always be rebuilt from the WAL, so only a blocking flush waits on them.
    pub fn flush(&mut self, blocking: bool) -> Result<()> {
        self.wal.flush()?;
        if blocking || self.wal.uncommitted_count() > 0 {
            self.wal.sync()?;
        }
        if blocking {
            self.storage.flush()?;
        }
        Ok(())
    }

    /// Snapshot the organization and replace the WAL with it
    pub fn snapshot_and_compact(&mut self) -> Result<()> {
        // The compacted log no longer holds payloads, so data files go first
        self.storage.flush()?;
        let snapshot = self.organization.snapshot();
        self.wal.rotate(&snapshot)?;

        tracing::info!(
            records = self.records_since_snapshot,
            wal_bytes = self.wal.len(),
            "compacted WAL onto snapshot"
        );
        self.records_since_snapshot = 0;
        self.metrics.increment("caravan.snapshots", 1);
        Ok(())
    }

    /// Emit heap, index, wasted space and data-loss metrics
    pub fn report(&self) {
        Self::report_organization(&self.organization, self.metrics.as_ref());
    }

    /// Flush everything to disk and release the data files
    pub fn close(mut self) -> Result<()> {
        self.flush(true)?;
        self.storage.close()?;
        tracing::debug!(data_dir = %self.config.data_dir.display(), "store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Id assigned to a key
    pub fn id_of(&self, key: &Key) -> Option<Id> {
        self.organization.keymap.get(key)
    }

    pub fn key_state(&self, key: &Key) -> KeyState {
        match self.organization.keymap.get(key) {
            None => KeyState::Unknown,
            Some(id) => match self.organization.index.of(id) {
                Some(list) if !list.is_empty() => KeyState::HasData,
                _ => KeyState::Mapped,
            },
        }
    }

    /// WAL records written but not yet synced
    pub fn unsynced_records(&self) -> usize {
        self.wal.uncommitted_count()
    }

    pub fn stats(&self) -> StoreStats {
        Self::stats_of(
            &self.organization,
            self.storage.len(),
            self.wal.len(),
            self.records_since_snapshot,
        )
    }

    /// Heap, index and key map (read only)
    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of the WAL file inside a data directory
    pub fn wal_path(data_dir: &Path) -> PathBuf {
        data_dir.join(Self::WAL_FILENAME)
    }

    /// Path of a numbered data file inside a data directory
    pub fn data_path(data_dir: &Path, file_id: u64) -> PathBuf {
        data_dir.join(format!(
            "{}{:06}{}",
            Self::DATA_PREFIX,
            file_id,
            Self::DATA_SUFFIX
        ))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn invent(&mut self, key: &Key) -> Result<MapKey> {
        self.organization
            .keymap
            .invent_and_apply(key)
            .ok_or_else(|| CaravanError::Storage(format!("{} is already mapped", key)))
    }

    fn resolve(&self, key: &Key) -> Result<Id> {
        self.organization
            .keymap
            .get(key)
            .ok_or_else(|| CaravanError::Storage(format!("{} lost its mapping", key)))
    }

    /// Remove a mapping created by a failed operation; its id is not reused
    fn undo_invention(&mut self, invented: Option<&MapKey>) {
        if let Some(record) = invented {
            self.organization.keymap.apply_del(&DelKey {
                key: record.key.clone(),
            });
        }
    }

    /// Put back a mapping removed by a failed replace
    fn restore_mapping(&mut self, key: &Key, id: Option<Id>) {
        if let Some(id) = id {
            self.organization.keymap.apply_map(&MapKey {
                key: key.clone(),
                id,
            });
        }
    }

    /// Give back regions claimed by a failed replace and re-take the ones
    /// it released
    fn release_claims(&mut self, claimed: &[Region], released: &[Region]) {
        for &region in claimed {
            self.organization.heap.free(region);
        }
        for &region in released {
            if !self.organization.heap.reserve(region) {
                tracing::error!(
                    position = region.position,
                    size = region.size,
                    "could not re-reserve region after failed replace"
                );
            }
        }
    }

    /// Ask the heap for space, adding data files while permitted
    fn allocate(&mut self, size: u64) -> Result<Region> {
        loop {
            if let Some(region) = self.organization.heap.ask(size) {
                return Ok(region);
            }
            // A fresh data file cannot help a payload larger than one file
            if size > self.config.storage_file_size || !self.grow()? {
                self.metrics.increment("caravan.store_full", 1);
                tracing::warn!(
                    requested = size,
                    available = self.organization.heap.available(),
                    "store full"
                );
                return Err(CaravanError::StoreFull { requested: size });
            }
        }
    }

    /// Add one data file and its heap; false once the limit is reached
    fn grow(&mut self) -> Result<bool> {
        let count = self.storage.len();
        if count >= self.config.max_storage_files {
            return Ok(false);
        }
        let path = Self::data_path(&self.config.data_dir, count as u64);
        let storage = MmapStorage::open(&path, self.config.storage_file_size)?;
        self.storage.push(Box::new(storage));
        self.organization.heap.push(Self::make_heap(&self.config));

        tracing::info!(path = %path.display(), files = count + 1, "added data file");
        Ok(true)
    }

    fn maybe_snapshot(&mut self) {
        let every = self.config.snapshot_every_records;
        if every == 0 || self.records_since_snapshot < every {
            return;
        }
        // The triggering operation is already durable; a failed compaction
        // only means a longer replay next time.
        if let Err(e) = self.snapshot_and_compact() {
            tracing::warn!(error = %e, "automatic snapshot failed");
            if self.wal.is_detached() {
                tracing::error!(
                    path = %self.wal.path().display(),
                    "WAL writer lost its file; writes fail until it reattaches"
                );
            }
        }
    }

    fn stats_of(
        organization: &Organization,
        storage_files: usize,
        wal_bytes: u64,
        records_since_snapshot: u64,
    ) -> StoreStats {
        let index = &organization.index;
        StoreStats {
            keys: organization.keymap.len(),
            regions: index
                .ids()
                .filter_map(|id| index.of(id))
                .map(|list| list.len())
                .sum(),
            referenced_bytes: index.total_bytes(),
            heap_available: organization.heap.available(),
            heap_max: organization.heap.max(),
            storage_files,
            wal_bytes,
            records_since_snapshot,
        }
    }

    fn report_organization(organization: &Organization, metrics: &dyn Metrics) {
        let heap = &organization.heap;
        heap.report(metrics);
        organization.index.report(metrics);

        let allocated = heap.max() - heap.available();
        let referenced = organization.index.total_bytes();
        metrics.gauge("caravan.wasted_space", allocated.saturating_sub(referenced) as i64);
        if referenced > allocated {
            metrics.increment("caravan.data_loss", 1);
            tracing::error!(
                allocated,
                referenced,
                "index references more bytes than the heap has allocated"
            );
        }
    }

    fn make_heap(config: &Config) -> Box<dyn Heap> {
        let heap: Box<dyn Heap> = Box::new(FreeListHeap::new(config.storage_file_size));
        match config.max_region_size {
            Some(limit) => Box::new(LimitHeap::new(heap, limit)),
            None => heap,
        }
    }

    /// Numbers of the data files present in a directory, ascending
    fn discover_data_files(dir: &Path) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let id = name
                .strip_prefix(Self::DATA_PREFIX)
                .and_then(|rest| rest.strip_suffix(Self::DATA_SUFFIX))
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(id) = id {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}
