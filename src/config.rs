//! Configuration for Caravan
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CaravanError, Result};

/// Main configuration for a Caravan store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log              (write-ahead log)
    ///     ├── data_000000.bin      (memory-mapped region storage)
    ///     ├── data_000001.bin      (added on growth)
    ///     └── backups/             (staging for cold backups)
    pub data_dir: PathBuf,

    /// Size of each pre-allocated data file (in bytes)
    pub storage_file_size: u64,

    /// Maximum number of data files; growth stops here and appends fail
    /// with `StoreFull`. A value of 1 disables growth.
    pub max_storage_files: usize,

    /// Largest single payload accepted (None = bounded only by file size)
    pub max_region_size: Option<u64>,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Take a snapshot and compact the WAL after this many records (0 = never)
    pub snapshot_every_records: u64,

    // -------------------------------------------------------------------------
    // Service Configuration
    // -------------------------------------------------------------------------
    /// Cadence of the background flusher (milliseconds)
    pub flush_interval_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./caravan_data"),
            storage_file_size: 64 * 1024 * 1024, // 64 MB
            max_storage_files: 8,
            max_region_size: None,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            snapshot_every_records: 10_000,
            flush_interval_ms: 250,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Total addressable bytes once every permitted data file exists
    pub fn max_capacity(&self) -> u64 {
        self.storage_file_size
            .saturating_mul(self.max_storage_files as u64)
    }

    /// Check the configuration is usable
    ///
    /// Region positions travel through the WAL as `int32`, so the whole
    /// address space must fit below `i32::MAX`.
    pub fn validate(&self) -> Result<()> {
        if self.storage_file_size == 0 {
            return Err(CaravanError::Config(
                "storage_file_size must be greater than zero".to_string(),
            ));
        }
        if self.max_storage_files == 0 {
            return Err(CaravanError::Config(
                "max_storage_files must be at least 1".to_string(),
            ));
        }
        if self.max_capacity() > i32::MAX as u64 {
            return Err(CaravanError::Config(format!(
                "total capacity {} exceeds the addressable limit of {} bytes",
                self.max_capacity(),
                i32::MAX
            )));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(CaravanError::Config(
                "EveryNEntries requires a count of at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the size of each data file (in bytes)
    pub fn storage_file_size(mut self, size: u64) -> Self {
        self.config.storage_file_size = size;
        self
    }

    /// Set the maximum number of data files
    pub fn max_storage_files(mut self, count: usize) -> Self {
        self.config.max_storage_files = count;
        self
    }

    /// Set the largest accepted payload (in bytes)
    pub fn max_region_size(mut self, size: u64) -> Self {
        self.config.max_region_size = Some(size);
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set how many WAL records trigger an automatic snapshot (0 = never)
    pub fn snapshot_every_records(mut self, count: u64) -> Self {
        self.config.snapshot_every_records = count;
        self
    }

    /// Set the background flush cadence (in milliseconds)
    pub fn flush_interval_ms(mut self, ms: u64) -> Self {
        self.config.flush_interval_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
