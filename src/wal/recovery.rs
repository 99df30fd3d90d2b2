//! WAL Recovery
//!
//! Reads every durable record from a WAL and cuts off a torn tail.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;

use super::{LogRecord, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records successfully read
    pub records_recovered: u64,

    /// Position (in record order) of the last snapshot record, if any
    pub last_snapshot: Option<usize>,

    /// Length of the log once the torn tail is removed
    pub valid_len: u64,

    /// Bytes of the incomplete trailing record
    pub torn_bytes: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover records from a WAL file
    ///
    /// This will:
    /// 1. Read all complete records in file order
    /// 2. Fail on corruption anywhere before the tail
    /// 3. Truncate an incomplete trailing record
    /// 4. Return the records in order
    pub fn recover(path: &Path) -> Result<(Vec<LogRecord>, RecoveryResult)> {
        let (records, mut result) = Self::scan(path)?;

        if result.torn_bytes > 0 {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
            result.was_truncated = true;
            tracing::info!(
                path = %path.display(),
                torn_bytes = result.torn_bytes,
                "truncated torn WAL tail"
            );
        }

        Ok((records, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path).map(|(_, result)| result)
    }

    /// Read every complete record without modifying the file
    ///
    /// A torn tail is reported in the result but left in place.
    pub fn scan(path: &Path) -> Result<(Vec<LogRecord>, RecoveryResult)> {
        let mut reader = WalReader::open(path)?;
        let mut records = Vec::new();
        let mut last_snapshot = None;

        while let Some(record) = reader.next_record()? {
            if matches!(record, LogRecord::Snapshot(_)) {
                last_snapshot = Some(records.len());
            }
            records.push(record);
        }

        let result = RecoveryResult {
            records_recovered: records.len() as u64,
            last_snapshot,
            valid_len: reader.valid_len(),
            torn_bytes: reader.torn_bytes(),
            was_truncated: false,
        };
        Ok((records, result))
    }
}
