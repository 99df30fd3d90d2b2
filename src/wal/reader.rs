//! WAL Reader
//!
//! Reads tagged records from a WAL or snapshot file in file order.

use std::fs;
use std::path::Path;

use crate::codec::{CodecError, Decoder};
use crate::error::{CaravanError, Result};

use super::LogRecord;

/// Reads records from an in-memory copy of a WAL file
///
/// A record cut short by the end of the file is a write that never
/// completed: reading stops there and `torn_bytes` reports its size. A record
/// whose bytes are malformed is corruption and fails with `WalCorruption`.
pub struct WalReader {
    data: Vec<u8>,
    /// Offset of the next unread record
    position: usize,
    /// Bytes of an incomplete trailing record, once found
    torn_bytes: usize,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_bytes(fs::read(path)?))
    }

    /// Read records from bytes already in memory
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            position: 0,
            torn_bytes: 0,
        }
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` at the end of the log, including when the tail is
    /// an incomplete record.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        if self.position >= self.data.len() || self.torn_bytes > 0 {
            return Ok(None);
        }

        let mut decoder = Decoder::new(&self.data[self.position..]);
        match LogRecord::read(&mut decoder) {
            Ok(record) => {
                self.position += decoder.position();
                Ok(Some(record))
            }
            Err(CodecError::Incomplete { .. }) => {
                self.torn_bytes = self.data.len() - self.position;
                tracing::warn!(
                    offset = self.position,
                    bytes = self.torn_bytes,
                    "discarding incomplete trailing WAL record"
                );
                Ok(None)
            }
            Err(CodecError::Invalid(reason)) => Err(CaravanError::WalCorruption {
                offset: self.position as u64,
                reason,
            }),
        }
    }

    /// Iterate over all valid records
    pub fn records(self) -> WalIterator {
        WalIterator {
            reader: self,
            failed: false,
        }
    }

    /// Bytes covered by fully-read records
    pub fn valid_len(&self) -> u64 {
        self.position as u64
    }

    /// Bytes of the incomplete trailing record (0 if none found yet)
    pub fn torn_bytes(&self) -> u64 {
        self.torn_bytes as u64
    }
}

/// Iterator over WAL records; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    failed: bool,
}

impl Iterator for WalIterator {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
