//! Backup archives
//!
//! The file handed to the cold-storage collaborator for one key.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────┬───────────┐
//! │ bincode(BackupArchive)               │ CRC32 (4) │
//! └──────────────────────────────────────┴───────────┘
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::Entry;
use crate::error::{CaravanError, Result};
use crate::keymap::Key;

/// Size of the trailing checksum
const CRC_SIZE: usize = 4;

/// Every entry of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArchive {
    pub space: String,
    pub key: String,
    pub entries: Vec<ArchivedEntry>,
}

/// One archived payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedEntry {
    pub seq: i32,
    pub asset_bytes: i64,
    pub payload: Vec<u8>,
}

impl BackupArchive {
    pub fn new(key: &Key, entries: &[Entry]) -> Self {
        Self {
            space: key.space.clone(),
            key: key.key.clone(),
            entries: entries
                .iter()
                .map(|entry| ArchivedEntry {
                    seq: entry.seq,
                    asset_bytes: entry.asset_bytes,
                    payload: entry.payload.to_vec(),
                })
                .collect(),
        }
    }

    /// Archived entries as store entries, oldest first
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
            .into_iter()
            .map(|entry| Entry {
                seq: entry.seq,
                asset_bytes: entry.asset_bytes,
                payload: entry.payload.into(),
            })
            .collect()
    }

    /// Key this archive was taken from
    pub fn source_key(&self) -> Key {
        Key::new(self.space.clone(), self.key.clone())
    }

    /// Serialize and append the checksum
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = bincode::serialize(self)
            .map_err(|e| CaravanError::Archive(format!("failed to encode archive: {}", e)))?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    /// Verify the checksum and deserialize
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CRC_SIZE {
            return Err(CaravanError::Archive(format!(
                "archive of {} bytes is too short",
                bytes.len()
            )));
        }
        let (body, crc_bytes) = bytes.split_at(bytes.len() - CRC_SIZE);
        let mut stored = [0u8; CRC_SIZE];
        stored.copy_from_slice(crc_bytes);
        let stored = u32::from_le_bytes(stored);
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(CaravanError::Archive(format!(
                "archive checksum mismatch: stored {:08x}, computed {:08x}",
                stored, computed
            )));
        }
        bincode::deserialize(body)
            .map_err(|e| CaravanError::Archive(format!("failed to decode archive: {}", e)))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.encode()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        Self::decode(&fs::read(path)?)
    }
}
