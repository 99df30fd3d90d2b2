//! In-memory storage
//!
//! Zero-filled buffer with the same contract as a data file. Nothing
//! survives the process.

use bytes::Bytes;

use crate::error::{CaravanError, Result};
use crate::region::Region;

use super::{check_write, Storage};

/// Storage held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: Vec<u8>,
    closed: bool,
}

impl MemoryStorage {
    pub fn new(size: u64) -> Self {
        Self {
            data: vec![0; size as usize],
            closed: false,
        }
    }
}

impl Storage for MemoryStorage {
    fn read(&self, region: Region) -> Option<Bytes> {
        if self.closed || region.end() > self.data.len() as u64 {
            return None;
        }
        let start = region.position as usize;
        Some(Bytes::copy_from_slice(&self.data[start..region.end() as usize]))
    }

    fn write(&mut self, region: Region, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(CaravanError::Storage("memory storage is closed".to_string()));
        }
        check_write(region, bytes, self.data.len() as u64)?;
        let start = region.position as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
