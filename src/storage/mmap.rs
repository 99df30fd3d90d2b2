//! Memory-mapped file storage
//!
//! A fixed-size, pre-allocated file mapped read-write.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use memmap2::MmapMut;

use crate::error::{CaravanError, Result};
use crate::region::Region;

use super::{check_write, Storage};

/// Storage backed by one memory-mapped file
pub struct MmapStorage {
    path: PathBuf,
    /// `None` once closed
    map: Option<MmapMut>,
    size: u64,
}

impl MmapStorage {
    /// Open (creating if needed) a data file of exactly `size` mapped bytes
    pub fn open(path: &Path, size: u64) -> Result<Self> {
        if size == 0 {
            return Err(CaravanError::Storage(
                "cannot map a zero-length data file".to_string(),
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.metadata()?.len() < size {
            file.set_len(size)?;
        }

        // SAFETY: the file is owned by this store for its lifetime; nothing
        // else truncates or remaps it while mapped.
        let map = unsafe { memmap2::MmapOptions::new().len(size as usize).map_mut(&file)? };

        tracing::debug!(path = %path.display(), size, "mapped data file");

        Ok(Self {
            path: path.to_path_buf(),
            map: Some(map),
            size,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn map_mut(&mut self) -> Result<&mut MmapMut> {
        let path = &self.path;
        self.map.as_mut().ok_or_else(|| {
            CaravanError::Storage(format!("data file {} is closed", path.display()))
        })
    }
}

impl Storage for MmapStorage {
    fn read(&self, region: Region) -> Option<Bytes> {
        let map = self.map.as_ref()?;
        if region.end() > self.size {
            return None;
        }
        let start = region.position as usize;
        let end = region.end() as usize;
        Some(Bytes::copy_from_slice(&map[start..end]))
    }

    fn write(&mut self, region: Region, bytes: &[u8]) -> Result<()> {
        check_write(region, bytes, self.size)?;
        let map = self.map_mut()?;
        let start = region.position as usize;
        map[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.map_mut()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(map) = self.map.take() {
            map.flush()?;
            tracing::debug!(path = %self.path.display(), "closed data file");
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}
