//! WAL Writer
//!
//! Handles appending records to the WAL file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{CaravanError, Result};

use super::{LogRecord, OrganizationSnapshot};

/// Appends records to the WAL file
///
/// Each call to `append_all` issues a single write of the whole batch. If
/// that write fails the file is cut back to its previous length, so a batch
/// is either entirely in the file or entirely absent (barring a crash, which
/// leaves a torn tail that recovery discards).
pub struct WalWriter {
    path: PathBuf,
    file: File,
    /// Current file length in bytes
    len: u64,
    sync_strategy: WalSyncStrategy,
    /// Records written since the last fsync
    uncommitted: usize,
    /// Set when `file` may no longer be the file at `path`
    detached: bool,
}

impl WalWriter {
    /// Open or create a WAL file, positioned at its end
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            sync_strategy,
            uncommitted: 0,
            detached: false,
        })
    }

    /// Append one record, returning its starting offset
    pub fn append(&mut self, record: &LogRecord) -> Result<u64> {
        self.append_all(std::slice::from_ref(record))
    }

    /// Append records in order as one write, returning the starting offset
    pub fn append_all(&mut self, records: &[LogRecord]) -> Result<u64> {
        if self.detached {
            self.reopen()?;
        }
        let mut buf = Vec::new();
        for record in records {
            record.write(&mut buf);
        }

        let start = self.len;
        if let Err(e) = self.file.write_all(&buf) {
            tracing::warn!(path = %self.path.display(), error = %e, "WAL write failed, rolling back");
            // Best effort: the write error is what the caller sees
            let _ = self.file.set_len(start);
            return Err(e.into());
        }
        self.len += buf.len() as u64;
        self.uncommitted += records.len();

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        };
        if should_sync {
            if let Err(e) = self.sync() {
                // An unsynced batch must not survive a reported failure
                let _ = self.file.set_len(start);
                self.len = start;
                self.uncommitted = self.uncommitted.saturating_sub(records.len());
                return Err(e);
            }
        }

        Ok(start)
    }

    /// Hand any userspace-buffered bytes to the OS
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        if self.detached {
            self.reopen()?;
        }
        self.file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Replace the whole log with a single snapshot record
    ///
    /// The snapshot goes to a temporary file that is synced and then renamed
    /// over the log, so a crash leaves either the old log or the new one.
    pub fn rotate(&mut self, snapshot: &OrganizationSnapshot) -> Result<()> {
        let mut buf = Vec::new();
        snapshot.write(&mut buf);

        let tmp_path = self.path.with_extension("log.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        // The old handle now points at an unlinked file
        self.reopen()?;
        self.uncommitted = 0;
        if let Some(dir) = self.path.parent() {
            sync_dir(dir)?;
        }

        tracing::debug!(path = %self.path.display(), bytes = self.len, "rotated WAL onto snapshot");
        Ok(())
    }

    /// Reattach to whatever file is now at the log path
    ///
    /// Until this succeeds, appends and syncs fail instead of landing in the
    /// old file.
    pub fn reopen(&mut self) -> Result<()> {
        self.detached = true;
        let file = OpenOptions::new().append(true).open(&self.path).map_err(|e| {
            CaravanError::Storage(format!(
                "cannot reattach to WAL {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let len = file.metadata()?.len();

        self.file = file;
        self.len = len;
        self.detached = false;
        Ok(())
    }

    /// True while the writer has lost track of the file at its path
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Current length of the log in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Records written since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
