//! Cold-storage collaborator
//!
//! The store treats the archive as an opaque sink/source addressed by an
//! archive-key string. Outcomes arrive through callbacks, possibly on
//! another thread.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CaravanError, Callback, Result};
use crate::keymap::Key;

/// Blob archive for key backups
pub trait Cloud: Send + Sync {
    /// Archive `file` for `key`; the callback receives the new archive key
    fn backup(&self, key: &Key, file: &Path, callback: Callback<String>);

    /// Fetch an archive into a local file; the caller owns and removes it
    fn restore(&self, key: &Key, archive_key: &str, callback: Callback<PathBuf>);

    fn exists(&self, key: &Key, archive_key: &str, callback: Callback<bool>);

    fn delete(&self, key: &Key, archive_key: &str, callback: Callback<()>);

    /// Local working directory of the collaborator
    fn path(&self) -> &Path;
}

/// Archive kept in a local directory
///
/// ```text
/// {root}/{space}/{key}/{archive_key}
/// {root}/.restore/                     files handed out by restore
/// ```
pub struct LocalCloud {
    root: PathBuf,
    next_archive: AtomicU64,
}

impl LocalCloud {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(".restore"))?;
        Ok(Self {
            root,
            next_archive: AtomicU64::new(0),
        })
    }

    fn archive_path(&self, key: &Key, archive_key: &str) -> Result<PathBuf> {
        if archive_key.is_empty() || archive_key.contains(['/', '\\']) || archive_key.starts_with('.') {
            return Err(CaravanError::Cloud(format!(
                "invalid archive key {:?}",
                archive_key
            )));
        }
        Ok(self
            .root
            .join(escape(&key.space))
            .join(escape(&key.key))
            .join(archive_key))
    }

    fn new_archive_key(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let n = self.next_archive.fetch_add(1, Ordering::Relaxed);
        format!("{:013}-{:06}", millis, n)
    }

    fn do_backup(&self, key: &Key, file: &Path) -> Result<String> {
        let archive_key = self.new_archive_key();
        let target = self.archive_path(key, &archive_key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(file, &target)?;
        Ok(archive_key)
    }

    fn do_restore(&self, key: &Key, archive_key: &str) -> Result<PathBuf> {
        let source = self.archive_path(key, archive_key)?;
        if !source.exists() {
            return Err(CaravanError::Cloud(format!(
                "no archive {} for {}",
                archive_key, key
            )));
        }
        let target = self.root.join(".restore").join(format!(
            "{}-{}-{}",
            escape(&key.space),
            escape(&key.key),
            archive_key
        ));
        fs::copy(&source, &target)?;
        Ok(target)
    }
}

impl Cloud for LocalCloud {
    fn backup(&self, key: &Key, file: &Path, callback: Callback<String>) {
        callback(self.do_backup(key, file));
    }

    fn restore(&self, key: &Key, archive_key: &str, callback: Callback<PathBuf>) {
        callback(self.do_restore(key, archive_key));
    }

    fn exists(&self, key: &Key, archive_key: &str, callback: Callback<bool>) {
        callback(self.archive_path(key, archive_key).map(|path| path.exists()));
    }

    fn delete(&self, key: &Key, archive_key: &str, callback: Callback<()>) {
        let result = self.archive_path(key, archive_key).and_then(|path| {
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        });
        callback(result);
    }

    fn path(&self) -> &Path {
        &self.root
    }
}

/// Make a key component safe to use as a single path segment
fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for byte in component.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}
