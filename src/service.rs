//! Service Module
//!
//! Binds one store to a dedicated worker thread and hooks it up to metrics
//! and cold backups.
//!
//! ## Threads
//! ```text
//!   callers ──┐
//!             ├──▶ job channel ──▶ caravan-store worker ──▶ DurableListStore
//!   flusher ──┘    (crossbeam)     (sole owner, runs jobs in order)
//! ```
//! All reads and writes go through the job channel, so the store itself
//! needs no locking. The flusher enqueues a non-blocking flush plus a
//! metrics report every `flush_interval_ms` until shutdown.

use std::fs;
use std::ops::RangeBounds;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::archive::BackupArchive;
use crate::cloud::Cloud;
use crate::config::Config;
use crate::engine::{Appended, DurableListStore, Entry};
use crate::error::{CaravanError, Callback, Result};
use crate::keymap::Key;
use crate::metrics::Metrics;

/// Work item executed on the store's thread; `Err` when the service is gone
type Job = Box<dyn FnOnce(Result<&mut DurableListStore>) + Send + 'static>;

/// A store running on its own execution context
pub struct CaravanService {
    /// Job queue into the worker (None after shutdown)
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<Result<()>>>,
    flusher: Option<JoinHandle<()>>,
    /// Dropping this wakes the flusher for shutdown
    flusher_stop: Option<Sender<()>>,
    /// Liveness flag watched by the flusher
    alive: Arc<AtomicBool>,
    metrics: Arc<dyn Metrics>,
    cloud: Arc<dyn Cloud>,
    /// Where backup archives are staged before upload
    staging_dir: PathBuf,
    next_staging: AtomicU64,
    backups_inflight: AtomicI64,
    restores_inflight: AtomicI64,
}

impl CaravanService {
    const STAGING_DIR: &'static str = "backups";

    /// Open the store on a new worker thread and start the flusher
    pub fn start(config: Config, metrics: Arc<dyn Metrics>, cloud: Arc<dyn Cloud>) -> Result<Self> {
        let staging_dir = config.data_dir.join(Self::STAGING_DIR);
        fs::create_dir_all(&staging_dir)?;
        clear_staging(&staging_dir)?;

        let flush_interval = Duration::from_millis(config.flush_interval_ms);
        let (sender, receiver) = channel::unbounded::<Job>();
        let (ready_tx, ready_rx) = channel::bounded::<Result<()>>(1);

        // Worker: opens the store, then runs jobs until every sender is gone
        let store_metrics = Arc::clone(&metrics);
        let worker = thread::Builder::new()
            .name("caravan-store".to_string())
            .spawn(move || -> Result<()> {
                let mut store = match DurableListStore::open(config, store_metrics) {
                    Ok(store) => {
                        let _ = ready_tx.send(Ok(()));
                        store
                    }
                    Err(e) => {
                        let message = e.to_string();
                        let _ = ready_tx.send(Err(e));
                        return Err(CaravanError::Storage(message));
                    }
                };

                for job in receiver.iter() {
                    job(Ok(&mut store));
                }

                store.close()
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(CaravanError::ServiceStopped);
            }
        }

        let alive = Arc::new(AtomicBool::new(true));
        let (flusher_stop, flusher) = if flush_interval.is_zero() {
            (None, None)
        } else {
            let (stop_tx, stop_rx) = channel::bounded::<()>(0);
            let jobs = sender.clone();
            let alive = Arc::clone(&alive);
            let handle = thread::Builder::new()
                .name("caravan-flusher".to_string())
                .spawn(move || {
                    while alive.load(Ordering::Acquire) {
                        match stop_rx.recv_timeout(flush_interval) {
                            Err(RecvTimeoutError::Timeout) => {}
                            _ => break,
                        }
                        if !alive.load(Ordering::Acquire) {
                            break;
                        }
                        let job: Job = Box::new(|store: Result<&mut DurableListStore>| {
                            if let Ok(store) = store {
                                if let Err(e) = store.flush(false) {
                                    tracing::warn!(error = %e, "periodic flush failed");
                                }
                                store.report();
                            }
                        });
                        if jobs.send(job).is_err() {
                            break;
                        }
                    }
                })?;
            (Some(stop_tx), Some(handle))
        };

        tracing::info!(staging = %staging_dir.display(), "caravan service started");

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            flusher,
            flusher_stop,
            alive,
            metrics,
            cloud,
            staging_dir,
            next_staging: AtomicU64::new(0),
            backups_inflight: AtomicI64::new(0),
            restores_inflight: AtomicI64::new(0),
        })
    }

    // =========================================================================
    // Callback Operations
    // =========================================================================

    /// Run `f` on the store and hand its outcome to `callback`
    pub fn execute<T, F>(&self, f: F, callback: Callback<T>)
    where
        T: Send + 'static,
        F: FnOnce(&mut DurableListStore) -> Result<T> + Send + 'static,
    {
        self.submit(Box::new(move |store: Result<&mut DurableListStore>| {
            callback(store.and_then(f))
        }));
    }

    pub fn append(
        &self,
        key: Key,
        payload: Vec<u8>,
        seq: i32,
        asset_bytes: i64,
        callback: Callback<Appended>,
    ) {
        self.execute(
            move |store| store.append(&key, &payload, seq, asset_bytes),
            callback,
        );
    }

    pub fn read<R>(&self, key: Key, seqs: R, callback: Callback<Vec<Entry>>)
    where
        R: RangeBounds<i32> + Send + 'static,
    {
        self.execute(move |store| store.read(&key, seqs), callback);
    }

    pub fn trim(&self, key: Key, keep: usize, callback: Callback<usize>) {
        self.execute(move |store| Ok(store.trim(&key, keep)), callback);
    }

    pub fn delete(&self, key: Key, callback: Callback<bool>) {
        self.execute(move |store| store.delete(&key), callback);
    }

    // =========================================================================
    // Bounded-Wait Operations
    // =========================================================================

    /// Run `f` on the store and wait up to `timeout` for its outcome
    ///
    /// Timing out does not cancel `f`; it still runs to completion.
    pub fn call<T, F>(&self, f: F, timeout: Duration) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DurableListStore) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = channel::bounded(1);
        self.execute(
            f,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CaravanError::Timeout("store operation".to_string())),
            Err(RecvTimeoutError::Disconnected) => Err(CaravanError::ServiceStopped),
        }
    }

    pub fn flush(&self, blocking: bool, timeout: Duration) -> Result<()> {
        self.call(move |store| store.flush(blocking), timeout)
    }

    pub fn snapshot(&self, timeout: Duration) -> Result<()> {
        self.call(|store| store.snapshot_and_compact(), timeout)
    }

    /// Archive every entry of `key`, returning the archive key
    pub fn backup(&self, key: &Key, timeout: Duration) -> Result<String> {
        let started = Instant::now();
        let inflight = self.backups_inflight.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.gauge("caravan.backup.inflight", inflight);

        let result = self.backup_inner(key, started + timeout);

        let inflight = self.backups_inflight.fetch_sub(1, Ordering::Relaxed) - 1;
        self.metrics.gauge("caravan.backup.inflight", inflight);
        self.metrics
            .timing("caravan.backup", started.elapsed(), result.is_ok());
        match &result {
            Ok(archive_key) => tracing::info!(%key, archive_key, "backed up key"),
            Err(e) => tracing::warn!(%key, error = %e, "backup failed"),
        }
        result
    }

    /// Replace the entries of `key` with those of an archive, returning how
    /// many entries were restored
    pub fn restore(&self, key: &Key, archive_key: &str, timeout: Duration) -> Result<usize> {
        let started = Instant::now();
        let inflight = self.restores_inflight.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.gauge("caravan.restore.inflight", inflight);

        let result = self.restore_inner(key, archive_key, started + timeout);

        let inflight = self.restores_inflight.fetch_sub(1, Ordering::Relaxed) - 1;
        self.metrics.gauge("caravan.restore.inflight", inflight);
        self.metrics
            .timing("caravan.restore", started.elapsed(), result.is_ok());
        match &result {
            Ok(entries) => tracing::info!(%key, archive_key, entries, "restored key"),
            Err(e) => tracing::warn!(%key, archive_key, error = %e, "restore failed"),
        }
        result
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }

    /// Stop the flusher, drain queued jobs, flush and close the store
    pub fn shutdown(&mut self) -> Result<()> {
        self.alive.store(false, Ordering::Release);
        drop(self.flusher_stop.take());
        if let Some(flusher) = self.flusher.take() {
            if flusher.join().is_err() {
                tracing::error!("flusher thread panicked");
            }
        }

        drop(self.sender.take());
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let result = worker.join().unwrap_or(Err(CaravanError::ServiceStopped));
        match &result {
            Ok(()) => tracing::info!("caravan service stopped"),
            Err(e) => tracing::error!(error = %e, "caravan service stopped with error"),
        }
        result
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn submit(&self, job: Job) {
        match &self.sender {
            Some(sender) => {
                if let Err(channel::SendError(job)) = sender.send(job) {
                    job(Err(CaravanError::ServiceStopped));
                }
            }
            None => job(Err(CaravanError::ServiceStopped)),
        }
    }

    fn backup_inner(&self, key: &Key, deadline: Instant) -> Result<String> {
        let n = self.next_staging.fetch_add(1, Ordering::Relaxed);
        let staging = self.staging_dir.join(format!("backup-{:08}.bin", n));

        // Build the archive on the store thread so it sees a consistent view
        let archive_key_source = key.clone();
        let archive_path = staging.clone();
        let built = self.call(
            move |store| {
                let entries = store.read(&archive_key_source, ..)?;
                BackupArchive::new(&archive_key_source, &entries).write_to(&archive_path)
            },
            remaining(deadline),
        );
        if let Err(e) = built {
            // Queued behind the build job, so it runs after any late write
            let leftover = staging.clone();
            self.execute(
                move |_| {
                    let _ = fs::remove_file(&leftover);
                    Ok(())
                },
                Box::new(|_: Result<()>| {}),
            );
            return Err(e);
        }

        let (tx, rx) = channel::bounded(1);
        let staged = staging.clone();
        self.cloud.backup(
            key,
            &staging,
            Box::new(move |result| {
                let _ = fs::remove_file(&staged);
                let _ = tx.send(result);
            }),
        );
        wait_for(&rx, deadline, "cloud backup")
    }

    fn restore_inner(&self, key: &Key, archive_key: &str, deadline: Instant) -> Result<usize> {
        let (tx, rx) = channel::bounded(1);
        self.cloud.restore(
            key,
            archive_key,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let path = wait_for(&rx, deadline, "cloud restore")?;
        let archive = BackupArchive::read_from(&path);
        let _ = fs::remove_file(&path);
        let archive = archive?;

        let target = key.clone();
        let entries = archive.into_entries();
        self.call(
            move |store| store.replace(&target, &entries),
            remaining(deadline),
        )
    }
}

impl Drop for CaravanService {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.shutdown() {
                tracing::error!(error = %e, "shutdown on drop failed");
            }
        }
    }
}

/// Remove archives left behind by an earlier run
fn clear_staging(dir: &Path) -> Result<()> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::info!(dir = %dir.display(), removed, "cleared stale backup staging files");
    }
    Ok(())
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn wait_for<T>(rx: &channel::Receiver<Result<T>>, deadline: Instant, what: &str) -> Result<T> {
    match rx.recv_timeout(remaining(deadline)) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(CaravanError::Timeout(what.to_string())),
        Err(RecvTimeoutError::Disconnected) => Err(CaravanError::Cloud(format!(
            "{} dropped its callback",
            what
        ))),
    }
}
