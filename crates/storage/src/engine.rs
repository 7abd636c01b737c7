//! Storage engine: in-memory table + WAL + periodic snapshots.
//!
//! Mutations apply to the table and append to an in-memory WAL buffer
//! synchronously; a background task drains the buffer to disk and fsyncs
//! every `flush_interval`. A second task snapshots the full table every
//! `snapshot_interval`. Recovery loads the snapshot (if any), then
//! replays the WAL over it.
//!
//! A data directory is owned by exactly one engine; two engines over the
//! same directory is undefined behavior.

use crate::memtable::Memtable;
use crate::record::Record;
use crate::snapshot::{self, SnapshotError};
use crate::wal::{self, WalError, WalFile};
use parking_lot::{Mutex, RwLock};
use ringkv_common::{now_ms, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("engine is closed")]
    EngineClosed,
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Engine tuning knobs. Defaults match the on-disk contract:
/// `wal.log` and `snapshot.json.gz` inside the data directory.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub wal_filename: String,
    pub snapshot_filename: String,
    pub snapshot_interval: Duration,
    pub flush_interval: Duration,
    /// When set, a successful snapshot truncates the WAL. Off by
    /// default: replay over the snapshot is idempotent under
    /// last-write-wins, so correctness does not require it.
    pub truncate_wal_on_snapshot: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wal_filename: "wal.log".to_string(),
            snapshot_filename: "snapshot.json.gz".to_string(),
            snapshot_interval: Duration::from_millis(10_000),
            flush_interval: Duration::from_millis(2),
            truncate_wal_on_snapshot: false,
        }
    }
}

/// Mutations, the WAL buffer and the closed flag live behind one lock
/// so the table order and the WAL order are always the same, and no
/// mutation can enqueue after close has taken the final drain.
#[derive(Debug)]
struct EngineState {
    table: Memtable,
    wal_buf: Vec<u8>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: RwLock<EngineState>,
    /// The WAL handle. Only the flush path writes to it; `None` once the
    /// engine has been closed and the final drain is done.
    wal: Mutex<Option<WalFile>>,
    snapshot_path: PathBuf,
    truncate_wal_on_snapshot: bool,
}

/// The per-shard storage engine. Cheap to share behind an `Arc`; all
/// methods take `&self`.
#[derive(Debug)]
pub struct Engine {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Open (or create) an engine over `data_dir`, running recovery and
    /// starting the flush and snapshot tasks. Must be called from within
    /// a tokio runtime.
    pub fn open(data_dir: &Path, config: EngineConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let wal_path = data_dir.join(&config.wal_filename);
        let snapshot_path = data_dir.join(&config.snapshot_filename);

        let mut table = Memtable::new();

        // Snapshot first. A snapshot that fails to parse is discarded:
        // availability wins over a stale file.
        match snapshot::read(&snapshot_path) {
            Ok(Some(entries)) => {
                tracing::info!(
                    "loaded snapshot with {} entries from {:?}",
                    entries.len(),
                    snapshot_path
                );
                table.load_entries(entries);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("discarding unreadable snapshot {:?}: {}", snapshot_path, e);
            }
        }

        // Then the WAL, in order, over the snapshot. Entries predating
        // the snapshot re-apply idempotently.
        let replay_ts = now_ms();
        let records = wal::replay(&wal_path)?;
        let replayed = records.len();
        for record in records {
            table.apply_wal(record, replay_ts);
        }

        let wal_file = WalFile::open(&wal_path)?;
        tracing::info!(
            "storage engine opened at {:?}: {} keys ({} WAL entries replayed)",
            data_dir,
            table.len(),
            replayed
        );

        let shared = Arc::new(Shared {
            state: RwLock::new(EngineState {
                table,
                wal_buf: Vec::new(),
                closed: false,
            }),
            wal: Mutex::new(Some(wal_file)),
            snapshot_path,
            truncate_wal_on_snapshot: config.truncate_wal_on_snapshot,
        });

        let cancel = CancellationToken::new();
        let tasks = vec![
            spawn_flush_task(shared.clone(), config.flush_interval, cancel.clone()),
            spawn_snapshot_task(shared.clone(), config.snapshot_interval, cancel.clone()),
        ];

        Ok(Self {
            shared,
            cancel,
            tasks: Mutex::new(tasks),
        })
    }

    /// Look up a key. Reads never block on disk.
    pub fn get(&self, key: &str) -> Option<Record> {
        let state = self.shared.state.read();
        state.table.get(key).cloned()
    }

    /// Store a value. Applies to the table and enqueues the WAL entry;
    /// durability follows at the next flush tick.
    pub fn put(&self, key: &str, value: Value) -> Result<Record, StorageError> {
        debug_assert!(!key.is_empty(), "keys are validated at the transport layer");

        let record = Record::new(value);
        let wal_bytes = record.value.to_wal_bytes();
        let mut state = self.shared.state.write();
        if state.closed {
            return Err(StorageError::EngineClosed);
        }
        wal::encode_put(&mut state.wal_buf, key, &wal_bytes);
        state.table.put(key.to_string(), record.clone());
        Ok(record)
    }

    /// Delete a key. Always logged, whether or not the key existed.
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut state = self.shared.state.write();
        if state.closed {
            return Err(StorageError::EngineClosed);
        }
        wal::encode_delete(&mut state.wal_buf, key);
        state.table.remove(key);
        Ok(())
    }

    /// Write a snapshot of the full table now. Returns the number of
    /// entries written.
    pub fn snapshot(&self) -> Result<usize, StorageError> {
        snapshot_once(&self.shared)
    }

    pub fn key_count(&self) -> usize {
        self.shared.state.read().table.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.shared.state.read().table.keys()
    }

    /// Stop both background tasks, drain the WAL buffer with a final
    /// write+fsync, and release the WAL handle. Mutations after close
    /// fail with [`StorageError::EngineClosed`].
    ///
    /// The flag is set under the state lock: a mutation either lands
    /// before it (and is covered by the final drain below) or fails.
    pub async fn close(&self) -> Result<(), StorageError> {
        {
            let mut state = self.shared.state.write();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            let _ = handle.await;
        }

        flush_once(&self.shared)?;
        self.shared.wal.lock().take();
        tracing::info!("storage engine closed");
        Ok(())
    }
}

/// Drain the WAL buffer to disk and fsync. No-op when the buffer is
/// empty or the handle is already released.
fn flush_once(shared: &Shared) -> Result<(), StorageError> {
    let pending = {
        let mut state = shared.state.write();
        if state.wal_buf.is_empty() {
            return Ok(());
        }
        std::mem::take(&mut state.wal_buf)
    };

    let mut guard = shared.wal.lock();
    if let Some(wal) = guard.as_mut() {
        wal.write_batch(&pending)?;
        let m = ringkv_metrics::global();
        m.wal_flushes.inc();
        m.wal_bytes_flushed.inc_by(pending.len() as u64);
    }
    Ok(())
}

/// Write one snapshot. When truncation is enabled the WAL lock is held
/// across the whole operation so a concurrent flush cannot slip entries
/// into the file between the state capture and the truncate.
fn snapshot_once(shared: &Shared) -> Result<usize, StorageError> {
    if shared.truncate_wal_on_snapshot {
        let mut guard = shared.wal.lock();
        let (entries, pending) = {
            let mut state = shared.state.write();
            (state.table.entries(), std::mem::take(&mut state.wal_buf))
        };
        // Land buffered entries in the WAL before the snapshot: if the
        // snapshot write fails the log still covers them.
        if !pending.is_empty() {
            if let Some(wal) = guard.as_mut() {
                wal.write_batch(&pending)?;
            }
        }
        snapshot::write(&shared.snapshot_path, &entries)?;
        if let Some(wal) = guard.as_mut() {
            wal.truncate()?;
        }
        ringkv_metrics::global().snapshots_taken.inc();
        Ok(entries.len())
    } else {
        let entries = {
            let state = shared.state.read();
            state.table.entries()
        };
        snapshot::write(&shared.snapshot_path, &entries)?;
        ringkv_metrics::global().snapshots_taken.inc();
        Ok(entries.len())
    }
}

fn spawn_flush_task(
    shared: Arc<Shared>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = flush_once(&shared) {
                        tracing::warn!("WAL flush failed: {}", e);
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

fn spawn_snapshot_task(
    shared: Arc<Shared>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval.max(Duration::from_millis(10)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of `interval` fires immediately; skip it so the
        // first snapshot lands one full period after open.
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match snapshot_once(&shared) {
                        Ok(n) => tracing::debug!("snapshot written: {} entries", n),
                        Err(e) => tracing::warn!("snapshot failed: {}", e),
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
