//! Results store
//!
//! Latest detection count per device, guarded by a single mutex and written
//! through to a local JSON file on every update. The file is replaced
//! atomically (temp file + rename) while the lock is held, so the on-disk
//! snapshot always matches the last value written under the lock.
//!
//! Persistence failures are logged and swallowed: the in-memory map stays
//! authoritative for the lifetime of the process.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use espcam_core::{now_millis, DeviceId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::content_store::{ContentStore, ContentStoreError};
use crate::pool::PoolResolver;

/// Latest result reported by one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub pool: String,
    pub count: u64,
    /// Epoch milliseconds
    #[serde(default)]
    pub last_update: i64,
}

/// Full device → record mapping
pub type Snapshot = BTreeMap<DeviceId, DeviceRecord>;

/// Aggregated view of the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_all_esp: u64,
    pub per_pool: BTreeMap<String, u64>,
    pub per_esp: Snapshot,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote store error: {0}")]
    Remote(#[from] ContentStoreError),

    #[error("Remote write conflict on {0}")]
    RemoteWriteConflict(String),
}

/// On-disk record, including the bare counts written by older deployments
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Current(DeviceRecord),
    Legacy(u64),
}

impl From<StoredRecord> for DeviceRecord {
    fn from(stored: StoredRecord) -> Self {
        match stored {
            StoredRecord::Current(record) => record,
            StoredRecord::Legacy(count) => DeviceRecord {
                pool: String::new(),
                count,
                last_update: 0,
            },
        }
    }
}

/// Parse a persisted snapshot, normalising device ids.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, serde_json::Error> {
    let raw: BTreeMap<String, StoredRecord> = serde_json::from_slice(bytes)?;
    Ok(raw
        .into_iter()
        .map(|(id, record)| (DeviceId::new(id), record.into()))
        .collect())
}

pub struct ResultsStore {
    records: Mutex<Snapshot>,
    path: PathBuf,
}

impl ResultsStore {
    pub fn new(path: impl Into<PathBuf>, initial: Snapshot) -> Self {
        Self {
            records: Mutex::new(initial),
            path: path.into(),
        }
    }

    /// Restore the store at startup.
    ///
    /// Reads the local file first. When it is missing or unreadable the
    /// remote copy under `remote_key` is tried, and a successful remote read
    /// is written straight back to the local file. Otherwise the store starts
    /// empty.
    pub async fn load(
        path: impl Into<PathBuf>,
        fallback: Option<(&dyn ContentStore, &str)>,
    ) -> Self {
        let path = path.into();

        match read_local(&path) {
            Ok(Some(snapshot)) => {
                info!(
                    path = %path.display(),
                    devices = snapshot.len(),
                    "Loaded results from local file"
                );
                return Self::new(path, snapshot);
            }
            Ok(None) => debug!(path = %path.display(), "No local results file"),
            Err(e) => warn!(path = %path.display(), error = %e, "Local results file unreadable"),
        }

        if let Some((remote, key)) = fallback {
            match remote.get(key).await {
                Ok(Some(content)) => match parse_snapshot(&content.content) {
                    Ok(snapshot) => {
                        info!(
                            key = %key,
                            devices = snapshot.len(),
                            "Restored results from remote store"
                        );
                        if let Err(e) = persist(&path, &snapshot) {
                            error!(
                                path = %path.display(),
                                error = %e,
                                "Failed to write restored results locally"
                            );
                        }
                        return Self::new(path, snapshot);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Remote results file is not valid JSON")
                    }
                },
                Ok(None) => debug!(key = %key, "No remote results file"),
                Err(e) => warn!(key = %key, error = %e, "Failed to read remote results"),
            }
        }

        info!("Starting with empty results");
        Self::new(path, Snapshot::new())
    }

    /// Overwrite the record for `device` and persist the full snapshot.
    pub fn update(&self, device: &DeviceId, pool: &str, count: u64) -> DeviceRecord {
        let record = DeviceRecord {
            pool: pool.to_string(),
            count,
            last_update: now_millis(),
        };

        let mut records = self.records.lock();
        records.insert(device.clone(), record.clone());
        if let Err(e) = persist(&self.path, &records) {
            error!(path = %self.path.display(), error = %e, "Failed to persist results");
        }

        record
    }

    /// Totals per configured pool and overall, plus the full snapshot.
    ///
    /// Pool totals follow the configured membership, not the pool name stored
    /// on each record.
    pub fn summarize(&self, pools: &PoolResolver) -> Summary {
        let records = self.records.lock();

        let per_pool = pools
            .pools()
            .iter()
            .map(|pool| {
                let total = pool
                    .member_device_ids
                    .iter()
                    .filter_map(|device| records.get(device))
                    .map(|record| record.count)
                    .sum();
                (pool.name.clone(), total)
            })
            .collect();

        Summary {
            total_all_esp: records.values().map(|r| r.count).sum(),
            per_pool,
            per_esp: records.clone(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.records.lock().clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Push the current snapshot to the remote store.
    ///
    /// Always reads the current revision first and writes conditionally. A
    /// conflicting concurrent writer gets one retry with a fresh snapshot.
    pub async fn backup_to(&self, remote: &dyn ContentStore, key: &str) -> Result<(), BackupError> {
        for attempt in 0..2 {
            let sha = remote.get(key).await?.and_then(|c| c.sha);
            let snapshot = self.snapshot();
            let body = serde_json::to_vec_pretty(&snapshot)?;
            let message = format!("update {} ({} devices)", key, snapshot.len());

            match remote.put(key, &body, &message, sha.as_deref()).await {
                Ok(()) => return Ok(()),
                Err(ContentStoreError::Conflict(_)) => {
                    debug!(key = %key, attempt, "Remote results changed underneath us");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BackupError::RemoteWriteConflict(key.to_string()))
    }
}

fn read_local(path: &Path) -> Result<Option<Snapshot>, PersistError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(parse_snapshot(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn persist(path: &Path, snapshot: &Snapshot) -> Result<(), PersistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, snapshot)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
