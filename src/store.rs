//! Backup storage.
//!
//! One directory per device under the backup root, one file per capture:
//!
//! ```text
//! <root>/core-sw1/20240304_102133.cfg
//! <root>/core-sw1/20240304_102133_001.cfg   # second capture in the same second
//! ```
//!
//! Content is stored verbatim. Records are ordered by the timestamp parsed
//! from the key and then by the collision suffix.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Timestamp layout of a backup key
pub const KEY_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File extension of a backup
pub const EXTENSION: &str = "cfg";

const KEY_STAMP_LEN: usize = 15;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid backup key '{0}'")]
    InvalidKey(String),

    #[error("invalid device name '{0}'")]
    InvalidDevice(String),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One stored capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub device: String,
    /// File name, e.g. `20240304_102133.cfg`
    pub key: String,
    /// Capture time (local, second precision)
    pub timestamp: NaiveDateTime,
    /// Same-second collision index, 0 for the first capture
    pub seq: u32,
    /// Content size in bytes
    pub size: u64,
}

impl BackupRecord {
    fn order(&self) -> (NaiveDateTime, u32, &str) {
        (self.timestamp, self.seq, &self.key)
    }
}

/// Outcome of a retention pass.
#[derive(Debug, Default)]
pub struct PruneReport {
    pub removed: Vec<BackupRecord>,
    /// `(device, error)` for every step that failed
    pub failures: Vec<(String, String)>,
}

/// Storage contract used by the orchestrator and the CLI.
pub trait BackupStore: Send + Sync {
    /// Store a new capture under a fresh key.
    fn append(&self, device: &str, content: &str) -> StoreResult<BackupRecord>;

    /// Records of `device`, newest first. Unreadable entries are skipped.
    fn history(&self, device: &str) -> StoreResult<Vec<BackupRecord>>;

    /// Most recent record of `device`.
    fn latest(&self, device: &str) -> StoreResult<Option<BackupRecord>> {
        Ok(self.history(device)?.into_iter().next())
    }

    /// Record of `device` with the given key.
    fn find(&self, device: &str, key: &str) -> StoreResult<Option<BackupRecord>> {
        let wanted = normalize_key(key);
        Ok(self
            .history(device)?
            .into_iter()
            .find(|record| record.key == wanted))
    }

    /// Stored text of a record, `None` if it no longer exists.
    fn content(&self, device: &str, record: &BackupRecord) -> StoreResult<Option<String>>;

    /// Delete a record; `false` if it did not exist.
    fn delete(&self, device: &str, record: &BackupRecord) -> StoreResult<bool>;

    /// Delete records older than `cutoff`, for one device or all of them.
    ///
    /// A failure on one device is reported and the remaining devices are
    /// still pruned.
    fn prune_older_than(&self, cutoff: NaiveDateTime, device: Option<&str>) -> PruneReport;

    /// Devices that have a backup directory.
    fn devices(&self) -> StoreResult<Vec<String>>;
}

/// Accept a key with or without its extension.
pub fn normalize_key(key: &str) -> String {
    if Path::new(key)
        .extension()
        .is_some_and(|ext| ext == EXTENSION)
    {
        key.to_string()
    } else {
        format!("{key}.{EXTENSION}")
    }
}

/// Device names become directory names, so they must be a single plain
/// path component.
pub fn validate_device_name(name: &str) -> StoreResult<()> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name != name.trim();
    if invalid {
        return Err(StoreError::InvalidDevice(name.to_string()));
    }
    Ok(())
}

fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Build the key for a capture time and collision index.
///
/// The index is zero-padded so lexical key order stays chronological.
pub fn format_key(timestamp: NaiveDateTime, seq: u32) -> String {
    let stamp = timestamp.format(KEY_FORMAT);
    if seq == 0 {
        format!("{stamp}.{EXTENSION}")
    } else {
        format!("{stamp}_{seq:03}.{EXTENSION}")
    }
}

/// Parse `YYYYMMDD_HHMMSS[_NNN].cfg`.
pub fn parse_key(key: &str) -> Option<(NaiveDateTime, u32)> {
    let stem = key.strip_suffix(EXTENSION)?.strip_suffix('.')?;
    let stamp = stem.get(..KEY_STAMP_LEN)?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, KEY_FORMAT).ok()?;
    let seq = match &stem[KEY_STAMP_LEN..] {
        "" => 0,
        rest => {
            let digits = rest.strip_prefix('_')?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse().ok()?
        }
    };
    Some((timestamp, seq))
}

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Filesystem-backed store.
pub struct FsBackupStore {
    root: PathBuf,
    clock: Clock,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FsBackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            clock: Arc::new(|| Local::now().naive_local()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the clock used to stamp new records.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn device_dir(&self, device: &str) -> StoreResult<PathBuf> {
        validate_device_name(device)?;
        Ok(self.root.join(device))
    }

    fn record_path(&self, device: &str, record: &BackupRecord) -> StoreResult<PathBuf> {
        validate_key(&record.key)?;
        Ok(self.device_dir(device)?.join(&record.key))
    }

    /// Lock serializing append, delete and prune for one device.
    fn device_lock(&self, device: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(device.to_string()).or_default())
    }

    fn read_record(device: &str, path: &Path) -> io::Result<Option<BackupRecord>> {
        let Some(key) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        if path.extension().is_none_or(|ext| ext != EXTENSION) {
            return Ok(None);
        }
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Ok(None);
        }

        let (timestamp, seq) = match parse_key(key) {
            Some(parsed) => parsed,
            None => {
                let modified = metadata.modified()?;
                log::debug!("{} has no timestamp key, using mtime", path.display());
                (DateTime::<Local>::from(modified).naive_local(), 0)
            }
        };

        Ok(Some(BackupRecord {
            device: device.to_string(),
            key: key.to_string(),
            timestamp,
            seq,
            size: metadata.len(),
        }))
    }

    fn prune_device(&self, device: &str, cutoff: NaiveDateTime, report: &mut PruneReport) {
        let lock = self.device_lock(device);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let history = match self.history(device) {
            Ok(history) => history,
            Err(e) => {
                log::warn!("[{device}] cannot list backups for pruning: {e}");
                report.failures.push((device.to_string(), e.to_string()));
                return;
            }
        };

        for record in history.into_iter().filter(|r| r.timestamp < cutoff) {
            let result = self
                .record_path(device, &record)
                .and_then(|path| fs::remove_file(&path).map_err(|e| StoreError::io(&path, e)));
            match result {
                Ok(()) => {
                    log::info!("[{device}] pruned {}", record.key);
                    report.removed.push(record);
                }
                Err(e) => {
                    log::warn!("[{device}] could not prune {}: {e}", record.key);
                    report.failures.push((device.to_string(), e.to_string()));
                }
            }
        }
    }
}

impl BackupStore for FsBackupStore {
    fn append(&self, device: &str, content: &str) -> StoreResult<BackupRecord> {
        let dir = self.device_dir(device)?;
        let lock = self.device_lock(device);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let timestamp = (self.clock)();
        let mut seq = 0;
        let (key, path, mut file) = loop {
            let key = format_key(timestamp, seq);
            let path = dir.join(&key);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (key, path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => seq += 1,
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        };

        if let Err(e) = file.write_all(content.as_bytes()).and_then(|()| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(StoreError::io(&path, e));
        }

        log::debug!("[{device}] stored {key} ({} bytes)", content.len());
        Ok(BackupRecord {
            device: device.to_string(),
            key,
            timestamp,
            seq,
            size: content.len() as u64,
        })
    }

    fn history(&self, device: &str) -> StoreResult<Vec<BackupRecord>> {
        let dir = self.device_dir(device)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("[{device}] skipping unreadable entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            match Self::read_record(device, &path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => log::warn!("[{device}] skipping {}: {e}", path.display()),
            }
        }

        records.sort_by(|a, b| b.order().cmp(&a.order()));
        Ok(records)
    }

    fn content(&self, device: &str, record: &BackupRecord) -> StoreResult<Option<String>> {
        let path = self.record_path(device, record)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn delete(&self, device: &str, record: &BackupRecord) -> StoreResult<bool> {
        let path = self.record_path(device, record)?;
        let lock = self.device_lock(device);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn prune_older_than(&self, cutoff: NaiveDateTime, device: Option<&str>) -> PruneReport {
        let mut report = PruneReport::default();

        let devices = match device {
            Some(name) => vec![name.to_string()],
            None => match self.devices() {
                Ok(devices) => devices,
                Err(e) => {
                    log::warn!("Cannot list backup devices: {e}");
                    report.failures.push(("*".to_string(), e.to_string()));
                    return report;
                }
            },
        };

        for name in devices {
            self.prune_device(&name, cutoff, &mut report);
        }
        report
    }

    fn devices(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut devices: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| validate_device_name(name).is_ok())
            .collect();
        devices.sort();
        Ok(devices)
    }
}

// ============================================================================
// Tests
// ============================================================================
