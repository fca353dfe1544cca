//! # Settings Record Module
//!
//! Durable record of recording intent and save metadata. This is the only
//! state that survives a full stop; the engine re-derives its session from it
//! on `reload`.
//!
//! ## Storage
//! `FileSettingsStore` keeps the record as a small JSON file (`pulsewatch.json`)
//! next to the batches. Missing fields fall back to defaults so partial or
//! older records still load.
//!
//! Every mutation goes through `update`, which reads the whole record, applies
//! the change and writes the whole record back. Toggling `recording` therefore
//! never clobbers `last_save`/`total_recordings` written by a flush.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const SETTINGS_FILE_NAME: &str = "pulsewatch.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsRecord {
    pub recording: bool,
    /// Epoch milliseconds of the last committed batch, 0 if none
    pub last_save: i64,
    pub total_recordings: u64,
}

pub trait SettingsStore: Send {
    /// Read the record. An absent record yields the default.
    fn read(&self) -> Result<SettingsRecord, StoreError>;

    fn write(&self, record: &SettingsRecord) -> Result<(), StoreError>;
}

/// Read-modify-write the whole record
pub fn update<S, F>(store: &S, change: F) -> Result<SettingsRecord, StoreError>
where
    S: SettingsStore + ?Sized,
    F: FnOnce(&mut SettingsRecord),
{
    let mut record = store.read()?;
    change(&mut record);
    store.write(&record)?;
    Ok(record)
}

/// JSON file backed settings
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Settings file inside a data directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            name: self.path.display().to_string(),
            source,
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn read(&self) -> Result<SettingsRecord, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(SettingsRecord::default()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| StoreError::Decode {
                name: self.path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsRecord::default()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn write(&self, record: &SettingsRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record).map_err(StoreError::Encode)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        // Write a sibling temp file and rename over the record
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
        file.write_all(json.as_bytes()).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemorySettingsInner {
    record: Option<SettingsRecord>,
    fail_reads: bool,
    fail_writes: bool,
    writes: usize,
}

/// In-memory settings. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<Mutex<MemorySettingsInner>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SettingsRecord) -> Self {
        let store = Self::new();
        store.lock().record = Some(record);
        store
    }

    /// Current record, bypassing failure injection
    pub fn snapshot(&self) -> Option<SettingsRecord> {
        self.lock().record.clone()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySettingsInner> {
        // A poisoned lock only means a test thread panicked mid-write
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn read(&self) -> Result<SettingsRecord, StoreError> {
        let inner = self.lock();
        if inner.fail_reads {
            return Err(StoreError::Unavailable("settings read disabled".to_string()));
        }
        Ok(inner.record.clone().unwrap_or_default())
    }

    fn write(&self, record: &SettingsRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Unavailable("settings write disabled".to_string()));
        }
        inner.record = Some(record.clone());
        inner.writes += 1;
        Ok(())
    }
}
