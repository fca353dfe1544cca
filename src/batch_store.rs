//! # Batch Storage Module
//!
//! Append-only storage for flushed batches. Each successful flush produces one
//! immutable CSV file named after its creation timestamp (`pw<millis>.csv`).
//! Batches are never modified after creation; they are only listed, read in
//! full or erased in full.
//!
//! ## Stores
//! - **DirBatchStore**: one file per batch in a data directory. `create` writes
//!   a hidden temp file, syncs it and renames it into place, so a batch is
//!   either fully visible to `list` or not at all.
//! - **MemoryBatchStore**: shared in-memory map with failure injection, used
//!   by tests and simulations.

use crate::error::StoreError;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const BATCH_SUFFIX: &str = ".csv";

pub trait BatchStore: Send {
    /// Create (or overwrite) a batch with the given content
    fn create(&self, name: &str, content: &str) -> Result<(), StoreError>;

    /// Names starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    fn read(&self, name: &str) -> Result<Option<String>, StoreError>;

    fn erase(&self, name: &str) -> Result<(), StoreError>;

    /// Size of a batch in bytes
    fn size(&self, name: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.read(name)?.map(|content| content.len() as u64))
    }
}

/// Deterministic batch name for a creation timestamp
pub fn batch_name(prefix: &str, timestamp: i64) -> String {
    format!("{}{}{}", prefix, timestamp, BATCH_SUFFIX)
}

/// Creation timestamp encoded in a batch name, if it is one
pub fn batch_timestamp(prefix: &str, name: &str) -> Option<i64> {
    let digits = name.strip_prefix(prefix)?.strip_suffix(BATCH_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Keep only batch names and order them by creation time.
/// Names whose stem is not a millisecond stamp (`pwx.csv`) are not batches.
pub fn sort_batches(prefix: &str, names: Vec<String>) -> Vec<String> {
    let mut batches: Vec<(i64, String)> = names
        .into_iter()
        .filter_map(|name| batch_timestamp(prefix, &name).map(|ts| (ts, name)))
        .collect();
    batches.sort();
    batches.into_iter().map(|(_, name)| name).collect()
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains("..");
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Directory backed batch store
#[derive(Debug, Clone)]
pub struct DirBatchStore {
    dir: PathBuf,
}

impl DirBatchStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }
}

fn io_err(name: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        name: name.to_string(),
        source,
    }
}

impl BatchStore for DirBatchStore {
    fn create(&self, name: &str, content: &str) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(|e| io_err(name, e))?;

        let tmp = self.dir.join(format!(".{}.tmp", name));
        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(name, e));
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir.display().to_string(), e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.dir.display().to_string(), e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(name, e)),
        }
    }

    fn erase(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(name, e)),
        }
    }

    fn size(&self, name: &str) -> Result<Option<u64>, StoreError> {
        let path = self.path_for(name)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(name, e)),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryBatchInner {
    files: BTreeMap<String, String>,
    fail_creates: bool,
    fail_lists: bool,
}

/// In-memory batch store. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryBatchStore {
    inner: Arc<Mutex<MemoryBatchInner>>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.lock().fail_creates = fail;
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.lock().fail_lists = fail;
    }

    pub fn len(&self) -> usize {
        self.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().files.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryBatchInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BatchStore for MemoryBatchStore {
    fn create(&self, name: &str, content: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut inner = self.lock();
        if inner.fail_creates {
            return Err(StoreError::Unavailable("storage full".to_string()));
        }
        inner.files.insert(name.to_string(), content.to_string());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        if inner.fail_lists {
            return Err(StoreError::Unavailable("listing disabled".to_string()));
        }
        Ok(inner
            .files
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn read(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().files.get(name).cloned())
    }

    fn erase(&self, name: &str) -> Result<(), StoreError> {
        self.lock().files.remove(name);
        Ok(())
    }
}
