use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::types::QuestLog;

/// Key the collection blob is stored under.
pub const CACHE_KEY: &str = "questLogs";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local durable cache holding the whole collection as one JSON blob.
/// Reads and writes are always wholesale.
pub trait LocalCache: Send + Sync {
    /// Returns `None` when nothing has been cached yet.
    fn read(&self) -> Result<Option<Vec<QuestLog>>, StorageError>;

    fn write(&self, logs: &[QuestLog]) -> Result<(), StorageError>;
}

pub struct FileCache {
    storage_path: PathBuf,
}

impl FileCache {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
        }
    }

    /// `<data dir>/quest-log/questLogs.json`, when the platform has a data dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("quest-log").join(format!("{CACHE_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }
}

impl LocalCache for FileCache {
    fn read(&self) -> Result<Option<Vec<QuestLog>>, StorageError> {
        if !self.storage_path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.storage_path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Writes through a temporary file and an atomic rename to avoid
    /// partial writes.
    fn write(&self, logs: &[QuestLog]) -> Result<(), StorageError> {
        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp = self.storage_path.with_extension("tmp");
        let mut f = File::create(&temp)?;
        let content = serde_json::to_string(logs)?;
        f.write_all(content.as_bytes())?;
        f.sync_all()?;
        fs::rename(temp, &self.storage_path)?;
        Ok(())
    }
}

/// In-process cache keeping the serialized blob, for embedding and tests.
#[derive(Default)]
pub struct MemoryCache {
    blob: Mutex<Option<String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw blob as last written.
    pub fn raw(&self) -> Option<String> {
        self.blob.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }
}

impl LocalCache for MemoryCache {
    fn read(&self) -> Result<Option<Vec<QuestLog>>, StorageError> {
        match self.raw() {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write(&self, logs: &[QuestLog]) -> Result<(), StorageError> {
        if *self.fail_writes.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(StorageError::Io(std::io::Error::other("cache is read-only")));
        }
        let content = serde_json::to_string(logs)?;
        *self.blob.lock().unwrap_or_else(|p| p.into_inner()) = Some(content);
        Ok(())
    }
}

impl<C: LocalCache + ?Sized> LocalCache for std::sync::Arc<C> {
    fn read(&self) -> Result<Option<Vec<QuestLog>>, StorageError> {
        (**self).read()
    }

    fn write(&self, logs: &[QuestLog]) -> Result<(), StorageError> {
        (**self).write(logs)
    }
}
