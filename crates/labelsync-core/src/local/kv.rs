//! Synchronous key-value stores backing the on-device adapter
//!
//! Both stores are capacity-bounded and offer no prefix listing; the adapter
//! keeps its own session index.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use tracing::debug;

/// Longest encoded key kept verbatim in a file name
const MAX_ENCODED_KEY: usize = 180;

/// Verbatim prefix kept ahead of the digest for long keys
const DIGEST_PREFIX_LEN: usize = 120;

/// Minimal synchronous key-value store
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key succeeds
    fn remove(&self, key: &str) -> Result<()>;
}

fn check_quota(capacity: Option<usize>, used: usize, needed: usize) -> Result<()> {
    match capacity {
        Some(capacity) if used + needed > capacity => Err(Error::QuotaExceeded {
            needed,
            available: capacity.saturating_sub(used),
        }),
        _ => Ok(()),
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl MemoryKvStore {
    /// Create an unbounded store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `bytes` of keys plus values
    #[must_use]
    pub fn with_capacity_bytes(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity_bytes: Some(bytes),
        }
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;

        let used: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        check_quota(self.capacity_bytes, used, key.len() + value.len())?;

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

/// Directory-backed store, one file per key
///
/// Writes go to a temporary file that is renamed over the target, so a
/// failed write never leaves a half-written value behind.
#[derive(Debug)]
pub struct FileKvStore {
    dir: PathBuf,
    capacity_bytes: Option<usize>,
}

impl FileKvStore {
    /// Open (and create) a store rooted at `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("cannot create {}: {}", dir.display(), e)))?;
        debug!(dir = %dir.display(), "Opened file key-value store");
        Ok(Self {
            dir,
            capacity_bytes: None,
        })
    }

    /// Bound the total size of stored values
    #[must_use]
    pub fn with_capacity_bytes(mut self, bytes: usize) -> Self {
        self.capacity_bytes = Some(bytes);
        self
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || byte == b'.' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        if name.len() > MAX_ENCODED_KEY {
            let mut hasher = Sha256::new();
            hasher.update(key.as_bytes());
            let digest = hasher.finalize();
            name.truncate(DIGEST_PREFIX_LEN);
            name.push('~');
            name.push_str(&format!("{:x}", digest));
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    fn used_bytes(&self, excluding: &Path) -> Result<usize> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| Error::Storage(format!("cannot list {}: {}", self.dir.display(), e)))?;

        let mut total = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path == excluding || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                total += meta.len() as usize;
            }
        }
        Ok(total)
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("read {} failed: {}", key, e))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        if self.capacity_bytes.is_some() {
            check_quota(self.capacity_bytes, self.used_bytes(&path)?, value.len())?;
        }

        let tmp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, value)
            .map_err(|e| Error::Storage(format!("write {} failed: {}", key, e)))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::Storage(format!("commit {} failed: {}", key, e)));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("remove {} failed: {}", key, e))),
        }
    }
}
