//! Key/value store interface
//!
//! Task state is checkpointed as opaque blobs under string keys. The store
//! contract is the one of a Redis client: get, set, delete and KEYS-style
//! glob enumeration.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use thiserror::Error;

/// Key/value store error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvStoreError {
    #[error("Store not connected")]
    NotConnected,
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Read failed for {key}: {reason}")]
    ReadFailed { key: String, reason: String },
    #[error("Write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },
    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations
pub type KvResult<T> = Result<T, KvStoreError>;

/// Blocking key/value store client
pub trait KvStore: Send + Sync {
    /// Value stored under `key`, `None` if absent
    fn read(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    fn write(&self, key: &str, value: &[u8]) -> KvResult<()>;

    /// Returns whether the key existed
    fn delete(&self, key: &str) -> KvResult<bool>;

    /// Keys matching a glob (`*` any run, `?` one character), sorted
    fn get_keys(&self, pattern: &str) -> KvResult<Vec<String>>;

    fn is_connected(&self) -> bool;
}

/// Match `key` against a KEYS-style glob
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    let (mut pi, mut ki) = (0usize, 0usize);
    // Last '*' seen and the key position it is currently absorbing up to
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
        } else if let Some((sp, sk)) = star {
            pi = sp + 1;
            ki = sk + 1;
            star = Some((sp, sk + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// In-process store, used when no external store is configured and in tests
#[derive(Debug)]
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    connected: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            connected: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }

    /// Simulate losing (or regaining) the connection
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_connected(&self) -> KvResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KvStoreError::NotConnected)
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryKvStore {
    fn read(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        self.check_connected()?;
        let entries = self.entries.read().map_err(|_| KvStoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.check_connected()?;
        let mut entries = self.entries.write().map_err(|_| KvStoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        log::trace!("kvstore write {} ({} bytes)", key, value.len());
        Ok(())
    }

    fn delete(&self, key: &str) -> KvResult<bool> {
        self.check_connected()?;
        let mut entries = self.entries.write().map_err(|_| KvStoreError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn get_keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        self.check_connected()?;
        let entries = self.entries.read().map_err(|_| KvStoreError::LockPoisoned)?;
        Ok(entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
