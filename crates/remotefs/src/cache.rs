//! Bounded on-disk content cache with LRU eviction.
//!
//! Cache files are content-addressed by the SHA-256 of the relative key, so
//! a given key always maps to the same destination path. A single mutex
//! guards the entry map, the recency order, and the byte counter; the fetch
//! callback runs outside the lock, which means two concurrent misses on the
//! same key may both fetch. The second writer overwrites the first with
//! identical bytes, and accounting collapses the duplicate entry.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::FsError;

struct CacheEntry {
    disk_path: PathBuf,
    size: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Recency order, most recently used first.
    order: VecDeque<String>,
    used: u64,
}

/// Disk-backed LRU cache with a hard byte budget.
pub struct ContentCache {
    dir: PathBuf,
    /// Maximum resident bytes; 0 disables the quota.
    max_bytes: u64,
    state: Mutex<CacheState>,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, FsError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_bytes,
            state: Mutex::new(CacheState::default()),
        })
    }

    /// Deterministic destination path for a key.
    fn key_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(name)
    }

    /// Return the on-disk path for `key`, fetching it first if absent.
    ///
    /// On a miss the destination file is created (truncating any stale
    /// content), handed to `fetch` to populate, and inserted under the quota
    /// discipline. The reported size is re-read from disk rather than
    /// trusted from the callback. On any failure the partial file is removed
    /// and the map is left untouched.
    pub async fn load_or_create<F, Fut>(&self, key: &str, fetch: F) -> Result<PathBuf, FsError>
    where
        F: FnOnce(tokio::fs::File) -> Fut,
        Fut: Future<Output = Result<u64, FsError>>,
    {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(entry) = state.entries.get(key) {
                let path = entry.disk_path.clone();
                promote(&mut state.order, key);
                return Ok(path);
            }
        }

        let path = self.key_path(key);
        let file = tokio::fs::File::create(&path).await?;
        if let Err(e) = fetch(file).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        let size = match tokio::fs::metadata(&path).await {
            Ok(md) => md.len(),
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }
        };

        let mut state = self.state.lock().unwrap();
        if let Err(e) = ensure_capacity(&mut state, self.max_bytes, size) {
            drop(state);
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        // A racing fetch for the same key may have landed first; fold its
        // accounting into ours before inserting.
        if let Some(prev) = state.entries.remove(key) {
            state.used -= prev.size;
            forget(&mut state.order, key);
        }
        state.order.push_front(key.to_string());
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                disk_path: path.clone(),
                size,
            },
        );
        state.used += size;
        debug!(key, size, used = state.used, "cached object");
        Ok(path)
    }

    /// Mark `key` as recently used. No-op for non-resident keys.
    pub fn touch(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        if state.entries.contains_key(key) {
            promote(&mut state.order, key);
        }
    }

    /// Evict `key` immediately, removing its backing file.
    pub fn remove(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.remove(key) {
            let _ = std::fs::remove_file(&entry.disk_path);
            state.used -= entry.size;
            forget(&mut state.order, key);
        }
    }

    /// Whether `key` currently has a resident entry.
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().unwrap().entries.contains_key(key)
    }

    /// Total bytes currently accounted for.
    pub fn used_bytes(&self) -> u64 {
        self.state.lock().unwrap().used
    }
}

/// Evict from the LRU tail until `need` more bytes fit. Fails without
/// evicting further once the cache is empty and the object still does not
/// fit on its own.
fn ensure_capacity(state: &mut CacheState, max_bytes: u64, need: u64) -> Result<(), FsError> {
    if max_bytes == 0 {
        return Ok(());
    }
    while state.used + need > max_bytes {
        let Some(victim) = state.order.pop_back() else {
            break;
        };
        if let Some(entry) = state.entries.remove(&victim) {
            let _ = std::fs::remove_file(&entry.disk_path);
            state.used -= entry.size;
            debug!(key = victim.as_str(), size = entry.size, "evicted");
        }
    }
    if state.used + need > max_bytes {
        return Err(FsError::CapacityExceeded {
            max: max_bytes,
            needed: state.used + need,
        });
    }
    Ok(())
}

fn promote(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        let k = order.remove(pos).unwrap();
        order.push_front(k);
    }
}

fn forget(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
}
