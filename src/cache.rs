//! Cache stores behind the caching backend.
//!
//! A cache store is a dumb byte map: `get(key) -> bytes | miss` and
//! `set(key, bytes)`. It never decides what gets cached; that is the job of
//! [`CachingBackend`](crate::backend::CachingBackend), which reads through it
//! and only ever populates it with successful fetches.
//!
//! # Stores
//!
//! - [`RawFileCache`]: one file per entry under a root directory.
//! - [`MemoryCache`]: a bounded in-process LRU.
//!
//! ## Keys
//!
//! Keys are [`ImagePath::cache_key`](crate::types::ImagePath::cache_key)
//! strings (`"{prefix}/{path}"`), so two stacks requesting the same path
//! never share an entry. The file store does not use the key as a path; it
//! stores each entry at `root/<first two hex chars>/<sha256(key)>`, which
//! keeps arbitrary keys filesystem-safe and spreads entries over 256
//! directories.
//!
//! ## Atomicity
//!
//! Concurrent misses on the same key may both populate the entry; the last
//! writer wins. File entries are written to a temp file and renamed into
//! place, so a reader sees either the old bytes or the new ones, never a
//! partial write.

use lru::LruCache;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Entries kept by a [`MemoryCache`] when no capacity is configured.
pub const DEFAULT_MEMORY_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte store used by the caching backend.
pub trait CacheStore: Send + Sync {
    /// Bytes stored under `key`, or `None` on a miss.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `bytes` under `key`, replacing any previous entry.
    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError>;
}

// ============================================================================
// RawFileCache
// ============================================================================

/// File-per-entry cache rooted at a directory.
#[derive(Debug)]
pub struct RawFileCache {
    root: PathBuf,
}

impl RawFileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the entry for `key` lives on disk.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hash_key(key);
        self.root.join(&digest[..2]).join(digest)
    }
}

impl CacheStore for RawFileCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match std::fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        crate::storage::write_atomic(&self.entry_path(key), bytes)?;
        Ok(())
    }
}

/// SHA-256 of a cache key, returned as a hex string.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

// ============================================================================
// MemoryCache
// ============================================================================

/// Bounded in-memory LRU cache.
pub struct MemoryCache {
    entries: RwLock<LruCache<String, Vec<u8>>>,
    capacity: NonZeroUsize,
}

impl MemoryCache {
    /// A zero capacity falls back to [`DEFAULT_MEMORY_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_MEMORY_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        // LRU lookups reorder entries, so reads need the write lock
        Ok(self.entries.write().get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        self.entries.write().put(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

// ============================================================================
// CacheStats
// ============================================================================

/// Hit/miss counters for a caching backend. Safe to bump from many threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "no lookups");
        }
        write!(
            f,
            "{} cached, {} fetched ({} total)",
            self.hits(),
            self.misses(),
            self.total()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // =========================================================================
    // RawFileCache
    // =========================================================================

    #[test]
    fn raw_file_miss_on_empty_root() {
        let tmp = TempDir::new().unwrap();
        let cache = RawFileCache::new(tmp.path());
        assert_eq!(cache.get("s/a.jpg").unwrap(), None);
    }

    #[test]
    fn raw_file_set_then_get() {
        let tmp = TempDir::new().unwrap();
        let cache = RawFileCache::new(tmp.path());
        cache.set("s/a.jpg", b"bytes").unwrap();
        assert_eq!(cache.get("s/a.jpg").unwrap().as_deref(), Some(&b"bytes"[..]));
    }

    #[test]
    fn raw_file_entries_are_sharded_by_hash() {
        let tmp = TempDir::new().unwrap();
        let cache = RawFileCache::new(tmp.path());
        cache.set("../../etc/passwd", b"x").unwrap();

        let path = cache.entry_path("../../etc/passwd");
        let digest = hash_key("../../etc/passwd");
        assert!(path.starts_with(tmp.path()));
        assert_eq!(path, tmp.path().join(&digest[..2]).join(&digest));
        assert!(path.exists());
    }

    #[test]
    fn raw_file_set_overwrites() {
        let tmp = TempDir::new().unwrap();
        let cache = RawFileCache::new(tmp.path());
        cache.set("k", b"old").unwrap();
        cache.set("k", b"new").unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn raw_file_keys_are_namespaced() {
        let tmp = TempDir::new().unwrap();
        let cache = RawFileCache::new(tmp.path());
        cache.set("a/cat.jpg", b"a").unwrap();
        assert_eq!(cache.get("b/cat.jpg").unwrap(), None);
    }

    #[test]
    fn raw_file_unreadable_entry_is_error() {
        let tmp = TempDir::new().unwrap();
        let cache = RawFileCache::new(tmp.path());
        // A directory where the entry file should be
        fs::create_dir_all(cache.entry_path("k")).unwrap();
        assert!(cache.get("k").is_err());
    }

    // =========================================================================
    // MemoryCache
    // =========================================================================

    #[test]
    fn memory_set_then_get() {
        let cache = MemoryCache::default();
        assert_eq!(cache.get("k").unwrap(), None);
        cache.set("k", b"v").unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn memory_evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        cache.set("a", b"1").unwrap();
        cache.set("b", b"2").unwrap();
        // Touch "a" so "b" becomes the eviction candidate
        cache.get("a").unwrap();
        cache.set("c", b"3").unwrap();

        assert!(cache.get("a").unwrap().is_some());
        assert!(cache.get("b").unwrap().is_none());
        assert!(cache.get("c").unwrap().is_some());
    }

    #[test]
    fn memory_zero_capacity_uses_default() {
        assert_eq!(MemoryCache::new(0).capacity(), DEFAULT_MEMORY_CAPACITY);
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display() {
        let stats = CacheStats::default();
        assert_eq!(stats.to_string(), "no lookups");
        stats.hit();
        stats.hit();
        stats.miss();
        assert_eq!(stats.to_string(), "2 cached, 1 fetched (3 total)");
    }
}
