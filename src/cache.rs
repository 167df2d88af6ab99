use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Bytes and content type of one served file. Immutable once stored; a fresh
/// read of the same path replaces the entry wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub content: Vec<u8>,
    pub content_type: String,
}

/// In-memory store of file contents keyed by resolved absolute path.
///
/// There is no eviction and no TTL; entries live for the process lifetime.
/// Suited to trees that fit comfortably in memory. Bounded-memory deployments
/// need an eviction layer this crate does not provide.
#[derive(Default)]
pub struct ContentCache {
    entries: RwLock<FxHashMap<PathBuf, Arc<CacheEntry>>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, path: &Path) -> Option<Arc<CacheEntry>> {
        self.entries.read().get(path).cloned()
    }

    // Two requests racing to fill the same cold path both land here; last
    // writer wins, and identical bytes make the race unobservable.
    pub fn store(&self, path: PathBuf, entry: Arc<CacheEntry>) {
        self.entries.write().insert(path, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
