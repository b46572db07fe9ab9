//! Package.json parse cache.
//!
//! Parsed package boundaries are consulted on every bare-specifier walk and
//! every `.js` classification, so parses are cached keyed by path with
//! mtime/size stamps for invalidation. The cache is flushed together with
//! the module cache.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// File stamp for cache invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PkgJsonStamp {
    /// Modification time in milliseconds since epoch.
    pub mtime_ms: Option<u64>,
    /// File size in bytes.
    pub size: Option<u64>,
}

impl PkgJsonStamp {
    /// Create stamp from a path by reading its metadata.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_path(path: &Path) -> Self {
        if let Ok(meta) = path.metadata() {
            let mtime_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64);
            Self {
                mtime_ms,
                size: Some(meta.len()),
            }
        } else {
            Self::default()
        }
    }

    /// Check if the stamp matches the current file state.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(meta) = path.metadata() else {
            return false;
        };

        if let Some(expected_mtime) = self.mtime_ms {
            let current_mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64);
            if current_mtime != Some(expected_mtime) {
                return false;
            }
        }

        if let Some(expected_size) = self.size {
            if meta.len() != expected_size {
                return false;
            }
        }

        true
    }
}

/// Trait for caching parsed package.json files.
///
/// Implementations must be thread-safe; `get` must not return stale entries
/// for files that changed on disk.
pub trait PkgJsonCache: Send + Sync + std::fmt::Debug {
    /// Look up a cached package.json by path, validating freshness.
    fn get(&self, path: &Path) -> Option<Value>;

    /// Store a parsed package.json in the cache.
    fn set(&self, path: &Path, value: Value);

    /// Drop all cached entries.
    fn clear(&self);
}

/// No-op cache implementation (always misses, never stores).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPkgJsonCache;

impl PkgJsonCache for NoPkgJsonCache {
    fn get(&self, _path: &Path) -> Option<Value> {
        None
    }

    fn set(&self, _path: &Path, _value: Value) {
        // No-op
    }

    fn clear(&self) {
        // No-op
    }
}

/// Stamped in-memory cache.
#[derive(Debug, Default)]
pub struct InMemoryPkgJsonCache {
    entries: RwLock<HashMap<PathBuf, CachedEntry>>,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    value: Value,
    stamp: PkgJsonStamp,
}

impl InMemoryPkgJsonCache {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (test/diagnostic aid).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PkgJsonCache for InMemoryPkgJsonCache {
    fn get(&self, path: &Path) -> Option<Value> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(path)?;
        if entry.stamp.matches(path) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn set(&self, path: &Path, value: Value) {
        let stamp = PkgJsonStamp::from_path(path);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(path.to_path_buf(), CachedEntry { value, stamp });
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
