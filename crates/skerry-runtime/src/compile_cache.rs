//! Per-process compile cache.
//!
//! Keyed by resolved identity, validated by a BLAKE3 digest of the loaded
//! source: an entry is served only while the fresh source still hashes to
//! the digest recorded at instantiation. Invalidated per identity or
//! wholesale, together with the module cache. No on-disk format.

use crate::executor::ModuleInfo;
use crate::source::ModuleSource;
use dashmap::DashMap;
use skerry_core::ModuleIdentity;
use skerry_util::hash::{digest_matches, source_digest};

#[derive(Debug, Clone)]
struct CompiledEntry {
    digest: String,
    info: ModuleInfo,
}

/// In-memory instantiation cache.
#[derive(Debug, Default)]
pub struct CompileCache {
    entries: DashMap<ModuleIdentity, CompiledEntry>,
}

impl CompileCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached instantiation, validating the source digest.
    #[must_use]
    pub fn lookup(&self, identity: &ModuleIdentity, source: &ModuleSource) -> Option<ModuleInfo> {
        let entry = self.entries.get(identity)?;
        if digest_matches(source.as_bytes(), &entry.digest) {
            tracing::trace!(identity = %identity, "compile cache hit");
            Some(entry.info.clone())
        } else {
            tracing::trace!(identity = %identity, "compile cache stale");
            None
        }
    }

    /// Store an instantiation result.
    pub fn store(&self, identity: &ModuleIdentity, source: &ModuleSource, info: ModuleInfo) {
        self.entries.insert(
            identity.clone(),
            CompiledEntry {
                digest: source_digest(source.as_bytes()),
                info,
            },
        );
    }

    /// Drop the entry for one identity.
    pub fn invalidate(&self, identity: &ModuleIdentity) {
        self.entries.remove(identity);
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
