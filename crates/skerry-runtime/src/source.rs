//! Source providers.
//!
//! A provider turns a resolved identity into raw source. Filesystem and
//! in-memory implementations are provided; network or synthetic providers
//! are equally valid implementations of the same trait.

use skerry_core::ModuleIdentity;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Raw module source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// Source text (the common case).
    Text(String),
    /// Binary source (wasm).
    Bytes(Vec<u8>),
}

impl ModuleSource {
    /// View the source as text, lossily for binary payloads.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    /// View the source as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }
}

impl From<&str> for ModuleSource {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ModuleSource {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Opaque provider failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("no source available for '{identity}'")]
    NotFound { identity: String },

    #[error("failed to read '{identity}': {message}")]
    Io { identity: String, message: String },

    #[error("provider does not handle '{identity}': {reason}")]
    Unsupported { identity: String, reason: String },
}

/// Trait for fetching raw source by resolved identity.
pub trait SourceProvider: Send + Sync + std::fmt::Debug {
    /// Fetch the source for an identity.
    fn fetch(&self, identity: &ModuleIdentity) -> Result<ModuleSource, SourceError>;
}

/// Filesystem provider for `file:` identities.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceProvider;

impl FsSourceProvider {
    /// Create a filesystem provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SourceProvider for FsSourceProvider {
    fn fetch(&self, identity: &ModuleIdentity) -> Result<ModuleSource, SourceError> {
        let path = identity
            .to_file_path()
            .ok_or_else(|| SourceError::Unsupported {
                identity: identity.to_string(),
                reason: "not a file identity".to_string(),
            })?;

        if identity.extension() == Some("wasm") {
            let bytes = std::fs::read(&path).map_err(|e| io_error(identity, &e))?;
            return Ok(ModuleSource::Bytes(bytes));
        }

        skerry_util::fs::read_to_string_lossy(&path)
            .map(ModuleSource::Text)
            .map_err(|e| io_error(identity, &e))
    }
}

fn io_error(identity: &ModuleIdentity, e: &std::io::Error) -> SourceError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SourceError::NotFound {
            identity: identity.to_string(),
        }
    } else {
        SourceError::Io {
            identity: identity.to_string(),
            message: e.to_string(),
        }
    }
}

/// In-memory provider: modules are served from a map without disk I/O.
///
/// Counts fetches so tests can assert the at-most-one-in-flight and
/// error-replay properties (the provider must not be re-invoked).
#[derive(Debug, Default)]
pub struct MemorySourceProvider {
    modules: RwLock<HashMap<String, ModuleSource>>,
    fetches: AtomicU64,
}

impl MemorySourceProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under an identity string.
    pub fn insert(&self, identity: impl Into<String>, source: impl Into<ModuleSource>) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.into(), source.into());
    }

    /// Total number of fetch calls observed.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SourceProvider for MemorySourceProvider {
    fn fetch(&self, identity: &ModuleIdentity) -> Result<ModuleSource, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity.as_str())
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                identity: identity.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_fs_provider_reads_text() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("mod.js");
        fs::write(&file, "module.exports = 1;").unwrap();

        let identity = ModuleIdentity::from_file_path(&file).unwrap();
        let source = FsSourceProvider::new().fetch(&identity).unwrap();
        assert_eq!(source.as_text(), "module.exports = 1;");
    }

    #[test]
    fn test_fs_provider_missing_file() {
        let identity =
            ModuleIdentity::from_file_path(Path::new("/definitely/not/here.js")).unwrap();
        let err = FsSourceProvider::new().fetch(&identity).unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[test]
    fn test_fs_provider_rejects_non_file() {
        let identity = ModuleIdentity::builtin("fs");
        let err = FsSourceProvider::new().fetch(&identity).unwrap_err();
        assert!(matches!(err, SourceError::Unsupported { .. }));
    }

    #[test]
    fn test_memory_provider_counts_fetches() {
        let provider = MemorySourceProvider::new();
        provider.insert("virt:a.mjs", "export const a = 1;");

        let identity = ModuleIdentity::parse("virt:a.mjs").unwrap();
        provider.fetch(&identity).unwrap();
        provider.fetch(&identity).unwrap();
        assert_eq!(provider.fetch_count(), 2);

        let missing = ModuleIdentity::parse("virt:missing.mjs").unwrap();
        assert!(matches!(
            provider.fetch(&missing),
            Err(SourceError::NotFound { .. })
        ));
        assert_eq!(provider.fetch_count(), 3);
    }
}
