//! Module exports namespaces.
//!
//! A namespace is shared by reference: during a dependency cycle the
//! partially populated map is observed live, and every requester of an
//! identity sees the same object for the lifetime of its record. Cache
//! invalidation never mutates a namespace in place; holders of a stale
//! reference keep the pre-invalidation snapshot.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared, live map of export name to value.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl Namespace {
    /// Create an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an export by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Whether an export is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Bind an export.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value);
    }

    /// Export names in sorted order.
    #[must_use]
    pub fn export_names(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of bound exports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no exports are bound yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detached copy of the current bindings.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether two handles refer to the same namespace object.
    #[must_use]
    pub fn same(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}
