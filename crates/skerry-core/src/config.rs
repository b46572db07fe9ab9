use crate::scan::RequestKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default extensions for probing.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".json"];

/// Default base conditions for exports-map resolution.
///
/// The request kind prepends `import` or `require`; see
/// [`LoaderConfig::conditions_for`].
pub const DEFAULT_CONDITIONS: &[&str] = &["node", "default"];

/// Loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Root directory for entry-point resolution.
    pub root: PathBuf,

    /// Extensions to probe (in order).
    pub extensions: Vec<String>,

    /// Base condition set, appended after the kind-derived condition.
    pub conditions: Vec<String>,

    /// Skip canonicalization of resolved paths.
    pub preserve_symlinks: bool,

    /// Classify extensionless files outside any package boundary as
    /// CommonJS (legacy mode). When false they classify as ESM.
    pub legacy_extensionless_commonjs: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            conditions: DEFAULT_CONDITIONS.iter().map(ToString::to_string).collect(),
            preserve_symlinks: false,
            legacy_extensionless_commonjs: true,
        }
    }
}

impl LoaderConfig {
    /// Create a config rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// The full condition set for a request of the given kind.
    ///
    /// The kind-derived condition comes first so `import`/`require`
    /// branches win over the base set when an exports map lists both.
    #[must_use]
    pub fn conditions_for(&self, kind: RequestKind) -> Vec<String> {
        let mut conditions = Vec::with_capacity(self.conditions.len() + 1);
        conditions.push(kind.condition().to_string());
        for c in &self.conditions {
            if c != kind.condition() {
                conditions.push(c.clone());
            }
        }
        conditions
    }
}
