//! Canonical module identities and referrer context.

use crate::format::ModuleFormat;
use std::path::{Path, PathBuf};
use url::Url;

/// Canonical, deduplicated key for a module after resolution.
///
/// Wraps a URL: `file:` for disk modules, `node:` for builtins, and any
/// other scheme for identities synthesized by resolve hooks. Two requests
/// that resolve to the same identity observe the same module record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleIdentity(Url);

impl ModuleIdentity {
    /// Parse an identity from a URL string.
    ///
    /// Returns `None` if the string is not a valid URL.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        Url::parse(input).ok().map(Self)
    }

    /// Build a `file:` identity from an absolute path.
    ///
    /// Returns `None` if the path is not absolute.
    #[must_use]
    pub fn from_file_path(path: &Path) -> Option<Self> {
        Url::from_file_path(path).ok().map(Self)
    }

    /// Build a builtin identity (`node:<name>`) for a registered builtin.
    #[must_use]
    pub fn builtin(name: &str) -> Self {
        // node: URLs are opaque (non-special scheme); this parse cannot fail
        // for the identifier-shaped names the builtin registry holds.
        Self(Url::parse(&format!("node:{name}")).unwrap_or_else(|_| {
            // Unreachable for registry names; keep a deterministic fallback.
            Url::parse("node:invalid").expect("static URL")
        }))
    }

    /// The identity's URL scheme (`file`, `node`, ...).
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// The builtin name if this is a `node:` identity.
    #[must_use]
    pub fn builtin_name(&self) -> Option<&str> {
        (self.0.scheme() == "node").then(|| self.0.path())
    }

    /// Convert a `file:` identity back to a filesystem path.
    #[must_use]
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.0.scheme() == "file" {
            self.0.to_file_path().ok()
        } else {
            None
        }
    }

    /// The final extension of the identity's path, if any.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let path = self.0.path();
        let file = path.rsplit('/').next()?;
        let dot = file.rfind('.')?;
        if dot == 0 {
            return None;
        }
        Some(&file[dot + 1..])
    }

    /// The identity as a string (stable across the record's lifetime).
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Borrow the underlying URL.
    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl std::fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Url> for ModuleIdentity {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

/// Context describing the module that issued a request.
///
/// Owned by the caller; the resolver only reads it.
#[derive(Debug, Clone, Default)]
pub struct ReferrerContext {
    /// Identity of the requesting module, or `None` for entry points.
    pub referrer: Option<ModuleIdentity>,
    /// Format of the requesting module, when known.
    pub format: Option<ModuleFormat>,
    /// Active conditions for exports-map resolution, in priority-set order
    /// (e.g. `["import", "node", "default"]`).
    pub conditions: Vec<String>,
}

impl ReferrerContext {
    /// Context for a root request (no referrer).
    #[must_use]
    pub fn root(conditions: Vec<String>) -> Self {
        Self {
            referrer: None,
            format: None,
            conditions,
        }
    }

    /// Directory to resolve relative specifiers against, if the referrer
    /// is a disk module.
    #[must_use]
    pub fn referrer_dir(&self) -> Option<PathBuf> {
        self.referrer
            .as_ref()
            .and_then(ModuleIdentity::to_file_path)
            .and_then(|p| p.parent().map(Path::to_path_buf))
    }
}
