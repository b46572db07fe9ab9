use crate::format::ModuleFormat;
use std::path::PathBuf;
use thiserror::Error;

/// Typed resolution failures.
///
/// Every variant is `Clone` so terminal errors can be cached on a module
/// record and replayed to later requesters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("cannot find module '{specifier}'{}", format_tried(.tried))]
    NotFound {
        specifier: String,
        /// Candidate paths probed before giving up (capped).
        tried: Vec<PathBuf>,
    },

    #[error("subpath '{subpath}' is not exported by package at {package_path}")]
    NotExported {
        specifier: String,
        package_path: PathBuf,
        subpath: String,
    },

    #[error("unknown builtin module '{name}'")]
    UnknownBuiltin { name: String },

    #[error("invalid module specifier '{specifier}': {reason}")]
    InvalidSpecifier { specifier: String, reason: String },

    #[error("malformed package boundary at {path}: {detail}")]
    PackageBoundaryMalformed { path: PathBuf, detail: String },
}

fn format_tried(tried: &[PathBuf]) -> String {
    if tried.is_empty() {
        String::new()
    } else {
        let list = tried
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!(" (tried: {list})")
    }
}

/// Format-related failures, raised at instantiation time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("source of {identity} is not valid {declared}: {detail}")]
    FormatMismatch {
        identity: String,
        declared: ModuleFormat,
        detail: String,
    },
}
