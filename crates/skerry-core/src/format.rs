//! Module format classification.
//!
//! Classification is derived from identity metadata only: a hook-supplied
//! format wins outright, then the extension, then the package boundary's
//! declared type. Source syntax is never inspected here; a mis-declared
//! format surfaces as `FormatMismatch` at instantiation time.

use crate::config::LoaderConfig;
use crate::identity::ModuleIdentity;
use serde::{Deserialize, Serialize};

/// Format of a classified module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// CommonJS: synchronous evaluation, no top-level suspension.
    CommonJs,
    /// ES module: microtask-deferred evaluation, may suspend at top level.
    Esm,
    /// Host-provided builtin, no source text.
    Builtin,
    /// JSON module (synthetic: parsed value exposed as default export).
    Json,
    /// WebAssembly module.
    Wasm,
}

impl ModuleFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommonJs => "commonjs",
            Self::Esm => "module",
            Self::Builtin => "builtin",
            Self::Json => "json",
            Self::Wasm => "wasm",
        }
    }
}

impl std::fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Package boundary `type` field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageType {
    Module,
    CommonJs,
}

impl PackageType {
    /// Parse a package.json `type` field value.
    #[must_use]
    pub fn from_field(value: &str) -> Option<Self> {
        match value {
            "module" => Some(Self::Module),
            "commonjs" => Some(Self::CommonJs),
            _ => None,
        }
    }
}

/// Classify a resolved identity.
///
/// Precedence: `hook_format` wins outright; then the builtin scheme; then
/// the extension, with `.js` and extensionless files falling through to the
/// package boundary type and finally the legacy CommonJS default.
#[must_use]
pub fn classify(
    identity: &ModuleIdentity,
    hook_format: Option<ModuleFormat>,
    package_type: Option<PackageType>,
    config: &LoaderConfig,
) -> ModuleFormat {
    if let Some(format) = hook_format {
        return format;
    }

    if identity.builtin_name().is_some() {
        return ModuleFormat::Builtin;
    }

    match identity.extension() {
        Some("mjs") => ModuleFormat::Esm,
        Some("cjs") => ModuleFormat::CommonJs,
        Some("json") => ModuleFormat::Json,
        Some("wasm") => ModuleFormat::Wasm,
        _ => match package_type {
            Some(PackageType::Module) => ModuleFormat::Esm,
            Some(PackageType::CommonJs) => ModuleFormat::CommonJs,
            None if config.legacy_extensionless_commonjs => ModuleFormat::CommonJs,
            None => ModuleFormat::Esm,
        },
    }
}
