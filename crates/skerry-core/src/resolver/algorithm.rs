//! Specifier resolution algorithm.
//!
//! Supports:
//! - Relative specifiers: `./`, `../`
//! - Absolute filesystem specifiers and `file:` URLs
//! - Bare specifiers with `node_modules` lookup (scoped packages included)
//! - Extension probing and directory resolution (`index.*`, package `main`)
//! - package.json `exports` (root, subpath, pattern keys, conditions)
//! - package.json `imports` (`#`-prefixed specifiers)
//! - Builtin-namespace specifiers (`node:` prefix and bare aliases)
//!
//! Resolution is a pure function of (specifier, referrer context,
//! conditions) plus read-only existence probes; it performs no other I/O.

use super::exports::{resolve_exports, resolve_imports, ExportsLookup};
use super::pkg_json_cache::PkgJsonCache;
use crate::builtins::BuiltinRegistry;
use crate::config::LoaderConfig;
use crate::error::ResolveError;
use crate::format::PackageType;
use crate::identity::ModuleIdentity;
use serde_json::Value;
use std::path::{Path, PathBuf};
use url::Url;

/// Maximum number of probed candidate paths to record in errors.
const MAX_TRIED_PATHS: usize = 20;

/// Syntactic class of a specifier, determined before any probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// Reserved builtin namespace (`node:fs`).
    Builtin,
    /// Full URL (`file:///...`).
    Url,
    /// Absolute filesystem path.
    Absolute,
    /// Relative path (`./`, `../`).
    Relative,
    /// Package-internal `#` specifier (imports map).
    PackageInternal,
    /// Bare package name, optionally scoped and with a subpath.
    Bare,
}

/// Classify a specifier string.
#[must_use]
pub fn classify_specifier(specifier: &str) -> SpecifierKind {
    if specifier.starts_with("node:") {
        SpecifierKind::Builtin
    } else if specifier.contains("://") {
        SpecifierKind::Url
    } else if specifier.starts_with('#') {
        SpecifierKind::PackageInternal
    } else if specifier.starts_with("./") || specifier.starts_with("../") {
        SpecifierKind::Relative
    } else if is_absolute_path(specifier) {
        SpecifierKind::Absolute
    } else {
        SpecifierKind::Bare
    }
}

/// Context for a single resolution.
#[derive(Debug, Clone)]
pub struct ResolveContext<'a> {
    /// Directory containing the importing module (or the loader root).
    pub parent_dir: PathBuf,
    /// Active conditions, highest priority first.
    pub conditions: &'a [String],
    /// Loader configuration (extensions, symlink policy).
    pub config: &'a LoaderConfig,
    /// Builtin registry for namespace lookups.
    pub builtins: &'a BuiltinRegistry,
    /// Optional package.json parse cache.
    pub pkg_json_cache: Option<&'a dyn PkgJsonCache>,
}

/// Resolve a specifier to a canonical module identity.
pub fn resolve(ctx: &ResolveContext<'_>, specifier: &str) -> Result<ModuleIdentity, ResolveError> {
    if specifier.is_empty() {
        return Err(ResolveError::InvalidSpecifier {
            specifier: specifier.to_string(),
            reason: "empty specifier".to_string(),
        });
    }

    let kind = classify_specifier(specifier);
    tracing::trace!(specifier, ?kind, "resolving");

    let mut tried = Vec::new();
    let resolved = match kind {
        SpecifierKind::Builtin => {
            let name = specifier.trim_start_matches("node:");
            return ctx
                .builtins
                .identity(name)
                .ok_or_else(|| ResolveError::UnknownBuiltin {
                    name: specifier.to_string(),
                });
        }
        SpecifierKind::Url => {
            let url = Url::parse(specifier).map_err(|e| ResolveError::InvalidSpecifier {
                specifier: specifier.to_string(),
                reason: e.to_string(),
            })?;
            if url.scheme() != "file" {
                return Err(ResolveError::InvalidSpecifier {
                    specifier: specifier.to_string(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            let path = url
                .to_file_path()
                .map_err(|()| ResolveError::InvalidSpecifier {
                    specifier: specifier.to_string(),
                    reason: "not a local file URL".to_string(),
                })?;
            resolve_path(ctx, specifier, &path, &mut tried)?
        }
        SpecifierKind::PackageInternal => {
            return resolve_package_internal(ctx, specifier, &mut tried);
        }
        SpecifierKind::Relative => {
            let base = ctx.parent_dir.join(specifier);
            resolve_path(ctx, specifier, &base, &mut tried)?
        }
        SpecifierKind::Absolute => {
            resolve_path(ctx, specifier, &PathBuf::from(specifier), &mut tried)?
        }
        SpecifierKind::Bare => {
            // Builtins win for bare names before any node_modules walk.
            if let Some(identity) = ctx.builtins.identity(specifier) {
                return Ok(identity);
            }
            return resolve_bare(ctx, specifier, &mut tried);
        }
    };

    match resolved {
        Some(path) => finish(ctx, &path),
        None => Err(ResolveError::NotFound {
            specifier: specifier.to_string(),
            tried,
        }),
    }
}

/// Find the declared package type for a disk module.
///
/// Walks from the module's directory to the filesystem root looking for
/// the nearest package boundary; returns its `type` field. Lenient:
/// malformed boundaries classify as `None` rather than failing, matching
/// classification's identity-metadata-only contract.
#[must_use]
pub fn package_type_for(
    path: &Path,
    cache: Option<&dyn PkgJsonCache>,
) -> Option<PackageType> {
    let mut current = path.parent();
    while let Some(dir) = current {
        let pkg_json_path = dir.join("package.json");
        if pkg_json_path.is_file() {
            let pkg = read_pkg_json_lenient(&pkg_json_path, cache)?;
            return pkg
                .get("type")
                .and_then(Value::as_str)
                .and_then(PackageType::from_field);
        }
        current = dir.parent();
    }
    None
}

/// Check if a specifier is an absolute path.
fn is_absolute_path(spec: &str) -> bool {
    if spec.starts_with('/') {
        return true;
    }

    // Windows absolute: C:\, D:/, etc.
    let chars: Vec<char> = spec.chars().collect();
    if chars.len() >= 3
        && chars[0].is_ascii_alphabetic()
        && chars[1] == ':'
        && (chars[2] == '\\' || chars[2] == '/')
    {
        return true;
    }

    spec.starts_with("\\\\")
}

/// Read and parse package.json; malformed content is an error.
fn read_package_json(
    path: &Path,
    cache: Option<&dyn PkgJsonCache>,
) -> Result<Option<Value>, ResolveError> {
    if !path.is_file() {
        return Ok(None);
    }
    if let Some(c) = cache {
        if let Some(value) = c.get(path) {
            return Ok(Some(value));
        }
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| ResolveError::PackageBoundaryMalformed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    let value: Value =
        serde_json::from_str(&content).map_err(|e| ResolveError::PackageBoundaryMalformed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if let Some(c) = cache {
        c.set(path, value.clone());
    }
    Ok(Some(value))
}

/// Lenient package.json read for classification walks.
fn read_pkg_json_lenient(path: &Path, cache: Option<&dyn PkgJsonCache>) -> Option<Value> {
    if let Some(c) = cache {
        if let Some(value) = c.get(path) {
            return Some(value);
        }
    }
    let content = std::fs::read_to_string(path).ok()?;
    let value: Value = serde_json::from_str(&content).ok()?;
    if let Some(c) = cache {
        c.set(path, value.clone());
    }
    Some(value)
}

/// Record a probed candidate (capped).
fn add_tried(tried: &mut Vec<PathBuf>, path: &Path) {
    if tried.len() < MAX_TRIED_PATHS {
        tried.push(path.to_path_buf());
    }
}

/// Probe a path: exact file, appended extensions, then directory entry.
fn resolve_path(
    ctx: &ResolveContext<'_>,
    specifier: &str,
    base: &Path,
    tried: &mut Vec<PathBuf>,
) -> Result<Option<PathBuf>, ResolveError> {
    add_tried(tried, base);
    if base.is_file() {
        return Ok(Some(base.to_path_buf()));
    }

    if base.is_dir() {
        return resolve_directory(ctx, specifier, base, tried);
    }

    // Append extensions (never replaces an existing one).
    for ext in &ctx.config.extensions {
        let mut candidate = base.as_os_str().to_owned();
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        add_tried(tried, &candidate);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Resolve a directory: package exports root, then `main`, then `index.*`.
fn resolve_directory(
    ctx: &ResolveContext<'_>,
    specifier: &str,
    dir: &Path,
    tried: &mut Vec<PathBuf>,
) -> Result<Option<PathBuf>, ResolveError> {
    let pkg_json_path = dir.join("package.json");
    let pkg = read_package_json(&pkg_json_path, ctx.pkg_json_cache)?;

    if let Some(ref pkg) = pkg {
        match resolve_exports(pkg, ".", ctx.conditions) {
            ExportsLookup::Target(target) => {
                return probe_export_target(ctx, dir, &target, tried);
            }
            ExportsLookup::NoMatch => {
                return Err(ResolveError::NotExported {
                    specifier: specifier.to_string(),
                    package_path: dir.to_path_buf(),
                    subpath: ".".to_string(),
                });
            }
            ExportsLookup::NoMap => {}
        }
    }

    legacy_directory(ctx, dir, pkg.as_ref(), tried)
}

/// Legacy directory entry: `main` field with probing, then `index.*`.
fn legacy_directory(
    ctx: &ResolveContext<'_>,
    dir: &Path,
    pkg: Option<&Value>,
    tried: &mut Vec<PathBuf>,
) -> Result<Option<PathBuf>, ResolveError> {
    if let Some(main) = pkg
        .and_then(|p| p.get("main"))
        .and_then(Value::as_str)
    {
        let main_path = dir.join(main);
        add_tried(tried, &main_path);
        if main_path.is_file() {
            return Ok(Some(main_path));
        }

        for ext in &ctx.config.extensions {
            let mut candidate = main_path.as_os_str().to_owned();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            add_tried(tried, &candidate);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }

        if main_path.is_dir() {
            for ext in &ctx.config.extensions {
                let index = main_path.join(format!("index{ext}"));
                add_tried(tried, &index);
                if index.is_file() {
                    return Ok(Some(index));
                }
            }
        }
    }

    for ext in &ctx.config.extensions {
        let index = dir.join(format!("index{ext}"));
        add_tried(tried, &index);
        if index.is_file() {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

/// Probe an exports-map target under a package directory.
fn probe_export_target(
    ctx: &ResolveContext<'_>,
    pkg_dir: &Path,
    target: &str,
    tried: &mut Vec<PathBuf>,
) -> Result<Option<PathBuf>, ResolveError> {
    let target_path = pkg_dir.join(target.trim_start_matches("./"));
    add_tried(tried, &target_path);
    if target_path.is_file() {
        return Ok(Some(target_path));
    }

    for ext in &ctx.config.extensions {
        let mut candidate = target_path.as_os_str().to_owned();
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        add_tried(tried, &candidate);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Resolve a `#`-prefixed specifier via the nearest package boundary's
/// `imports` field.
fn resolve_package_internal(
    ctx: &ResolveContext<'_>,
    specifier: &str,
    tried: &mut Vec<PathBuf>,
) -> Result<ModuleIdentity, ResolveError> {
    let mut current = Some(ctx.parent_dir.as_path());

    while let Some(dir) = current {
        let pkg_json_path = dir.join("package.json");
        if let Some(pkg) = read_package_json(&pkg_json_path, ctx.pkg_json_cache)? {
            if let Some(target) = resolve_imports(&pkg, specifier, ctx.conditions) {
                let base = dir.join(target.trim_start_matches("./"));
                return match resolve_path(ctx, specifier, &base, tried)? {
                    Some(path) => finish(ctx, &path),
                    None => Err(ResolveError::NotFound {
                        specifier: specifier.to_string(),
                        tried: tried.clone(),
                    }),
                };
            }
            // Nearest boundary owns #-specifiers; no match means not mapped.
            return Err(ResolveError::NotExported {
                specifier: specifier.to_string(),
                package_path: dir.to_path_buf(),
                subpath: specifier.to_string(),
            });
        }
        current = dir.parent();
    }

    Err(ResolveError::NotFound {
        specifier: specifier.to_string(),
        tried: tried.clone(),
    })
}

/// Resolve a bare specifier via `node_modules`, walking ancestor dirs.
fn resolve_bare(
    ctx: &ResolveContext<'_>,
    specifier: &str,
    tried: &mut Vec<PathBuf>,
) -> Result<ModuleIdentity, ResolveError> {
    let (pkg_name, subpath) = parse_bare_specifier(specifier)?;

    let mut current = Some(ctx.parent_dir.as_path());
    while let Some(dir) = current {
        let pkg_dir = dir.join("node_modules").join(pkg_name);

        if pkg_dir.is_dir() {
            // First matching package owns the resolution; failures inside
            // it (not-exported, malformed boundary) do not resume the walk.
            return resolve_package(ctx, specifier, &pkg_dir, subpath, tried);
        }
        add_tried(tried, &pkg_dir);

        current = dir.parent();
    }

    Err(ResolveError::NotFound {
        specifier: specifier.to_string(),
        tried: tried.clone(),
    })
}

/// Resolve within a located package directory.
fn resolve_package(
    ctx: &ResolveContext<'_>,
    specifier: &str,
    pkg_dir: &Path,
    subpath: Option<&str>,
    tried: &mut Vec<PathBuf>,
) -> Result<ModuleIdentity, ResolveError> {
    let pkg_json_path = pkg_dir.join("package.json");
    let pkg = read_package_json(&pkg_json_path, ctx.pkg_json_cache)?;

    if let Some(ref pkg) = pkg {
        let subpath_key = match subpath {
            Some(sub) => format!("./{sub}"),
            None => ".".to_string(),
        };
        match resolve_exports(pkg, &subpath_key, ctx.conditions) {
            ExportsLookup::Target(target) => {
                return match probe_export_target(ctx, pkg_dir, &target, tried)? {
                    Some(path) => finish(ctx, &path),
                    None => Err(ResolveError::NotFound {
                        specifier: specifier.to_string(),
                        tried: tried.clone(),
                    }),
                };
            }
            ExportsLookup::NoMatch => {
                return Err(ResolveError::NotExported {
                    specifier: specifier.to_string(),
                    package_path: pkg_dir.to_path_buf(),
                    subpath: subpath_key,
                });
            }
            ExportsLookup::NoMap => {}
        }
    }

    // Legacy resolution: direct subpath probing or main/index entry.
    let resolved = match subpath {
        Some(sub) => resolve_path(ctx, specifier, &pkg_dir.join(sub), tried)?,
        None => legacy_directory(ctx, pkg_dir, pkg.as_ref(), tried)?,
    };

    match resolved {
        Some(path) => finish(ctx, &path),
        None => Err(ResolveError::NotFound {
            specifier: specifier.to_string(),
            tried: tried.clone(),
        }),
    }
}

/// Parse a bare specifier into package name and optional subpath.
fn parse_bare_specifier(spec: &str) -> Result<(&str, Option<&str>), ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidSpecifier {
        specifier: spec.to_string(),
        reason: reason.to_string(),
    };

    if spec.starts_with('@') {
        // Scoped package: @scope/pkg or @scope/pkg/subpath
        let mut slash_count = 0;
        let mut name_end = spec.len();
        for (i, c) in spec.char_indices() {
            if c == '/' {
                slash_count += 1;
                if slash_count == 2 {
                    name_end = i;
                    break;
                }
            }
        }
        if slash_count == 0 {
            return Err(invalid("scoped package name is missing a package segment"));
        }
        let name = &spec[..name_end];
        let subpath = if name_end < spec.len() {
            Some(&spec[name_end + 1..])
        } else {
            None
        };
        return Ok((name, subpath));
    }

    let (name, subpath) = match spec.find('/') {
        Some(pos) => (&spec[..pos], Some(&spec[pos + 1..])),
        None => (spec, None),
    };
    if name.is_empty() {
        return Err(invalid("empty package name"));
    }
    Ok((name, subpath))
}

/// Canonicalize a resolved path and convert it to a `file:` identity.
fn finish(ctx: &ResolveContext<'_>, path: &Path) -> Result<ModuleIdentity, ResolveError> {
    let path = if ctx.config.preserve_symlinks {
        skerry_util::fs::normalize(path)
    } else {
        path.canonicalize()
            .unwrap_or_else(|_| skerry_util::fs::normalize(path))
    };
    ModuleIdentity::from_file_path(&path).ok_or_else(|| ResolveError::InvalidSpecifier {
        specifier: path.display().to_string(),
        reason: "resolved path is not absolute".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ctx<'a>(
        parent: &Path,
        conditions: &'a [String],
        config: &'a LoaderConfig,
        builtins: &'a BuiltinRegistry,
    ) -> ResolveContext<'a> {
        ResolveContext {
            parent_dir: parent.to_path_buf(),
            conditions,
            config,
            builtins,
            pkg_json_cache: None,
        }
    }

    fn import_conditions() -> Vec<String> {
        vec!["import".to_string(), "node".to_string(), "default".to_string()]
    }

    fn require_conditions() -> Vec<String> {
        vec!["require".to_string(), "node".to_string(), "default".to_string()]
    }

    fn setup_node_modules(temp: &TempDir) {
        let simple = temp.path().join("node_modules/simple-pkg");
        fs::create_dir_all(&simple).unwrap();
        fs::write(simple.join("index.js"), "module.exports = 1;").unwrap();
        fs::write(simple.join("package.json"), r#"{"name": "simple-pkg"}"#).unwrap();

        let with_main = temp.path().join("node_modules/with-main");
        fs::create_dir_all(&with_main).unwrap();
        fs::write(with_main.join("lib.js"), "module.exports = 2;").unwrap();
        fs::write(
            with_main.join("package.json"),
            r#"{"name": "with-main", "main": "lib.js"}"#,
        )
        .unwrap();

        let with_exports = temp.path().join("node_modules/with-exports");
        fs::create_dir_all(with_exports.join("dist")).unwrap();
        fs::write(with_exports.join("dist/index.mjs"), "export const z = 3;").unwrap();
        fs::write(with_exports.join("dist/index.cjs"), "module.exports = 3;").unwrap();
        fs::write(
            with_exports.join("package.json"),
            r#"{
                "name": "with-exports",
                "exports": {
                    ".": {
                        "import": "./dist/index.mjs",
                        "require": "./dist/index.cjs"
                    }
                }
            }"#,
        )
        .unwrap();

        let sealed = temp.path().join("node_modules/sealed");
        fs::create_dir_all(&sealed).unwrap();
        fs::write(sealed.join("index.js"), "module.exports = 4;").unwrap();
        fs::write(sealed.join("secret.js"), "module.exports = 5;").unwrap();
        fs::write(
            sealed.join("package.json"),
            r#"{"name": "sealed", "exports": {".": "./index.js"}}"#,
        )
        .unwrap();

        let scoped = temp.path().join("node_modules/@scope/pkg");
        fs::create_dir_all(&scoped).unwrap();
        fs::write(scoped.join("index.js"), "module.exports = 6;").unwrap();
        fs::write(scoped.join("package.json"), r#"{"name": "@scope/pkg"}"#).unwrap();
    }

    #[test]
    fn test_relative_with_extension_probing() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("helper.js"), "").unwrap();

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        let id = resolve(&c, "./helper").unwrap();
        assert!(id.as_str().ends_with("helper.js"));
    }

    #[test]
    fn test_relative_index_resolution() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("lib")).unwrap();
        fs::write(temp.path().join("lib/index.js"), "").unwrap();

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        let id = resolve(&c, "./lib").unwrap();
        assert!(id.as_str().ends_with("lib/index.js"));
    }

    #[test]
    fn test_not_found_names_probed_candidates() {
        let temp = TempDir::new().unwrap();
        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        let err = resolve(&c, "./missing").unwrap_err();
        match err {
            ResolveError::NotFound { tried, .. } => {
                assert!(tried.iter().any(|p| p.ends_with("missing.js")));
                assert!(tried.iter().any(|p| p.ends_with("missing.json")));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_specifier_walk() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);
        let nested = temp.path().join("src/deep");
        fs::create_dir_all(&nested).unwrap();

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(&nested, &conditions, &config, &builtins);

        let id = resolve(&c, "simple-pkg").unwrap();
        assert!(id.as_str().ends_with("simple-pkg/index.js"));
    }

    #[test]
    fn test_main_field() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        let id = resolve(&c, "with-main").unwrap();
        assert!(id.as_str().ends_with("with-main/lib.js"));
    }

    #[test]
    fn test_conditional_exports_follow_kind() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();

        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);
        let id = resolve(&c, "with-exports").unwrap();
        assert!(id.as_str().ends_with("dist/index.mjs"));

        let conditions = require_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);
        let id = resolve(&c, "with-exports").unwrap();
        assert!(id.as_str().ends_with("dist/index.cjs"));
    }

    #[test]
    fn test_not_exported_distinct_from_not_found() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        let err = resolve(&c, "sealed/secret").unwrap_err();
        match err {
            ResolveError::NotExported { subpath, .. } => assert_eq!(subpath, "./secret"),
            other => panic!("expected NotExported, got {other:?}"),
        }

        let err = resolve(&c, "no-such-pkg").unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn test_scoped_package() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        let id = resolve(&c, "@scope/pkg").unwrap();
        assert!(id.as_str().ends_with("@scope/pkg/index.js"));
    }

    #[test]
    fn test_builtin_namespace() {
        let temp = TempDir::new().unwrap();
        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        assert_eq!(resolve(&c, "node:zlib").unwrap().as_str(), "node:zlib");
        // Bare builtin aliases win over node_modules
        assert_eq!(resolve(&c, "path").unwrap().as_str(), "node:path");

        let err = resolve(&c, "node:nope").unwrap_err();
        assert!(matches!(err, ResolveError::UnknownBuiltin { .. }));
    }

    #[test]
    fn test_malformed_package_boundary() {
        let temp = TempDir::new().unwrap();
        let broken = temp.path().join("node_modules/broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("package.json"), "{ not json").unwrap();

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        let err = resolve(&c, "broken").unwrap_err();
        assert!(matches!(err, ResolveError::PackageBoundaryMalformed { .. }));
    }

    #[test]
    fn test_package_internal_imports() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(
            temp.path().join("package.json"),
            r##"{"name": "app", "imports": {"#util": "./src/util.js"}}"##,
        )
        .unwrap();
        fs::write(temp.path().join("src/util.js"), "").unwrap();

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(&temp.path().join("src"), &conditions, &config, &builtins);

        let id = resolve(&c, "#util").unwrap();
        assert!(id.as_str().ends_with("src/util.js"));

        let err = resolve(&c, "#missing").unwrap_err();
        assert!(matches!(err, ResolveError::NotExported { .. }));
    }

    #[test]
    fn test_invalid_specifiers() {
        let temp = TempDir::new().unwrap();
        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        assert!(matches!(
            resolve(&c, ""),
            Err(ResolveError::InvalidSpecifier { .. })
        ));
        assert!(matches!(
            resolve(&c, "https://example.com/mod.js"),
            Err(ResolveError::InvalidSpecifier { .. })
        ));
        assert!(matches!(
            resolve(&c, "@scope"),
            Err(ResolveError::InvalidSpecifier { .. })
        ));
    }

    #[test]
    fn test_determinism() {
        let temp = TempDir::new().unwrap();
        setup_node_modules(&temp);

        let config = LoaderConfig::default();
        let builtins = BuiltinRegistry::new();
        let conditions = import_conditions();
        let c = ctx(temp.path(), &conditions, &config, &builtins);

        let a = resolve(&c, "with-exports").unwrap();
        let b = resolve(&c, "with-exports").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_package_type_walk() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"name": "app", "type": "module"}"#,
        )
        .unwrap();
        let file = temp.path().join("src/mod.js");
        fs::write(&file, "").unwrap();

        assert_eq!(package_type_for(&file, None), Some(PackageType::Module));

        let orphan = TempDir::new().unwrap();
        let orphan_file = orphan.path().join("loose.js");
        fs::write(&orphan_file, "").unwrap();
        assert_eq!(package_type_for(&orphan_file, None), None);
    }
}
