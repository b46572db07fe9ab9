//! Specifier resolver.
//!
//! Pure function of (specifier, referrer context, conditions) to a
//! canonical module identity or a typed resolution error. Probing order
//! and package-map semantics are documented in `algorithm`.

mod algorithm;
mod exports;
mod pkg_json_cache;

pub use algorithm::{classify_specifier, package_type_for, resolve, ResolveContext, SpecifierKind};
pub use exports::{resolve_exports, resolve_imports, ExportsLookup};
pub use pkg_json_cache::{InMemoryPkgJsonCache, NoPkgJsonCache, PkgJsonCache, PkgJsonStamp};
