#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]

//! Core types for the skerry module loader.
//!
//! This crate is the engine-independent half of the pipeline: specifier
//! resolution, format classification, the builtin registry, the source
//! scanner, and the shared error taxonomy. The runtime crate layers the
//! hook chain, module registry, and evaluation scheduling on top.

pub mod builtins;
pub mod config;
pub mod error;
pub mod format;
pub mod identity;
pub mod resolver;
pub mod scan;

pub use builtins::{BuiltinModule, BuiltinRegistry};
pub use config::{LoaderConfig, DEFAULT_CONDITIONS, DEFAULT_EXTENSIONS};
pub use error::{FormatError, ResolveError};
pub use format::{classify, ModuleFormat, PackageType};
pub use identity::{ModuleIdentity, ReferrerContext};
pub use resolver::{
    classify_specifier, package_type_for, resolve, InMemoryPkgJsonCache, NoPkgJsonCache,
    PkgJsonCache, ResolveContext, SpecifierKind,
};
pub use scan::{scan_source, RequestKind, ScannedRequest, SourceScan};
