#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unused_self)]

//! Module loader pipeline for skerry.
//!
//! Turns a specifier plus referrer context into a loaded, classified,
//! cached, and evaluated module record, with every step interceptable
//! through an ordered, short-circuiting chain of resolve/load hooks.
//!
//! - [`Loader`] — public entry points (`require`, `import`, hooks, flush)
//! - [`hooks`] — chain composer with versioned immutable snapshots
//! - [`registry`] — module records, state machine, at-most-one-in-flight
//! - [`executor`] — the seam to the engine running module bodies
//! - [`source`] — source providers (filesystem, in-memory)

pub mod compile_cache;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod loader;
pub mod namespace;
pub mod registry;
pub mod source;

pub use compile_cache::CompileCache;
pub use error::{EvalError, LoaderError};
pub use executor::{EvalContext, Evaluation, ModuleExecutor, ModuleInfo, ModuleRequest, ScanExecutor};
pub use hooks::{
    load_hook, resolve_hook, HookContext, HookEngine, HookError, HookHandle, HookSet, HookStage,
    LoadHookFn, LoadOutcome, NextLoad, NextResolve, ResolveHookFn, ResolveOutcome,
};
pub use loader::Loader;
pub use namespace::Namespace;
pub use registry::{ModuleRecord, ModuleRegistry, ModuleState, SharedEvaluation};
pub use source::{FsSourceProvider, MemorySourceProvider, ModuleSource, SourceError, SourceProvider};
