use crate::hooks::HookError;
use crate::registry::ModuleState;
use crate::source::SourceError;
use skerry_core::{FormatError, ResolveError};
use thiserror::Error;

/// Evaluation-phase failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error(
        "cannot synchronously require '{identity}': evaluation is suspended on a pending top-level await"
    )]
    SyncImportOfPendingAsyncModule { identity: String },

    #[error("invalid module state transition {from} -> {to} for {identity}")]
    InvalidStateTransition {
        identity: String,
        from: ModuleState,
        to: ModuleState,
    },

    #[error("circular re-entry for '{identity}' found no in-progress record")]
    CircularReentryViolation { identity: String },

    #[error("evaluation of '{identity}' failed: {message}")]
    Failed { identity: String, message: String },
}

/// Umbrella error for the loader pipeline.
///
/// `Clone` so terminal errors can be cached on a record and replayed
/// verbatim to every later requester until explicit invalidation.
#[derive(Error, Debug, Clone)]
pub enum LoaderError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Evaluation(#[from] EvalError),

    #[error(transparent)]
    Source(#[from] SourceError),
}
