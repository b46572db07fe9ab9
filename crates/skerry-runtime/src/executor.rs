//! Module executor interface.
//!
//! The engine that runs module bodies is an external collaborator; the
//! pipeline only needs two things from it: the dependency requests and
//! evaluation traits of a loaded source (`instantiate`), and the effect of
//! running the body against pre-linked dependency namespaces (`evaluate`).
//!
//! [`ScanExecutor`] is the shipped default: a static-analysis executor
//! that links the dependency graph, checks declared-format/syntax
//! agreement, and materializes export shapes without running code.
//! Embedders with a real engine implement [`ModuleExecutor`] themselves.

use crate::error::{EvalError, LoaderError};
use crate::namespace::Namespace;
use crate::source::ModuleSource;
use futures::future::BoxFuture;
use serde_json::Value;
use skerry_core::scan::{scan_source, RequestKind};
use skerry_core::{FormatError, ModuleFormat, ModuleIdentity};

/// A dependency edge discovered at instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    /// Specifier as written in the source.
    pub specifier: String,
    /// Whether the edge is an import or a require.
    pub kind: RequestKind,
}

/// Instantiation result: everything the scheduler needs before evaluation.
#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    /// Dependency requests in source order.
    pub requests: Vec<ModuleRequest>,
    /// Names the module exports.
    pub export_names: Vec<String>,
    /// The body suspends at top level (ESM only).
    pub has_top_level_await: bool,
}

/// Evaluation context handed to the executor.
pub struct EvalContext<'a> {
    pub identity: &'a ModuleIdentity,
    pub format: ModuleFormat,
    /// Namespace to populate; shared with every requester.
    pub namespace: &'a Namespace,
    /// Instantiation result for this record.
    pub info: &'a ModuleInfo,
    /// Resolved dependency namespaces, in request order.
    pub dependencies: &'a [(ModuleRequest, Namespace)],
}

/// Effect of evaluating a module body.
pub enum Evaluation {
    /// Evaluation ran to completion on the calling thread.
    Finished(Result<(), EvalError>),
    /// The body suspended at top level; completion is deferred to the
    /// returned future.
    Suspended(BoxFuture<'static, Result<(), EvalError>>),
}

/// Seam between the pipeline and the engine executing module bodies.
pub trait ModuleExecutor: Send + Sync {
    /// Parse a loaded source into dependency requests and evaluation
    /// traits. Declared-format/syntax disagreement is reported here, not
    /// at classification time.
    fn instantiate(
        &self,
        identity: &ModuleIdentity,
        source: &ModuleSource,
        format: ModuleFormat,
    ) -> Result<ModuleInfo, LoaderError>;

    /// Evaluate the module body against pre-linked dependencies.
    fn evaluate(&self, cx: EvalContext<'_>) -> Evaluation;
}

/// Static-analysis executor over the source scanner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanExecutor;

impl ScanExecutor {
    /// Create a scan executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ModuleExecutor for ScanExecutor {
    fn instantiate(
        &self,
        identity: &ModuleIdentity,
        source: &ModuleSource,
        format: ModuleFormat,
    ) -> Result<ModuleInfo, LoaderError> {
        match format {
            ModuleFormat::Wasm => Ok(ModuleInfo::default()),
            ModuleFormat::Builtin | ModuleFormat::Json => {
                // Evaluated natively by the scheduler; nothing to scan.
                Ok(ModuleInfo::default())
            }
            ModuleFormat::CommonJs | ModuleFormat::Esm => {
                let text = source.as_text();
                let scan = scan_source(&text);

                if format == ModuleFormat::CommonJs && scan.has_esm_syntax {
                    return Err(FormatError::FormatMismatch {
                        identity: identity.to_string(),
                        declared: ModuleFormat::CommonJs,
                        detail: "found ES module syntax".to_string(),
                    }
                    .into());
                }

                Ok(ModuleInfo {
                    requests: scan
                        .requests
                        .into_iter()
                        .map(|r| ModuleRequest {
                            specifier: r.specifier,
                            kind: r.kind,
                        })
                        .collect(),
                    export_names: scan.export_names,
                    has_top_level_await: format == ModuleFormat::Esm
                        && scan.has_top_level_await,
                })
            }
        }
    }

    fn evaluate(&self, cx: EvalContext<'_>) -> Evaluation {
        // Shape-only evaluation: bind every scanned export name. CommonJS
        // always exposes a default binding for the exports object.
        for name in &cx.info.export_names {
            cx.namespace.set(name.clone(), Value::Null);
        }
        if cx.format == ModuleFormat::CommonJs && !cx.namespace.has("default") {
            cx.namespace.set("default", Value::Null);
        }
        Evaluation::Finished(Ok(()))
    }
}
