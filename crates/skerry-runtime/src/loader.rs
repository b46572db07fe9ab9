//! The loader pipeline.
//!
//! A request flows: resolve chain -> registry gate (at-most-one-in-flight)
//! -> load chain -> format classification -> instantiation and dependency
//! linking (with the circular-reference guard) -> evaluation. Every stage
//! is interceptable through the hook engine; the default resolver and
//! loader are the innermost chain links.

use crate::compile_cache::CompileCache;
use crate::error::{EvalError, LoaderError};
use crate::executor::{EvalContext, Evaluation, ModuleExecutor, ModuleInfo, ScanExecutor};
use crate::hooks::{
    load_hook, resolve_hook, HookContext, HookEngine, HookError, HookHandle, HookSet, HookStage,
    LoadHookFn, LoadOutcome, ResolveHookFn, ResolveOutcome,
};
use crate::namespace::Namespace;
use crate::registry::{ModuleRecord, ModuleRegistry, ModuleState};
use crate::source::{ModuleSource, SourceProvider};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use skerry_core::resolver::ResolveContext;
use skerry_core::scan::RequestKind;
use skerry_core::{
    BuiltinRegistry, FormatError, InMemoryPkgJsonCache, LoaderConfig, ModuleFormat,
    ModuleIdentity, PkgJsonCache, ReferrerContext, ResolveError,
};
use std::path::Path;
use std::sync::Arc;

/// How the caller consumes the result: synchronously (`require`) or
/// asynchronously (`import`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsumptionMode {
    Sync,
    Async,
}

impl ConsumptionMode {
    fn kind(self) -> RequestKind {
        match self {
            Self::Sync => RequestKind::Require,
            Self::Async => RequestKind::Import,
        }
    }
}

/// The module loader: registry, hook engine, caches, and entry points.
///
/// Registries are explicit instances, not process-wide state: embedders and
/// tests construct as many isolated loaders as they need.
pub struct Loader {
    config: LoaderConfig,
    hooks: Arc<HookEngine>,
    registry: ModuleRegistry,
    provider: Arc<dyn SourceProvider>,
    executor: Arc<dyn ModuleExecutor>,
    compile_cache: CompileCache,
    builtins: BuiltinRegistry,
    pkg_json_cache: Arc<InMemoryPkgJsonCache>,
}

impl Loader {
    /// Create a loader over a source provider with the default
    /// (static-analysis) executor.
    #[must_use]
    pub fn new(config: LoaderConfig, provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            config,
            hooks: Arc::new(HookEngine::new()),
            registry: ModuleRegistry::new(),
            provider,
            executor: Arc::new(ScanExecutor::new()),
            compile_cache: CompileCache::new(),
            builtins: BuiltinRegistry::new(),
            pkg_json_cache: Arc::new(InMemoryPkgJsonCache::new()),
        }
    }

    /// Replace the module executor (e.g. an engine-backed one).
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn ModuleExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Register resolve/load hooks. The newest registration runs first.
    pub fn register_hooks(&self, set: HookSet) -> HookHandle {
        HookEngine::register(&self.hooks, set)
    }

    /// The builtin registry (read-only).
    #[must_use]
    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    /// The module registry.
    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Asynchronously import a module, returning its namespace.
    pub async fn import(
        &self,
        specifier: &str,
        referrer: Option<&ModuleIdentity>,
    ) -> Result<Namespace, LoaderError> {
        let ctx = self.root_context(referrer, ConsumptionMode::Async);
        let mut stack = Vec::new();
        self.request_module(specifier.to_string(), ctx, ConsumptionMode::Async, &mut stack)
            .await
    }

    /// Synchronously require a module.
    ///
    /// Drives the pipeline to completion on the calling thread. If the
    /// target (or a transitive dependency reached through a require edge)
    /// suspends on a pending top-level await, fails fast with
    /// [`EvalError::SyncImportOfPendingAsyncModule`]; the suspended record
    /// stays joinable by later asynchronous imports.
    pub fn require(
        &self,
        specifier: &str,
        referrer: Option<&ModuleIdentity>,
    ) -> Result<Namespace, LoaderError> {
        let ctx = self.root_context(referrer, ConsumptionMode::Sync);
        let mut stack = Vec::new();
        futures::executor::block_on(self.request_module(
            specifier.to_string(),
            ctx,
            ConsumptionMode::Sync,
            &mut stack,
        ))
    }

    /// Run the resolve chain only, without loading.
    pub async fn resolve(
        &self,
        specifier: &str,
        referrer: Option<&ModuleIdentity>,
    ) -> Result<ModuleIdentity, LoaderError> {
        let ctx = self.root_context(referrer, ConsumptionMode::Async);
        let outcome = self.run_resolve(specifier, &ctx).await?;
        Ok(outcome.identity)
    }

    /// Flush one identity or the whole cache.
    ///
    /// Namespaces already handed out keep their pre-flush contents; the
    /// next request for a flushed identity runs a fresh pipeline.
    pub fn flush_cache(&self, identity: Option<&ModuleIdentity>) {
        match identity {
            Some(id) => {
                self.registry.invalidate(id);
                self.compile_cache.invalidate(id);
            }
            None => {
                self.registry.invalidate_all();
                self.compile_cache.clear();
                self.pkg_json_cache.clear();
            }
        }
    }

    /// Flush an identity and everything that imported it (development
    /// reload flows). Returns the number of records flushed.
    pub fn flush_with_dependents(&self, identity: &ModuleIdentity) -> usize {
        self.compile_cache.invalidate(identity);
        self.registry.invalidate_with_dependents(identity)
    }

    fn root_context(
        &self,
        referrer: Option<&ModuleIdentity>,
        mode: ConsumptionMode,
    ) -> ReferrerContext {
        let format = referrer
            .and_then(|id| self.registry.get(id))
            .and_then(|record| record.format());
        ReferrerContext {
            referrer: referrer.cloned(),
            format,
            conditions: self.config.conditions_for(mode.kind()),
        }
    }

    /// The core request path; recursive over dependency edges.
    fn request_module<'a>(
        &'a self,
        specifier: String,
        ctx: ReferrerContext,
        mode: ConsumptionMode,
        stack: &'a mut Vec<ModuleIdentity>,
    ) -> BoxFuture<'a, Result<Namespace, LoaderError>> {
        async move {
            let resolved = self.run_resolve(&specifier, &ctx).await?;
            let identity = resolved.identity.clone();
            tracing::debug!(specifier = %specifier, identity = %identity, "resolved");

            // Circular guard: an identity already on the in-progress stack
            // resolves to its existing record, never a fresh one.
            if stack.contains(&identity) {
                let record = self.registry.get(&identity).ok_or_else(|| {
                    EvalError::CircularReentryViolation {
                        identity: identity.to_string(),
                    }
                })?;
                if let Some(ref referrer) = ctx.referrer {
                    record.add_dependent(referrer);
                }
                tracing::trace!(identity = %identity, "cycle: joining in-progress record");
                return Ok(record.namespace());
            }

            let (record, created) = self.registry.get_or_create(&identity);
            if let Some(ref referrer) = ctx.referrer {
                record.add_dependent(referrer);
            }

            if created {
                self.drive_pipeline(&record, resolved.format_hint, mode, stack)
                    .await
            } else {
                self.join_existing(&record, mode).await
            }
        }
        .boxed()
    }

    /// Own the pipeline run for a freshly created record.
    async fn drive_pipeline(
        &self,
        record: &Arc<ModuleRecord>,
        format_hint: Option<ModuleFormat>,
        mode: ConsumptionMode,
        stack: &mut Vec<ModuleIdentity>,
    ) -> Result<Namespace, LoaderError> {
        match self.run_pipeline(record, format_hint, mode, stack).await {
            Ok(namespace) => Ok(namespace),
            Err(err) => {
                // A sync require of this record's own pending top-level
                // await is a consumption failure, not a module failure: the
                // record stays Evaluating with its parked future joinable.
                let own_sync_pending = matches!(
                    &err,
                    LoaderError::Evaluation(EvalError::SyncImportOfPendingAsyncModule { identity })
                        if *identity == record.identity().to_string()
                );
                if !own_sync_pending {
                    record.fail(err.clone());
                }
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        record: &Arc<ModuleRecord>,
        format_hint: Option<ModuleFormat>,
        mode: ConsumptionMode,
        stack: &mut Vec<ModuleIdentity>,
    ) -> Result<Namespace, LoaderError> {
        let identity = record.identity().clone();

        record.advance(ModuleState::Loading)?;
        let load = self.run_load(&identity, format_hint).await?;

        let format = self.classify_identity(&identity, load.format.or(format_hint));
        record.set_format(format);
        tracing::debug!(identity = %identity, %format, "classified");

        if format == ModuleFormat::Builtin {
            return self.evaluate_builtin(record);
        }

        let source = load.source.ok_or_else(|| HookError::InvalidHookReturn {
            stage: HookStage::Load,
            position: 0,
            reason: "load chain produced no source".to_string(),
        })?;
        record.set_source(source.clone());

        if format == ModuleFormat::Json {
            return self.evaluate_json(record, &source);
        }

        record.advance(ModuleState::Instantiating)?;
        let info = self.instantiate_cached(&identity, &source, format)?;
        record.set_info(info.clone());

        stack.push(identity.clone());
        let mut dependencies = Vec::with_capacity(info.requests.len());
        for request in &info.requests {
            // A require edge forces synchronous consumption even inside an
            // asynchronous import graph.
            let child_mode = if mode == ConsumptionMode::Sync || request.kind == RequestKind::Require
            {
                ConsumptionMode::Sync
            } else {
                ConsumptionMode::Async
            };
            let child_ctx = ReferrerContext {
                referrer: Some(identity.clone()),
                format: Some(format),
                conditions: self.config.conditions_for(request.kind),
            };
            match self
                .request_module(request.specifier.clone(), child_ctx, child_mode, stack)
                .await
            {
                Ok(namespace) => dependencies.push((request.clone(), namespace)),
                Err(err) => {
                    stack.pop();
                    return Err(err);
                }
            }
        }
        stack.pop();

        record.advance(ModuleState::Evaluating)?;
        let namespace = record.namespace();
        let evaluation = self.executor.evaluate(EvalContext {
            identity: &identity,
            format,
            namespace: &namespace,
            info: &info,
            dependencies: &dependencies,
        });

        match evaluation {
            Evaluation::Finished(Ok(())) => {
                record.advance(ModuleState::Evaluated)?;
                Ok(namespace)
            }
            Evaluation::Finished(Err(err)) => Err(err.into()),
            Evaluation::Suspended(future) => {
                let shared = future.shared();
                record.park_evaluation(shared.clone());
                tracing::debug!(identity = %identity, "evaluation suspended at top level");
                match mode {
                    ConsumptionMode::Sync => Err(EvalError::SyncImportOfPendingAsyncModule {
                        identity: identity.to_string(),
                    }
                    .into()),
                    ConsumptionMode::Async => {
                        let result = shared.await;
                        self.settle(record, result)
                    }
                }
            }
        }
    }

    /// Join a record another request already owns.
    async fn join_existing(
        &self,
        record: &Arc<ModuleRecord>,
        mode: ConsumptionMode,
    ) -> Result<Namespace, LoaderError> {
        let mut rx = record.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ModuleState::Evaluated => return Ok(record.namespace()),
                ModuleState::Errored => {
                    // Replay the cached error without re-running anything.
                    return Err(record.error().unwrap_or_else(|| {
                        EvalError::Failed {
                            identity: record.identity().to_string(),
                            message: "record errored with no recorded cause".to_string(),
                        }
                        .into()
                    }));
                }
                _ => {
                    if let Some(shared) = record.pending_evaluation() {
                        if mode == ConsumptionMode::Sync {
                            return Err(EvalError::SyncImportOfPendingAsyncModule {
                                identity: record.identity().to_string(),
                            }
                            .into());
                        }
                        let result = shared.await;
                        return self.settle(record, result);
                    }
                }
            }
            if rx.changed().await.is_err() {
                return Err(EvalError::Failed {
                    identity: record.identity().to_string(),
                    message: "record dropped while in flight".to_string(),
                }
                .into());
            }
        }
    }

    /// Apply a completed (previously suspended) evaluation to the record.
    fn settle(
        &self,
        record: &Arc<ModuleRecord>,
        result: Result<(), EvalError>,
    ) -> Result<Namespace, LoaderError> {
        match result {
            Ok(()) => {
                record.finish_evaluation();
                Ok(record.namespace())
            }
            Err(err) => {
                let err = LoaderError::from(err);
                record.fail(err.clone());
                Err(err)
            }
        }
    }

    fn evaluate_builtin(&self, record: &Arc<ModuleRecord>) -> Result<Namespace, LoaderError> {
        let name = record
            .identity()
            .builtin_name()
            .map(ToString::to_string)
            .ok_or_else(|| ResolveError::UnknownBuiltin {
                name: record.identity().to_string(),
            })?;
        let builtin = self
            .builtins
            .get(&name)
            .ok_or(ResolveError::UnknownBuiltin { name })?;

        record.advance(ModuleState::Instantiating)?;
        record.advance(ModuleState::Evaluating)?;
        let namespace = record.namespace();
        for export in builtin.exports {
            namespace.set(*export, Value::Null);
        }
        namespace.set("default", Value::Null);
        record.advance(ModuleState::Evaluated)?;
        Ok(namespace)
    }

    fn evaluate_json(
        &self,
        record: &Arc<ModuleRecord>,
        source: &ModuleSource,
    ) -> Result<Namespace, LoaderError> {
        record.advance(ModuleState::Instantiating)?;
        let text = source.as_text();
        let value: Value =
            serde_json::from_str(&text).map_err(|e| FormatError::FormatMismatch {
                identity: record.identity().to_string(),
                declared: ModuleFormat::Json,
                detail: e.to_string(),
            })?;
        record.advance(ModuleState::Evaluating)?;
        let namespace = record.namespace();
        namespace.set("default", value);
        record.advance(ModuleState::Evaluated)?;
        Ok(namespace)
    }

    async fn run_resolve(
        &self,
        specifier: &str,
        ctx: &ReferrerContext,
    ) -> Result<ResolveOutcome, LoaderError> {
        let snapshot = self.hooks.snapshot();
        let hook_cx = HookContext {
            referrer: ctx.referrer.clone(),
            conditions: ctx.conditions.clone(),
            format_hint: ctx.format,
        };
        snapshot
            .run_resolve_chain(specifier, hook_cx, self.default_resolve_hook())
            .await
    }

    async fn run_load(
        &self,
        identity: &ModuleIdentity,
        format_hint: Option<ModuleFormat>,
    ) -> Result<LoadOutcome, LoaderError> {
        let snapshot = self.hooks.snapshot();
        let hook_cx = HookContext {
            referrer: None,
            conditions: self.config.conditions.clone(),
            format_hint,
        };
        snapshot
            .run_load_chain(identity, hook_cx, self.default_load_hook())
            .await
    }

    /// The default resolver as the innermost resolve link.
    fn default_resolve_hook(&self) -> ResolveHookFn {
        let config = self.config.clone();
        let pkg_cache = Arc::clone(&self.pkg_json_cache);
        let builtins = self.builtins;
        resolve_hook(move |specifier: String, cx: HookContext, _next| {
            let config = config.clone();
            let pkg_cache = Arc::clone(&pkg_cache);
            async move {
                let builtins = builtins;
                let parent_dir = cx
                    .referrer
                    .as_ref()
                    .and_then(ModuleIdentity::to_file_path)
                    .and_then(|p| p.parent().map(Path::to_path_buf))
                    .unwrap_or_else(|| config.root.clone());
                let rctx = ResolveContext {
                    parent_dir,
                    conditions: &cx.conditions,
                    config: &config,
                    builtins: &builtins,
                    pkg_json_cache: Some(pkg_cache.as_ref() as &dyn PkgJsonCache),
                };
                let identity = skerry_core::resolve(&rctx, &specifier)?;
                Ok(ResolveOutcome::short_circuit(identity))
            }
        })
    }

    /// The default loader as the innermost load link.
    fn default_load_hook(&self) -> LoadHookFn {
        let provider = Arc::clone(&self.provider);
        load_hook(move |identity: ModuleIdentity, _cx: HookContext, _next| {
            let provider = Arc::clone(&provider);
            async move {
                if identity.builtin_name().is_some() {
                    return Ok(LoadOutcome {
                        source: None,
                        format: Some(ModuleFormat::Builtin),
                        short_circuit: true,
                    });
                }
                let source = provider.fetch(&identity)?;
                Ok(LoadOutcome {
                    source: Some(source),
                    format: None,
                    short_circuit: true,
                })
            }
        })
    }

    fn classify_identity(
        &self,
        identity: &ModuleIdentity,
        hook_format: Option<ModuleFormat>,
    ) -> ModuleFormat {
        let package_type = identity.to_file_path().and_then(|path| {
            skerry_core::package_type_for(
                &path,
                Some(self.pkg_json_cache.as_ref() as &dyn PkgJsonCache),
            )
        });
        skerry_core::classify(identity, hook_format, package_type, &self.config)
    }

    fn instantiate_cached(
        &self,
        identity: &ModuleIdentity,
        source: &ModuleSource,
        format: ModuleFormat,
    ) -> Result<ModuleInfo, LoaderError> {
        if let Some(info) = self.compile_cache.lookup(identity, source) {
            return Ok(info);
        }
        let info = self.executor.instantiate(identity, source, format)?;
        self.compile_cache.store(identity, source, info.clone());
        Ok(info)
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("records", &self.registry.len())
            .field("hooks", &self.hooks.snapshot().len())
            .finish_non_exhaustive()
    }
}
