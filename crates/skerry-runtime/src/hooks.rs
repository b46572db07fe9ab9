//! Hook chain composer.
//!
//! User-registered `resolve`/`load` interceptors wrap the default
//! resolver/loader. The most recently registered hook sees a request first
//! and either forwards through its `next` capability or terminates the
//! chain with `short_circuit: true`; doing neither is a contract violation.
//!
//! Registration produces a new immutable snapshot rather than mutating a
//! shared list, so in-flight requests keep the chain they started with and
//! late (de)registration cannot race them. The default link is registered
//! into the run order like any other hook: a chain with zero user hooks is
//! exactly the default resolver/loader.

use crate::error::LoaderError;
use crate::source::ModuleSource;
use futures::future::BoxFuture;
use skerry_core::{ModuleFormat, ModuleIdentity};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use thiserror::Error;

/// Which chain a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Resolve,
    Load,
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve => write!(f, "resolve"),
            Self::Load => write!(f, "load"),
        }
    }
}

/// Hook contract violations. Fatal to the request, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error(
        "{stage} hook at position {position} completed without calling next or setting short_circuit"
    )]
    MissingShortCircuit { stage: HookStage, position: usize },

    #[error("{stage} hook at position {position} returned an invalid result: {reason}")]
    InvalidHookReturn {
        stage: HookStage,
        position: usize,
        reason: String,
    },
}

/// Context passed to every hook link.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Identity of the requesting module, if any.
    pub referrer: Option<ModuleIdentity>,
    /// Active conditions for this request.
    pub conditions: Vec<String>,
    /// Format hint carried from the resolve chain into the load chain.
    pub format_hint: Option<ModuleFormat>,
}

/// Result of a resolve chain link.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    /// Canonical identity. Authoritative even when a hook redirects a
    /// builtin; downstream never re-derives it.
    pub identity: ModuleIdentity,
    /// Optional format the hook already knows.
    pub format_hint: Option<ModuleFormat>,
    /// Whether this link terminated the chain.
    pub short_circuit: bool,
}

impl ResolveOutcome {
    /// Terminal outcome for an identity.
    #[must_use]
    pub fn short_circuit(identity: ModuleIdentity) -> Self {
        Self {
            identity,
            format_hint: None,
            short_circuit: true,
        }
    }

    /// Attach a format hint.
    #[must_use]
    pub fn with_format(mut self, format: ModuleFormat) -> Self {
        self.format_hint = Some(format);
        self
    }
}

/// Result of a load chain link.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// Loaded source. May be absent only for builtin formats.
    pub source: Option<ModuleSource>,
    /// Format the loader determined, if any.
    pub format: Option<ModuleFormat>,
    /// Whether this link terminated the chain.
    pub short_circuit: bool,
}

impl LoadOutcome {
    /// Terminal outcome carrying source and format.
    #[must_use]
    pub fn short_circuit(source: ModuleSource, format: ModuleFormat) -> Self {
        Self {
            source: Some(source),
            format: Some(format),
            short_circuit: true,
        }
    }
}

/// Alias for hook results.
pub type HookResult<T> = Result<T, LoaderError>;

/// Boxed resolve hook.
pub type ResolveHookFn =
    Arc<dyn Fn(String, HookContext, NextResolve) -> BoxFuture<'static, HookResult<ResolveOutcome>> + Send + Sync>;

/// Boxed load hook.
pub type LoadHookFn = Arc<
    dyn Fn(ModuleIdentity, HookContext, NextLoad) -> BoxFuture<'static, HookResult<LoadOutcome>>
        + Send
        + Sync,
>;

/// Wrap an async closure as a resolve hook.
pub fn resolve_hook<F, Fut>(f: F) -> ResolveHookFn
where
    F: Fn(String, HookContext, NextResolve) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult<ResolveOutcome>> + Send + 'static,
{
    Arc::new(move |specifier, cx, next| Box::pin(f(specifier, cx, next)))
}

/// Wrap an async closure as a load hook.
pub fn load_hook<F, Fut>(f: F) -> LoadHookFn
where
    F: Fn(ModuleIdentity, HookContext, NextLoad) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult<LoadOutcome>> + Send + 'static,
{
    Arc::new(move |identity, cx, next| Box::pin(f(identity, cx, next)))
}

/// A registration unit: either or both stages.
#[derive(Clone, Default)]
pub struct HookSet {
    pub resolve: Option<ResolveHookFn>,
    pub load: Option<LoadHookFn>,
}

impl HookSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolve hook.
    #[must_use]
    pub fn with_resolve(mut self, hook: ResolveHookFn) -> Self {
        self.resolve = Some(hook);
        self
    }

    /// Add a load hook.
    #[must_use]
    pub fn with_load(mut self, hook: LoadHookFn) -> Self {
        self.load = Some(hook);
        self
    }
}

#[derive(Clone)]
struct HookEntry {
    id: u64,
    resolve: Option<ResolveHookFn>,
    load: Option<LoadHookFn>,
}

/// Immutable, versioned view of the registered hooks.
pub struct HookSnapshot {
    version: u64,
    entries: Vec<HookEntry>,
}

impl HookSnapshot {
    /// Snapshot version; bumped on every (de)registration.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of registered hook sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no user hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the resolve chain over this snapshot.
    ///
    /// `default_link` is the innermost link; with zero registered hooks the
    /// chain is exactly that link.
    pub fn run_resolve_chain(
        &self,
        specifier: &str,
        cx: HookContext,
        default_link: ResolveHookFn,
    ) -> BoxFuture<'static, HookResult<ResolveOutcome>> {
        let mut links: Vec<ResolveHookFn> = self
            .entries
            .iter()
            .rev()
            .filter_map(|e| e.resolve.clone())
            .collect();
        links.push(default_link);
        tracing::trace!(version = self.version, links = links.len(), "resolve chain");
        run_resolve_from(Arc::new(links), 0, specifier.to_string(), cx)
    }

    /// Run the load chain over this snapshot.
    pub fn run_load_chain(
        &self,
        identity: &ModuleIdentity,
        cx: HookContext,
        default_link: LoadHookFn,
    ) -> BoxFuture<'static, HookResult<LoadOutcome>> {
        let mut links: Vec<LoadHookFn> = self
            .entries
            .iter()
            .rev()
            .filter_map(|e| e.load.clone())
            .collect();
        links.push(default_link);
        tracing::trace!(version = self.version, links = links.len(), "load chain");
        run_load_from(Arc::new(links), 0, identity.clone(), cx)
    }
}

/// First-class continuation for the resolve chain. Single use: calling it
/// invokes the next link (ultimately the default resolver).
pub struct NextResolve {
    links: Arc<Vec<ResolveHookFn>>,
    index: usize,
    invoked: Arc<AtomicBool>,
}

impl NextResolve {
    /// Invoke the next link.
    #[must_use]
    pub fn call(
        self,
        specifier: String,
        cx: HookContext,
    ) -> BoxFuture<'static, HookResult<ResolveOutcome>> {
        self.invoked.store(true, Ordering::SeqCst);
        run_resolve_from(self.links, self.index, specifier, cx)
    }
}

/// First-class continuation for the load chain.
pub struct NextLoad {
    links: Arc<Vec<LoadHookFn>>,
    index: usize,
    invoked: Arc<AtomicBool>,
}

impl NextLoad {
    /// Invoke the next link.
    #[must_use]
    pub fn call(
        self,
        identity: ModuleIdentity,
        cx: HookContext,
    ) -> BoxFuture<'static, HookResult<LoadOutcome>> {
        self.invoked.store(true, Ordering::SeqCst);
        run_load_from(self.links, self.index, identity, cx)
    }
}

fn run_resolve_from(
    links: Arc<Vec<ResolveHookFn>>,
    index: usize,
    specifier: String,
    cx: HookContext,
) -> BoxFuture<'static, HookResult<ResolveOutcome>> {
    Box::pin(async move {
        let Some(link) = links.get(index).cloned() else {
            return Err(HookError::InvalidHookReturn {
                stage: HookStage::Resolve,
                position: index.saturating_sub(1),
                reason: "chain forwarded past the default resolver".to_string(),
            }
            .into());
        };
        let invoked = Arc::new(AtomicBool::new(false));
        let next = NextResolve {
            links: Arc::clone(&links),
            index: index + 1,
            invoked: Arc::clone(&invoked),
        };

        // Errors from inner links propagate unchanged: causality across
        // next calls is the error value itself.
        let outcome = link(specifier, cx, next).await?;

        if !outcome.short_circuit && !invoked.load(Ordering::SeqCst) {
            return Err(HookError::MissingShortCircuit {
                stage: HookStage::Resolve,
                position: index,
            }
            .into());
        }
        Ok(outcome)
    })
}

fn run_load_from(
    links: Arc<Vec<LoadHookFn>>,
    index: usize,
    identity: ModuleIdentity,
    cx: HookContext,
) -> BoxFuture<'static, HookResult<LoadOutcome>> {
    Box::pin(async move {
        let Some(link) = links.get(index).cloned() else {
            return Err(HookError::InvalidHookReturn {
                stage: HookStage::Load,
                position: index.saturating_sub(1),
                reason: "chain forwarded past the default loader".to_string(),
            }
            .into());
        };
        let invoked = Arc::new(AtomicBool::new(false));
        let next = NextLoad {
            links: Arc::clone(&links),
            index: index + 1,
            invoked: Arc::clone(&invoked),
        };

        let outcome = link(identity, cx, next).await?;

        if !outcome.short_circuit && !invoked.load(Ordering::SeqCst) {
            return Err(HookError::MissingShortCircuit {
                stage: HookStage::Load,
                position: index,
            }
            .into());
        }

        // A terminal load result must carry source for non-builtin formats.
        if outcome.short_circuit
            && outcome.source.is_none()
            && outcome.format != Some(ModuleFormat::Builtin)
        {
            return Err(HookError::InvalidHookReturn {
                stage: HookStage::Load,
                position: index,
                reason: "load result must carry source for non-builtin formats".to_string(),
            }
            .into());
        }
        Ok(outcome)
    })
}

struct EngineState {
    next_id: u64,
    snapshot: Arc<HookSnapshot>,
}

/// Owner of the registered hook list.
pub struct HookEngine {
    state: RwLock<EngineState>,
}

impl Default for HookEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HookEngine {
    /// Create an engine with no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState {
                next_id: 0,
                snapshot: Arc::new(HookSnapshot {
                    version: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    /// Register a hook set. The newest registration runs first.
    pub fn register(engine: &Arc<HookEngine>, set: HookSet) -> HookHandle {
        let mut state = engine.state.write().unwrap_or_else(PoisonError::into_inner);
        let id = state.next_id;
        state.next_id += 1;

        let mut entries = state.snapshot.entries.clone();
        entries.push(HookEntry {
            id,
            resolve: set.resolve,
            load: set.load,
        });
        let version = state.snapshot.version + 1;
        state.snapshot = Arc::new(HookSnapshot { version, entries });
        tracing::debug!(id, version, "registered hooks");

        HookHandle {
            id,
            engine: Arc::downgrade(engine),
        }
    }

    /// Current snapshot; in-flight requests hold their own clone.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HookSnapshot> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    fn deregister_id(&self, id: u64) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<HookEntry> = state
            .snapshot
            .entries
            .iter()
            .filter(|e| e.id != id)
            .cloned()
            .collect();
        let version = state.snapshot.version + 1;
        state.snapshot = Arc::new(HookSnapshot { version, entries });
        tracing::debug!(id, version, "deregistered hooks");
    }
}

/// Registration handle; dropping it leaves the hooks in place, calling
/// [`HookHandle::deregister`] removes them.
pub struct HookHandle {
    id: u64,
    engine: Weak<HookEngine>,
}

impl HookHandle {
    /// Remove the registered hooks from the chain.
    pub fn deregister(self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.deregister_id(self.id);
        }
    }
}
