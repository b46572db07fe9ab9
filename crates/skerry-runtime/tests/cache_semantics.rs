//! Registry semantics: dedup, error replay, flush, and the sync/async
//! evaluation boundary.

use serde_json::json;
use skerry_core::{LoaderConfig, ModuleFormat, ModuleIdentity};
use skerry_runtime::{
    load_hook, resolve_hook, EvalContext, EvalError, Evaluation, HookSet, Loader, LoaderError,
    MemorySourceProvider, ModuleExecutor, ModuleInfo, ModuleSource, ModuleState, Namespace,
    ResolveOutcome, ScanExecutor, SourceError,
};
use std::sync::Arc;
use tokio::sync::watch;

fn memory_resolver() -> skerry_runtime::ResolveHookFn {
    resolve_hook(|specifier: String, cx, next| async move {
        if specifier.starts_with("virt:") {
            let identity = ModuleIdentity::parse(&specifier).expect("virt identity");
            return Ok(ResolveOutcome::short_circuit(identity));
        }
        next.call(specifier, cx).await
    })
}

fn memory_loader() -> (Loader, Arc<MemorySourceProvider>) {
    let provider = Arc::new(MemorySourceProvider::new());
    let loader = Loader::new(LoaderConfig::default(), provider.clone());
    let _handle = loader.register_hooks(HookSet::new().with_resolve(memory_resolver()));
    (loader, provider)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_imports_collapse_to_one_fetch() {
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert("virt:hot.mjs", "export const hot = 1;");

    let loader = Arc::new(Loader::new(LoaderConfig::default(), provider.clone()));
    let _hooks = loader.register_hooks(HookSet::new().with_resolve(memory_resolver()));

    // A slow load hook widens the in-flight window so late requesters
    // genuinely join a running pipeline.
    let _slow = loader.register_hooks(HookSet::new().with_load(load_hook(
        |identity, cx, next| async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            next.call(identity, cx).await
        },
    )));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let loader = Arc::clone(&loader);
        tasks.push(tokio::spawn(async move {
            loader.import("virt:hot.mjs", None).await.unwrap()
        }));
    }

    let mut namespaces = Vec::new();
    for task in tasks {
        namespaces.push(task.await.unwrap());
    }

    // Exactly one pipeline run: one fetch, one record, N shared handles.
    assert_eq!(provider.fetch_count(), 1);
    assert_eq!(loader.registry().len(), 1);
    for ns in &namespaces[1..] {
        assert!(Namespace::same(&namespaces[0], ns));
    }
}

#[tokio::test]
async fn errored_records_replay_without_refetch() {
    let (loader, provider) = memory_loader();
    // virt:gone.mjs is resolvable but the provider has no source for it.

    let err = loader.import("virt:gone.mjs", None).await.unwrap_err();
    assert!(matches!(
        err,
        LoaderError::Source(SourceError::NotFound { .. })
    ));
    assert_eq!(provider.fetch_count(), 1);

    // Replay: same failure, no new fetch, for sync and async requesters.
    let err = loader.import("virt:gone.mjs", None).await.unwrap_err();
    assert!(matches!(
        err,
        LoaderError::Source(SourceError::NotFound { .. })
    ));
    let err = loader.require("virt:gone.mjs", None).unwrap_err();
    assert!(matches!(
        err,
        LoaderError::Source(SourceError::NotFound { .. })
    ));
    assert_eq!(provider.fetch_count(), 1);

    // Explicit flush clears the terminal error.
    provider.insert("virt:gone.mjs", "export const back = 1;");
    let identity = ModuleIdentity::parse("virt:gone.mjs").unwrap();
    loader.flush_cache(Some(&identity));

    let ns = loader.import("virt:gone.mjs", None).await.unwrap();
    assert!(ns.has("back"));
    assert_eq!(provider.fetch_count(), 2);
}

#[tokio::test]
async fn flush_creates_a_fresh_record_and_namespace() {
    let (loader, provider) = memory_loader();
    provider.insert("virt:m.mjs", "export const v = 1;");

    let before = loader.import("virt:m.mjs", None).await.unwrap();
    let identity = ModuleIdentity::parse("virt:m.mjs").unwrap();

    loader.flush_cache(Some(&identity));
    let after = loader.import("virt:m.mjs", None).await.unwrap();

    // New record, new namespace object; the stale handle still works.
    assert!(!Namespace::same(&before, &after));
    assert!(before.has("v"));
    assert_eq!(provider.fetch_count(), 2);
}

#[tokio::test]
async fn flush_with_dependents_cascades() {
    let (loader, provider) = memory_loader();
    provider.insert(
        "virt:top.mjs",
        "import { leaf } from \"virt:leaf.mjs\";\nexport const top = 1;",
    );
    provider.insert("virt:leaf.mjs", "export const leaf = 1;");

    loader.import("virt:top.mjs", None).await.unwrap();
    assert_eq!(loader.registry().len(), 2);

    let leaf = ModuleIdentity::parse("virt:leaf.mjs").unwrap();
    let removed = loader.flush_with_dependents(&leaf);
    assert_eq!(removed, 2);
    assert!(loader.registry().is_empty());
}

/// Executor that suspends top-level-await modules until a gate opens.
#[derive(Debug)]
struct GatedExecutor {
    gate: watch::Receiver<bool>,
    inner: ScanExecutor,
}

impl ModuleExecutor for GatedExecutor {
    fn instantiate(
        &self,
        identity: &ModuleIdentity,
        source: &ModuleSource,
        format: ModuleFormat,
    ) -> Result<ModuleInfo, LoaderError> {
        self.inner.instantiate(identity, source, format)
    }

    fn evaluate(&self, cx: EvalContext<'_>) -> Evaluation {
        if cx.info.has_top_level_await {
            let mut gate = self.gate.clone();
            let namespace = cx.namespace.clone();
            let names = cx.info.export_names.clone();
            Evaluation::Suspended(Box::pin(async move {
                if gate.wait_for(|open| *open).await.is_err() {
                    return Err(EvalError::Failed {
                        identity: String::new(),
                        message: "gate dropped".to_string(),
                    });
                }
                for name in names {
                    namespace.set(name, json!(null));
                }
                Ok(())
            }))
        } else {
            self.inner.evaluate(cx)
        }
    }
}

#[tokio::test]
async fn sync_require_of_pending_async_module_fails_fast() {
    let (gate_tx, gate_rx) = watch::channel(false);
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "virt:tla.mjs",
        "export const ready = await openGate();",
    );

    let loader = Loader::new(LoaderConfig::default(), provider.clone()).with_executor(Arc::new(
        GatedExecutor {
            gate: gate_rx,
            inner: ScanExecutor::new(),
        },
    ));
    let _hooks = loader.register_hooks(HookSet::new().with_resolve(memory_resolver()));

    // Synchronous consumption of a suspended module fails fast.
    let err = loader.require("virt:tla.mjs", None).unwrap_err();
    assert!(matches!(
        err,
        LoaderError::Evaluation(EvalError::SyncImportOfPendingAsyncModule { .. })
    ));

    // The record is parked, not errored: still joinable.
    let identity = ModuleIdentity::parse("virt:tla.mjs").unwrap();
    let record = loader.registry().get(&identity).unwrap();
    assert_eq!(record.state(), ModuleState::Evaluating);

    // A second sync attempt fails the same way without a new fetch.
    let err = loader.require("virt:tla.mjs", None).unwrap_err();
    assert!(matches!(
        err,
        LoaderError::Evaluation(EvalError::SyncImportOfPendingAsyncModule { .. })
    ));
    assert_eq!(provider.fetch_count(), 1);

    // Once the suspension settles, an asynchronous import succeeds...
    gate_tx.send(true).unwrap();
    let ns = loader.import("virt:tla.mjs", None).await.unwrap();
    assert!(ns.has("ready"));
    assert_eq!(record.state(), ModuleState::Evaluated);

    // ...and every later request (either kind) observes the same namespace.
    let sync_ns = loader.require("virt:tla.mjs", None).unwrap();
    assert!(Namespace::same(&ns, &sync_ns));
    let async_ns = loader.import("virt:tla.mjs", None).await.unwrap();
    assert!(Namespace::same(&ns, &async_ns));
    assert_eq!(provider.fetch_count(), 1);
}

#[tokio::test]
async fn evaluation_failures_are_cached_permanently() {
    #[derive(Debug)]
    struct FailingExecutor;

    impl ModuleExecutor for FailingExecutor {
        fn instantiate(
            &self,
            _identity: &ModuleIdentity,
            _source: &ModuleSource,
            _format: ModuleFormat,
        ) -> Result<ModuleInfo, LoaderError> {
            Ok(ModuleInfo::default())
        }

        fn evaluate(&self, cx: EvalContext<'_>) -> Evaluation {
            Evaluation::Finished(Err(EvalError::Failed {
                identity: cx.identity.to_string(),
                message: "thrown at top level".to_string(),
            }))
        }
    }

    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert("virt:throws.mjs", "export const x = 1;");
    let loader = Loader::new(LoaderConfig::default(), provider.clone())
        .with_executor(Arc::new(FailingExecutor));
    let _hooks = loader.register_hooks(HookSet::new().with_resolve(memory_resolver()));

    let err = loader.import("virt:throws.mjs", None).await.unwrap_err();
    assert!(err.to_string().contains("thrown at top level"));

    // Evaluation is not silently retried.
    let err = loader.import("virt:throws.mjs", None).await.unwrap_err();
    assert!(err.to_string().contains("thrown at top level"));
    assert_eq!(provider.fetch_count(), 1);
}

#[tokio::test]
async fn compile_cache_survives_per_identity_flush() {
    let (loader, provider) = memory_loader();
    provider.insert("virt:m.mjs", "export const v = 1;");

    loader.import("virt:m.mjs", None).await.unwrap();

    // Registry-only flush: the second run re-fetches but may reuse the
    // compile cache only when the source is unchanged.
    let identity = ModuleIdentity::parse("virt:m.mjs").unwrap();
    loader.registry().invalidate(&identity);

    let ns = loader.import("virt:m.mjs", None).await.unwrap();
    assert!(ns.has("v"));
    assert_eq!(provider.fetch_count(), 2);
}

#[tokio::test]
async fn resolution_is_deterministic_across_repeats() {
    let (loader, provider) = memory_loader();
    provider.insert("virt:m.mjs", "export const v = 1;");

    let a = loader.resolve("virt:m.mjs", None).await.unwrap();
    let b = loader.resolve("virt:m.mjs", None).await.unwrap();
    assert_eq!(a, b);
}
