//! Module registry and records.
//!
//! The registry is the single shared mutable structure of the pipeline: a
//! map from canonical identity to module record. A record is inserted in
//! `Resolving` state before any asynchronous work begins, so concurrent
//! requests for the same identity collapse onto one in-flight pipeline run
//! (at-most-one-in-flight). State advances are validated and broadcast
//! through a watch channel; waiters join a record instead of re-running it.

use crate::error::{EvalError, LoaderError};
use crate::executor::ModuleInfo;
use crate::namespace::Namespace;
use crate::source::ModuleSource;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use skerry_core::{ModuleFormat, ModuleIdentity};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Shared handle to a parked evaluation future (top-level suspension).
pub type SharedEvaluation = Shared<BoxFuture<'static, Result<(), EvalError>>>;

/// Lifecycle state of a module record. Strictly monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleState {
    Resolving,
    Loading,
    Instantiating,
    Evaluating,
    Evaluated,
    Errored,
}

impl ModuleState {
    /// Whether the record reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Evaluated | Self::Errored)
    }

    /// Valid single-step advances; `Errored` is reachable from any
    /// non-terminal state.
    #[must_use]
    fn can_advance_to(self, to: Self) -> bool {
        if to == Self::Errored {
            return !self.is_terminal();
        }
        matches!(
            (self, to),
            (Self::Resolving, Self::Loading)
                | (Self::Loading, Self::Instantiating)
                | (Self::Instantiating, Self::Evaluating)
                | (Self::Evaluating, Self::Evaluated)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::Loading => "loading",
            Self::Instantiating => "instantiating",
            Self::Evaluating => "evaluating",
            Self::Evaluated => "evaluated",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Default)]
struct RecordCell {
    format: Option<ModuleFormat>,
    source: Option<ModuleSource>,
    info: Option<ModuleInfo>,
    error: Option<LoaderError>,
    pending: Option<SharedEvaluation>,
    dependents: BTreeSet<ModuleIdentity>,
}

/// A module's cache entry: identity, state machine, loaded artifacts, and
/// the namespace object all requesters share.
pub struct ModuleRecord {
    identity: ModuleIdentity,
    namespace: Namespace,
    state_tx: watch::Sender<ModuleState>,
    cell: Mutex<RecordCell>,
}

impl ModuleRecord {
    fn new(identity: ModuleIdentity) -> Self {
        let (state_tx, _) = watch::channel(ModuleState::Resolving);
        Self {
            identity,
            namespace: Namespace::new(),
            state_tx,
            cell: Mutex::new(RecordCell::default()),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    /// The namespace object. Identity-stable for the record's lifetime.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    #[must_use]
    pub fn state(&self) -> ModuleState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ModuleState> {
        self.state_tx.subscribe()
    }

    /// Advance the state machine one step. Out-of-order advances are
    /// programming errors and surface as `InvalidStateTransition`.
    pub fn advance(&self, to: ModuleState) -> Result<(), EvalError> {
        let mut result = Ok(());
        self.state_tx.send_modify(|state| {
            if state.can_advance_to(to) {
                tracing::trace!(identity = %self.identity, from = %state, %to, "state advance");
                *state = to;
            } else {
                result = Err(EvalError::InvalidStateTransition {
                    identity: self.identity.to_string(),
                    from: *state,
                    to,
                });
            }
        });
        result
    }

    /// Transition to `Errored`, caching the first error for replay. Late
    /// failures after a terminal state are dropped.
    pub fn fail(&self, error: LoaderError) {
        {
            let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
            if cell.error.is_none() {
                cell.error = Some(error);
            }
        }
        self.state_tx.send_modify(|state| {
            if !state.is_terminal() {
                tracing::debug!(identity = %self.identity, from = %state, "record errored");
                *state = ModuleState::Errored;
            }
        });
    }

    /// Mark evaluation complete if the record is still `Evaluating`.
    /// Idempotent: racing completers of a shared evaluation all call this.
    pub fn finish_evaluation(&self) {
        self.state_tx.send_modify(|state| {
            if *state == ModuleState::Evaluating {
                *state = ModuleState::Evaluated;
            }
        });
    }

    /// The cached terminal error, if any.
    #[must_use]
    pub fn error(&self) -> Option<LoaderError> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error
            .clone()
    }

    pub fn set_format(&self, format: ModuleFormat) {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .format = Some(format);
    }

    #[must_use]
    pub fn format(&self) -> Option<ModuleFormat> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .format
    }

    pub fn set_source(&self, source: ModuleSource) {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .source = Some(source);
    }

    #[must_use]
    pub fn source(&self) -> Option<ModuleSource> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .source
            .clone()
    }

    pub fn set_info(&self, info: ModuleInfo) {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner).info = Some(info);
    }

    #[must_use]
    pub fn info(&self) -> Option<ModuleInfo> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info
            .clone()
    }

    /// Record a module that requested this one.
    pub fn add_dependent(&self, dependent: &ModuleIdentity) {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dependents
            .insert(dependent.clone());
    }

    /// Identities that requested this record.
    #[must_use]
    pub fn dependents(&self) -> Vec<ModuleIdentity> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dependents
            .iter()
            .cloned()
            .collect()
    }

    /// Park a suspended evaluation so later (asynchronous) requesters can
    /// drive it; wakes current waiters so they observe the parked future.
    pub fn park_evaluation(&self, shared: SharedEvaluation) {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending = Some(shared);
        // State is unchanged but waiters must re-check for the parked
        // future; send_modify notifies unconditionally.
        self.state_tx.send_modify(|_| {});
    }

    /// The parked evaluation, if any.
    #[must_use]
    pub fn pending_evaluation(&self) -> Option<SharedEvaluation> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .clone()
    }
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("identity", &self.identity.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Registry of module records, keyed by canonical identity.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    records: DashMap<ModuleIdentity, Arc<ModuleRecord>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or atomically create the record for an identity.
    ///
    /// The boolean is true when this call created the record; the creator
    /// owns the pipeline run, everyone else joins.
    #[must_use]
    pub fn get_or_create(&self, identity: &ModuleIdentity) -> (Arc<ModuleRecord>, bool) {
        match self.records.entry(identity.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                tracing::debug!(identity = %identity, "record created");
                let record = Arc::new(ModuleRecord::new(identity.clone()));
                entry.insert(Arc::clone(&record));
                (record, true)
            }
        }
    }

    /// Look up a record without creating one.
    #[must_use]
    pub fn get(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleRecord>> {
        self.records.get(identity).map(|r| Arc::clone(r.value()))
    }

    /// Destroy a record. Later `get_or_create` runs a fresh pipeline.
    pub fn invalidate(&self, identity: &ModuleIdentity) -> bool {
        let removed = self.records.remove(identity).is_some();
        if removed {
            tracing::debug!(identity = %identity, "record invalidated");
        }
        removed
    }

    /// Destroy all records.
    pub fn invalidate_all(&self) {
        tracing::debug!(count = self.records.len(), "registry flushed");
        self.records.clear();
    }

    /// Destroy a record and, transitively, everything that imported it.
    /// Returns the number of records removed.
    pub fn invalidate_with_dependents(&self, identity: &ModuleIdentity) -> usize {
        let mut queue = vec![identity.clone()];
        let mut seen = BTreeSet::new();

        while let Some(current) = queue.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(record) = self.get(&current) {
                queue.extend(record.dependents());
            }
        }

        let mut removed = 0;
        for id in &seen {
            if self.invalidate(id) {
                removed += 1;
            }
        }
        removed
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
