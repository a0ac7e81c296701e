//! Commit controller.
//!
//! Design principles:
//! - Mutators are synchronous; the only suspension point is the consumer future
//! - One pending debounce timer at most; scheduling aborts the previous one
//! - A firing timer detaches itself under the lock before committing, so a
//!   consumer call that has started is never aborted
//! - Every commit takes a sequence number; results from anything but the
//!   latest commit are discarded
//! - State lives behind a `std::sync::Mutex` that is never held across `.await`
//! - Snapshots are taken under the lock and published after it is released;
//!   a version number keeps a late publisher from replacing a newer snapshot

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{ApplyMode, EngineConfig};
use crate::error::{FilterError, Result};
use crate::intent::{ApplyState, ApplyStatus, FilterIntent};
use crate::query::{materialize, EffectiveQuery};
use crate::store::{FilterPatch, FilterStore, FilterUpdate};
use crate::summary::{project, FilterSummary};

/// Future returned by a [`QueryConsumer`].
pub type ConsumerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// The data layer behind the filter bar.
///
/// Resolution marks the commit applied, rejection marks it failed. A consumer
/// that wants a timeout implements it itself and rejects.
pub trait QueryConsumer: Send + Sync + 'static {
    fn on_filters_change(&self, query: EffectiveQuery) -> ConsumerFuture;
}

impl<F, Fut> QueryConsumer for F
where
    F: Fn(EffectiveQuery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn on_filters_change(&self, query: EffectiveQuery) -> ConsumerFuture {
        Box::pin(self(query))
    }
}

/// What happened to one `apply_filters` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    Failed(String),
    /// A newer commit started before this one resolved; its result was dropped.
    Superseded,
}

/// Everything a host view renders, published on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSnapshot {
    pub intent: FilterIntent,
    pub apply: ApplyState,
    pub summary: FilterSummary,
    pub query: EffectiveQuery,
    pub mode: ApplyMode,
    pub revision: u64,
    /// A debounce timer is armed and will commit unless cancelled.
    pub commit_pending: bool,
    /// Increases with every published snapshot.
    pub version: u64,
}

struct PendingCommit {
    generation: u64,
    handle: JoinHandle<()>,
}

struct EngineState {
    store: FilterStore,
    apply: ApplyState,
    mode: ApplyMode,
    commit_sequence: u64,
    /// Sequence of the latest started commit that has not settled yet.
    in_flight: Option<u64>,
    pending: Option<PendingCommit>,
    debounce_generation: u64,
    published: u64,
}

impl EngineState {
    fn snapshot(&self) -> FilterSnapshot {
        let intent = self.store.intent();
        FilterSnapshot {
            intent: intent.clone(),
            apply: self.apply.clone(),
            summary: project(intent),
            query: materialize(intent),
            mode: self.mode,
            revision: self.store.revision(),
            commit_pending: self.pending.is_some(),
            version: self.published,
        }
    }

    /// Snapshot for publishing; takes the next version.
    fn next_snapshot(&mut self) -> FilterSnapshot {
        self.published += 1;
        self.snapshot()
    }

    fn cancel_pending(&mut self) {
        self.debounce_generation += 1;
        if let Some(pending) = self.pending.take() {
            trace!(generation = pending.generation, "cancelling pending commit");
            pending.handle.abort();
        }
    }
}

struct Shared {
    config: EngineConfig,
    consumer: Box<dyn QueryConsumer>,
    clock: Box<dyn Clock>,
    runtime: Handle,
    state: Mutex<EngineState>,
    updates: watch::Sender<FilterSnapshot>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.cancel_pending();
    }
}

/// Filter engine handle. Clones share one intent; dropping the last clone
/// cancels any pending debounce timer.
#[derive(Clone)]
pub struct FilterEngine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FilterEngine")
            .field("mode", &state.mode)
            .field("status", &state.apply.status)
            .field("revision", &state.store.revision())
            .field("commit_sequence", &state.commit_sequence)
            .finish()
    }
}

impl FilterEngine {
    /// Create an engine on the current Tokio runtime using the system clock.
    pub fn new<C>(config: EngineConfig, consumer: C) -> Result<Self>
    where
        C: QueryConsumer,
    {
        Self::with_clock(config, consumer, SystemClock)
    }

    pub fn with_clock<C, K>(config: EngineConfig, consumer: C, clock: K) -> Result<Self>
    where
        C: QueryConsumer,
        K: Clock + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| FilterError::RuntimeUnavailable)?;
        let state = EngineState {
            store: FilterStore::new(FilterIntent::seeded(&config, clock.now())),
            apply: ApplyState::default(),
            mode: config.mode,
            commit_sequence: 0,
            in_flight: None,
            pending: None,
            debounce_generation: 0,
            published: 0,
        };
        let (updates, _) = watch::channel(state.snapshot());
        debug!(mode = %config.mode, debounce_ms = config.debounce_ms, "filter engine mounted");

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                consumer: Box::new(consumer),
                clock: Box::new(clock),
                runtime,
                state: Mutex::new(state),
                updates,
            }),
        })
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn intent(&self) -> FilterIntent {
        self.lock().store.intent().clone()
    }

    pub fn status(&self) -> ApplyStatus {
        self.lock().apply.status
    }

    pub fn apply_state(&self) -> ApplyState {
        self.lock().apply.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().apply.last_error.clone()
    }

    pub fn mode(&self) -> ApplyMode {
        self.lock().mode
    }

    pub fn summary(&self) -> FilterSummary {
        project(self.lock().store.intent())
    }

    pub fn effective_query(&self) -> EffectiveQuery {
        materialize(self.lock().store.intent())
    }

    pub fn snapshot(&self) -> FilterSnapshot {
        self.lock().snapshot()
    }

    /// Receive a fresh snapshot after every mutation and status change.
    ///
    /// A `watch::Ref` from `borrow()` blocks publishing while it is alive.
    /// Clone what you need and drop the borrow before calling back into the
    /// engine from the same thread.
    pub fn subscribe(&self) -> watch::Receiver<FilterSnapshot> {
        self.shared.updates.subscribe()
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    pub fn update_filter(&self, update: FilterUpdate) {
        let now = self.shared.clock.now();
        self.mutate(|store| store.update_filter(update, now));
    }

    pub fn update_municipalities(&self, municipalities: &[String]) {
        self.mutate(|store| store.update_municipalities(municipalities));
    }

    pub fn add_municipality(&self, name: &str) {
        self.mutate(|store| store.add_municipality(name));
    }

    pub fn remove_municipality(&self, name: &str) {
        self.mutate(|store| store.remove_municipality(name));
    }

    pub fn toggle_region(&self, key: &str) {
        self.mutate(|store| store.toggle_region(key));
    }

    /// Restore the configured initial filters and request a commit, even if
    /// nothing changed.
    pub fn reset_filters(&self) {
        let seed = FilterIntent::seeded(&self.shared.config, self.shared.clock.now());
        let snapshot = {
            let mut state = self.lock();
            state.store.reset(seed);
            debug!("filters reset");
            self.request_commit(&mut state)
        };
        self.publish(snapshot);
    }

    /// Merge filters handed back by another view. Status is never reset; it
    /// only turns dirty when the merge changed something.
    pub fn sync_with_external_state(&self, patch: FilterPatch) {
        if patch.is_empty() {
            return;
        }
        let now = self.shared.clock.now();
        self.mutate(|store| store.sync_with_external_state(patch, now));
    }

    /// Switch between auto and manual apply.
    pub fn set_mode(&self, mode: ApplyMode) {
        let snapshot = {
            let mut state = self.lock();
            if state.mode == mode {
                return;
            }
            state.mode = mode;
            match mode {
                ApplyMode::Manual => state.cancel_pending(),
                ApplyMode::Auto if state.apply.status == ApplyStatus::Dirty => {
                    self.schedule_commit(&mut state);
                }
                ApplyMode::Auto => {}
            }
            debug!(%mode, "apply mode changed");
            state.next_snapshot()
        };
        self.publish(snapshot);
    }

    /// Cancel the pending debounce timer, if any. In-flight commits still settle.
    pub fn shutdown(&self) {
        let snapshot = {
            let mut state = self.lock();
            let was_pending = state.pending.is_some();
            state.cancel_pending();
            if !was_pending {
                return;
            }
            state.next_snapshot()
        };
        self.publish(snapshot);
    }

    // ------------------------------------------------------------------
    // Commit protocol
    // ------------------------------------------------------------------

    /// Materialize the current intent and hand it to the consumer.
    ///
    /// Any pending debounce timer is cancelled since this commit already
    /// carries the edits it was waiting for.
    pub async fn apply_filters(&self) -> CommitOutcome {
        let (sequence, query) = self.begin_commit();
        let result = self.shared.consumer.on_filters_change(query.clone()).await;
        self.settle(sequence, query, result)
    }

    /// Run `apply_filters` as its own task, for callers that cannot await.
    pub fn spawn_apply(&self) -> JoinHandle<CommitOutcome> {
        let engine = self.clone();
        self.shared
            .runtime
            .spawn(async move { engine.apply_filters().await })
    }

    fn begin_commit(&self) -> (u64, EffectiveQuery) {
        let (sequence, query, snapshot) = {
            let mut state = self.lock();
            state.cancel_pending();

            if let Some(previous) = state.in_flight {
                debug!(superseded = previous, "superseding in-flight commit");
            }
            state.commit_sequence += 1;
            let sequence = state.commit_sequence;
            state.in_flight = Some(sequence);
            state.apply.status = ApplyStatus::Applying;

            let query = materialize(state.store.intent());
            debug!(sequence, municipalities = query.municipalities.len(), "dispatching filter commit");
            (sequence, query, state.next_snapshot())
        };
        self.publish(snapshot);
        (sequence, query)
    }

    fn settle(
        &self,
        sequence: u64,
        query: EffectiveQuery,
        result: anyhow::Result<()>,
    ) -> CommitOutcome {
        let now = self.shared.clock.now();
        let (outcome, snapshot) = {
            let mut state = self.lock();
            if sequence != state.commit_sequence {
                debug!(sequence, latest = state.commit_sequence, "discarding superseded commit result");
                return CommitOutcome::Superseded;
            }
            state.in_flight = None;

            // Edits made while the consumer ran are not reflected here; in auto
            // mode they have already armed the next commit.
            let outcome = match result {
                Ok(()) => {
                    state.apply.status = ApplyStatus::Applied;
                    state.apply.last_applied_at = Some(now);
                    state.apply.last_error = None;
                    state.apply.last_applied = Some(query);
                    state.apply.applied_sequence = sequence;
                    info!(sequence, "filters applied");
                    CommitOutcome::Applied
                }
                Err(err) => {
                    let message = format!("{:#}", err);
                    warn!(sequence, error = %message, "filter commit failed");
                    state.apply.status = ApplyStatus::Error;
                    state.apply.last_error = Some(message.clone());
                    CommitOutcome::Failed(message)
                }
            };
            (outcome, state.next_snapshot())
        };
        self.publish(snapshot);
        outcome
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(&self, edit: impl FnOnce(&mut FilterStore) -> bool) {
        let snapshot = {
            let mut state = self.lock();
            if !edit(&mut state.store) {
                return;
            }
            self.request_commit(&mut state)
        };
        self.publish(snapshot);
    }

    /// Mark dirty and arm the debounce timer in auto mode. Returns the
    /// snapshot to publish once the lock is released.
    fn request_commit(&self, state: &mut EngineState) -> FilterSnapshot {
        state.apply.status = ApplyStatus::Dirty;
        if state.mode == ApplyMode::Auto {
            self.schedule_commit(state);
        }
        state.next_snapshot()
    }

    /// Trailing-edge debounce: replace any pending timer with a fresh one.
    fn schedule_commit(&self, state: &mut EngineState) {
        state.cancel_pending();
        let generation = state.debounce_generation;
        let delay = self.shared.config.debounce();
        let weak = Arc::downgrade(&self.shared);

        let handle = self.shared.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(engine) = FilterEngine::claim_pending(&weak, generation) else {
                return;
            };
            engine.apply_filters().await;
        });
        trace!(generation, delay_ms = delay.as_millis() as u64, "commit scheduled");
        state.pending = Some(PendingCommit { generation, handle });
    }

    /// Called by a timer that has fired. Returns an engine handle only if the
    /// timer is still the current one, detaching it so later mutations can
    /// no longer abort the commit it is about to run.
    fn claim_pending(weak: &Weak<Shared>, generation: u64) -> Option<FilterEngine> {
        let shared = weak.upgrade()?;
        let engine = FilterEngine { shared };
        {
            let mut state = engine.lock();
            if state.debounce_generation != generation {
                trace!(generation, "stale debounce timer ignored");
                return None;
            }
            state.pending = None;
        }
        Some(engine)
    }

    /// Must be called without the state lock held.
    fn publish(&self, snapshot: FilterSnapshot) {
        self.shared.updates.send_if_modified(|current| {
            if snapshot.version <= current.version {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}
