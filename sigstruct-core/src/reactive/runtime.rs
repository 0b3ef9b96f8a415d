//! The runtime.
//!
//! Everything reactive hangs off a [`Runtime`]: the dependency graph, the
//! stack of tracking frames, the batch queues and the scheduler used by the
//! async bridge. There is no ambient global; each primitive is created from
//! an explicit handle, and primitives only keep a weak reference back.
//!
//! Memos and effects register under their node id so that propagation and
//! flushing can reach them without owning them. Effects are additionally
//! owned by the runtime until disposed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::bridge::{Scheduler, TokioScheduler};
use crate::config::RuntimeConfig;
use crate::graph::{DependencyGraph, DirtyState, Node, NodeId, NodeKind};

use super::batch::BatchState;
use super::context::ReactiveContext;
use super::effect::{Cleanup, Effect};
use super::memo::Memo;
use super::signal::{Equality, Signal};

/// A node the runtime can bring up to date by ID.
pub(crate) trait Reactive {
    /// Memos recompute if a dependency really changed; effects re-run.
    fn update_if_necessary(&self);
}

/// Handle to a reactive runtime. Cloning is cheap and shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) graph: RefCell<DependencyGraph>,
    pub(crate) context: ReactiveContext,
    pub(crate) batch: BatchState,

    /// Memos and effects, by node. Weak so that dropping a memo handle frees it.
    registry: RefCell<HashMap<NodeId, Weak<dyn Reactive>>>,

    /// Effects are kept alive by the runtime until they are disposed.
    owned: RefCell<HashMap<NodeId, Rc<dyn Reactive>>>,

    scheduler: Rc<dyn Scheduler>,
}

/// Builder for a [`Runtime`] with non-default configuration or scheduler.
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    scheduler: Option<Rc<dyn Scheduler>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Scheduler used by the async bridge to spawn source-draining tasks.
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Runtime {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Rc::new(TokioScheduler) as Rc<dyn Scheduler>);

        Runtime {
            inner: Rc::new(RuntimeInner {
                config: self.config,
                graph: RefCell::new(DependencyGraph::new()),
                context: ReactiveContext::new(),
                batch: BatchState::default(),
                registry: RefCell::new(HashMap::new()),
                owned: RefCell::new(HashMap::new()),
                scheduler,
            }),
        }
    }
}

impl Runtime {
    /// Create a runtime with default configuration and the tokio scheduler.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.inner.scheduler)
    }

    /// Create a signal compared with `PartialEq`: writing an equal value is
    /// a no-op.
    pub fn cell<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + 'static,
    {
        Signal::new_in(self, value, Equality::partial_eq())
    }

    /// Create a signal with an explicit equality policy.
    pub fn cell_with_equality<T>(&self, value: T, equality: Equality<T>) -> Signal<T>
    where
        T: Clone + 'static,
    {
        Signal::new_in(self, value, equality)
    }

    /// Create a memo from an infallible computation.
    pub fn derive<T, F>(&self, compute: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        Memo::new_in(self, move || Ok(compute()), None)
    }

    /// Create a memo whose computation may fail.
    pub fn try_derive<T, F>(&self, compute: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> crate::Result<T> + 'static,
    {
        Memo::new_in(self, compute, None)
    }

    /// Create a writable memo: writes are forwarded to `setter`.
    pub fn derive_with_setter<T, F, S>(&self, compute: F, setter: S) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> crate::Result<T> + 'static,
        S: Fn(T) -> crate::Result<()> + 'static,
    {
        Memo::new_in(self, compute, Some(Box::new(setter)))
    }

    /// Create an effect and run it once right away.
    ///
    /// The effect stays alive until it is disposed.
    pub fn react<F, C>(&self, run: F) -> Effect
    where
        F: FnMut() -> C + 'static,
        C: Into<Cleanup>,
    {
        Effect::new_in(self, run, true)
    }

    /// Run `f` with effect flushing deferred until the outermost batch exits.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = self.inner.begin_batch();
        f()
    }

    /// Run `f` without recording any reads as dependencies.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.untrack(f)
    }

    pub fn batch_depth(&self) -> usize {
        self.inner.batch.depth()
    }

    pub fn is_batching(&self) -> bool {
        self.inner.batch.depth() > 0
    }

    /// Whether a memo or effect is currently recording reads.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// Number of effects waiting to be flushed.
    pub fn pending_effects(&self) -> usize {
        self.inner.batch.pending_len()
    }

    /// Number of live nodes in the dependency graph.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("batch_depth", &self.batch_depth())
            .field("pending_effects", &self.pending_effects())
            .finish()
    }
}

impl RuntimeInner {
    pub(crate) fn add_node(&self, id: NodeId, kind: NodeKind) {
        self.graph.borrow_mut().add_node(Node::with_id(id, kind));
    }

    /// Remove a node on drop. Tolerates being called while the graph is
    /// borrowed; the node is then left behind and ignored.
    pub(crate) fn release_node(&self, id: NodeId) {
        if let Ok(mut graph) = self.graph.try_borrow_mut() {
            graph.remove_node(id);
        }
        if let Ok(mut registry) = self.registry.try_borrow_mut() {
            registry.remove(&id);
        }
    }

    pub(crate) fn register(&self, id: NodeId, reactive: Weak<dyn Reactive>) {
        self.registry.borrow_mut().insert(id, reactive);
    }

    pub(crate) fn own(&self, id: NodeId, reactive: Rc<dyn Reactive>) {
        self.owned.borrow_mut().insert(id, reactive);
    }

    /// Stop owning an effect. The returned handle must be dropped by the
    /// caller after every runtime borrow is released.
    pub(crate) fn disown(&self, id: NodeId) -> Option<Rc<dyn Reactive>> {
        self.registry.borrow_mut().remove(&id);
        self.owned.borrow_mut().remove(&id)
    }

    pub(crate) fn reactive(&self, id: NodeId) -> Option<Rc<dyn Reactive>> {
        let weak = self.registry.borrow().get(&id).cloned();
        weak.and_then(|weak| weak.upgrade())
    }

    /// Record a read of `source` by whatever is currently being computed.
    pub(crate) fn track(&self, source: NodeId) {
        self.context.track(source);
    }

    pub(crate) fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let guard = self.context.enter(None);
        let result = f();
        guard.finish();
        result
    }

    /// Propagate a change of `changed` and queue the effects it reaches.
    ///
    /// Flushes if this is not nested in a batch.
    pub(crate) fn notify_changed(&self, changed: NodeId) {
        let _batch = self.begin_batch();
        let effects = self.graph.borrow_mut().mark_changed(changed);
        if !effects.is_empty() {
            tracing::trace!(
                source = changed.raw(),
                effects = effects.len(),
                "change scheduled effects"
            );
            self.batch.enqueue(effects);
        }
    }

    /// Settle a `MaybeDirty` node by refreshing the memos it read.
    ///
    /// Returns the node's state afterwards: `Dirty` if one of those memos
    /// really changed, `Clean` otherwise.
    pub(crate) fn check_sources(&self, id: NodeId) -> DirtyState {
        let state = self.graph.borrow().state(id);
        if state == Some(DirtyState::MaybeDirty) {
            let dependencies = self.graph.borrow().dependencies_of(id);
            for dependency in dependencies {
                let is_memo = self.graph.borrow().kind(dependency) == Some(NodeKind::Derived);
                if is_memo {
                    if let Some(memo) = self.reactive(dependency) {
                        memo.update_if_necessary();
                    }
                }
                if self.graph.borrow().state(id) == Some(DirtyState::Dirty) {
                    break;
                }
            }

            let mut graph = self.graph.borrow_mut();
            if graph.state(id) == Some(DirtyState::MaybeDirty) {
                graph.mark_clean(id);
            }
        }

        self.graph.borrow().state(id).unwrap_or(DirtyState::Clean)
    }
}
