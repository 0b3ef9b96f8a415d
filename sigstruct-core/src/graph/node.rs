//! Graph nodes: one per cell, derivation and reaction.

use std::cell::Cell;

use indexmap::IndexSet;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

/// Identity of a reactive node.
///
/// Ids come from a per-thread counter. Runtimes are confined to the thread
/// that created them, so an id never repeats within any graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn fresh() -> Self {
        NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            Self(id)
        })
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A cell. Only ever has dependents.
    Source,
    /// A derivation. Reads other nodes and is read in turn.
    Derived,
    /// A reaction. Reads other nodes; nothing reads it.
    Effect,
}

/// How stale a node is.
///
/// Ordered: propagation only ever raises a node's state, and only the node's
/// own re-run lowers it back to `Clean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    Clean,
    /// Something upstream changed, but not a direct source. The node has to
    /// refresh its sources before deciding whether to re-run.
    MaybeDirty,
    /// A direct source changed.
    Dirty,
}

/// Adjacency and staleness of one node.
///
/// Both edge sets keep insertion order, so refreshing sources and queueing
/// reactions happen in the order the reads were made.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    state: DirtyState,
    /// What this node read during its last run.
    sources: IndexSet<NodeId>,
    /// Who read this node during their last run.
    observers: IndexSet<NodeId>,
}

impl Node {
    /// Derivations and reactions begin `Dirty`: they have never run.
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        let state = match kind {
            NodeKind::Source => DirtyState::Clean,
            NodeKind::Derived | NodeKind::Effect => DirtyState::Dirty,
        };
        Self {
            id,
            kind,
            state,
            sources: IndexSet::new(),
            observers: IndexSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.state
    }

    pub fn mark_clean(&mut self) {
        self.state = DirtyState::Clean;
    }

    /// Raise to at least `state`, returning what it was before.
    pub fn raise(&mut self, state: DirtyState) -> DirtyState {
        let before = self.state;
        self.state = before.max(state);
        before
    }

    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.sources
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.observers
    }

    pub(crate) fn link_source(&mut self, id: NodeId) {
        self.sources.insert(id);
    }

    pub(crate) fn unlink_source(&mut self, id: NodeId) {
        self.sources.shift_remove(&id);
    }

    pub(crate) fn link_observer(&mut self, id: NodeId) {
        self.observers.insert(id);
    }

    pub(crate) fn unlink_observer(&mut self, id: NodeId) {
        self.observers.shift_remove(&id);
    }
}
