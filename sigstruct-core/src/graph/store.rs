//! Dependency graph storage and dirty propagation.
//!
//! Propagation pushes staleness and leaves values alone:
//!
//! - observers of the changed node become `Dirty`;
//! - everything further downstream becomes `MaybeDirty`;
//! - reactions that were `Clean` are handed back to the caller for queueing.
//!
//! Derivations are recomputed later, on read. A `MaybeDirty` derivation
//! refreshes its sources first and only re-runs if one of them turned out
//! to have changed.

use std::collections::{HashMap, HashSet, VecDeque};

use smallvec::SmallVec;

use super::node::{DirtyState, Node, NodeId, NodeKind};

/// Sources of a node, in read order. Most nodes read only a handful.
pub type Sources = SmallVec<[NodeId; 8]>;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<NodeId, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Drop a node along with every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for source in node.dependencies() {
            if let Some(source) = self.nodes.get_mut(source) {
                source.unlink_observer(id);
            }
        }
        for observer in node.dependents() {
            if let Some(observer) = self.nodes.get_mut(observer) {
                observer.unlink_source(id);
            }
        }
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Record that `observer` read `source`. Unknown ids are ignored.
    pub fn add_edge(&mut self, source: NodeId, observer: NodeId) {
        if source == observer
            || !self.nodes.contains_key(&source)
            || !self.nodes.contains_key(&observer)
        {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&source) {
            node.link_observer(observer);
        }
        if let Some(node) = self.nodes.get_mut(&observer) {
            node.link_source(source);
        }
    }

    pub fn remove_edge(&mut self, source: NodeId, observer: NodeId) {
        if let Some(node) = self.nodes.get_mut(&source) {
            node.unlink_observer(observer);
        }
        if let Some(node) = self.nodes.get_mut(&observer) {
            node.unlink_source(source);
        }
    }

    /// Swap the sources of `id` for those read during its latest run.
    pub fn replace_dependencies(&mut self, id: NodeId, sources: &[NodeId]) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let dropped: Sources = node
            .dependencies()
            .iter()
            .copied()
            .filter(|source| !sources.contains(source))
            .collect();

        for source in dropped {
            self.remove_edge(source, id);
        }
        for &source in sources {
            self.add_edge(source, id);
        }
    }

    pub fn dependencies_of(&self, id: NodeId) -> Sources {
        match self.nodes.get(&id) {
            Some(node) => node.dependencies().iter().copied().collect(),
            None => Sources::new(),
        }
    }

    /// How many nodes read `id` during their last run.
    pub fn observer_count(&self, id: NodeId) -> usize {
        self.nodes.get(&id).map_or(0, |node| node.dependents().len())
    }

    pub fn state(&self, id: NodeId) -> Option<DirtyState> {
        self.nodes.get(&id).map(Node::dirty_state)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&id).map(Node::kind)
    }

    pub fn mark_clean(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.mark_clean();
        }
    }

    pub fn mark_dirty(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.raise(DirtyState::Dirty);
        }
    }

    /// Propagate a change of `changed` downstream.
    ///
    /// Returns the reactions that just left `Clean`, breadth-first. A
    /// reaction already waiting to run is not returned twice.
    pub fn mark_changed(&mut self, changed: NodeId) -> Vec<NodeId> {
        let mut woken = Vec::new();
        let mut seen = HashSet::new();
        let mut frontier: VecDeque<(NodeId, DirtyState)> = self
            .nodes
            .get(&changed)
            .map(|node| {
                node.dependents()
                    .iter()
                    .map(|&id| (id, DirtyState::Dirty))
                    .collect()
            })
            .unwrap_or_default();

        while let Some((id, state)) = frontier.pop_front() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let before = node.raise(state);

            // Reached again: the raise above is all that is left to do.
            if !seen.insert(id) {
                continue;
            }

            match node.kind() {
                NodeKind::Effect if before == DirtyState::Clean => woken.push(id),
                NodeKind::Derived => frontier.extend(
                    node.dependents()
                        .iter()
                        .map(|&observer| (observer, DirtyState::MaybeDirty)),
                ),
                _ => {}
            }
        }

        tracing::trace!(node = changed.raw(), woken = woken.len(), "change propagated");
        woken
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(kinds: &[NodeKind]) -> (DependencyGraph, Vec<NodeId>) {
        let mut graph = DependencyGraph::new();
        let ids = kinds
            .iter()
            .map(|&kind| {
                let id = graph.add_node(Node::with_id(NodeId::fresh(), kind));
                graph.mark_clean(id);
                id
            })
            .collect();
        (graph, ids)
    }

    use NodeKind::{Derived, Effect, Source};

    #[test]
    fn removing_a_node_unlinks_both_sides() {
        let (mut graph, ids) = graph_with(&[Source, Derived, Effect]);
        let (cell, memo, effect) = (ids[0], ids[1], ids[2]);
        graph.add_edge(cell, memo);
        graph.add_edge(memo, effect);

        graph.remove_node(memo);

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.observer_count(cell), 0);
        assert!(graph.dependencies_of(effect).is_empty());
    }

    #[test]
    fn self_edges_and_unknown_nodes_are_ignored() {
        let (mut graph, ids) = graph_with(&[Derived]);
        graph.add_edge(ids[0], ids[0]);
        graph.add_edge(NodeId::fresh(), ids[0]);

        assert!(graph.dependencies_of(ids[0]).is_empty());
    }

    #[test]
    fn replacing_sources_keeps_read_order() {
        let (mut graph, ids) = graph_with(&[Source, Source, Source, Derived]);
        let (a, b, c, memo) = (ids[0], ids[1], ids[2], ids[3]);

        graph.replace_dependencies(memo, &[c, a]);
        assert_eq!(graph.dependencies_of(memo).as_slice(), &[c, a]);

        graph.replace_dependencies(memo, &[a, b]);
        assert_eq!(graph.dependencies_of(memo).as_slice(), &[a, b]);
        assert_eq!(graph.observer_count(c), 0);
    }

    #[test]
    fn only_direct_observers_become_dirty() {
        let (mut graph, ids) = graph_with(&[Source, Derived, Derived, Effect]);
        let (cell, near, far, effect) = (ids[0], ids[1], ids[2], ids[3]);
        graph.add_edge(cell, near);
        graph.add_edge(near, far);
        graph.add_edge(far, effect);

        assert_eq!(graph.mark_changed(cell), vec![effect]);
        assert_eq!(graph.state(near), Some(DirtyState::Dirty));
        assert_eq!(graph.state(far), Some(DirtyState::MaybeDirty));
        assert_eq!(graph.state(effect), Some(DirtyState::MaybeDirty));
    }

    #[test]
    fn waiting_reaction_is_not_woken_twice() {
        let (mut graph, ids) = graph_with(&[Source, Effect]);
        graph.add_edge(ids[0], ids[1]);

        assert_eq!(graph.mark_changed(ids[0]), vec![ids[1]]);
        assert!(graph.mark_changed(ids[0]).is_empty());
    }

    #[test]
    fn diamond_wakes_shared_reaction_once() {
        let (mut graph, ids) = graph_with(&[Source, Derived, Derived, Effect]);
        let (cell, left, right, effect) = (ids[0], ids[1], ids[2], ids[3]);
        for (source, observer) in [(cell, left), (cell, right), (left, effect), (right, effect)] {
            graph.add_edge(source, observer);
        }

        assert_eq!(graph.mark_changed(cell), vec![effect]);
    }

    #[test]
    fn direct_path_wins_over_indirect() {
        // cell feeds `memo` directly and through `mid`.
        let (mut graph, ids) = graph_with(&[Source, Derived, Derived]);
        let (cell, mid, memo) = (ids[0], ids[1], ids[2]);
        graph.add_edge(cell, mid);
        graph.add_edge(mid, memo);
        graph.add_edge(cell, memo);

        graph.mark_changed(cell);
        assert_eq!(graph.state(memo), Some(DirtyState::Dirty));
    }
}
