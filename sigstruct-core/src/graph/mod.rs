//! Dependency Graph
//!
//! One graph per runtime. Nodes stand for cells, derivations and reactions;
//! an edge from A to B means B read A during its last run.
//!
//! Both directions are stored: sources are walked when a derivation checks
//! whether it is really stale, observers when a change is propagated. Edges
//! are rebuilt from scratch after every run, so dependencies that are no
//! longer read drop out.

mod node;
mod store;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use store::{DependencyGraph, Sources};
