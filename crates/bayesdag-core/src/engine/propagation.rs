//! Touch / keep / restore propagation.
//!
//! A proposal is a three-phase transaction over a root node:
//!
//! 1. `touch(root)` snapshots the root and its affected closure and marks
//!    them stale.
//! 2. The caller mutates the root (usually through
//!    [`propose_value`](ModelGraph::propose_value)).
//! 3. `keep(root)` accepts the new state or `restore(root)` puts every
//!    snapshot back.
//!
//! The affected closure is found by walking children: deterministic nodes
//! pass the walk on, stochastic nodes are included but stop it, since their
//! own value does not depend on their parents.

use rustc_hash::FxHashSet;

use super::errors::DagError;
use super::graph::ModelGraph;
use super::node::{NodeId, NodeType, TouchOrigin};

impl ModelGraph {
    /// Starts a proposal on `root`.
    ///
    /// Every node that is about to become stale first has its cached value and
    /// log-probability brought up to date, so the snapshots it takes are exact.
    /// Touching a node that already holds a snapshot keeps the first one.
    pub fn touch(&mut self, root: NodeId) -> Result<(), DagError> {
        self.node(root)?;
        let closure = self.affected_closure(root);

        for &id in std::iter::once(&root).chain(&closure) {
            let fresh = self.slot(id).is_some_and(|n| !n.kind.is_snapshotted());
            if fresh {
                self.refresh_known(id);
            }
        }

        self.touch_one(root, TouchOrigin::Direct);
        for id in closure {
            self.touch_one(id, TouchOrigin::Upstream);
        }
        Ok(())
    }

    /// Accepts the proposal on `root`: cached results are brought up to date
    /// and become the new rollback state.
    ///
    /// Keeping a node that holds no snapshot is a no-op.
    pub fn keep(&mut self, root: NodeId) -> Result<(), DagError> {
        self.node(root)?;
        let closure = self.affected_closure(root);
        for id in std::iter::once(root).chain(closure) {
            self.refresh_known(id);
            let Some(node) = self.slot_mut(id) else { continue };
            let was = node.kind.is_snapshotted();
            node.kind.keep_me();
            if was {
                self.pending -= 1;
            }
        }
        Ok(())
    }

    /// Rejects the proposal on `root`: every snapshot in the root's closure is
    /// put back bit-for-bit. Nothing is recomputed.
    pub fn restore(&mut self, root: NodeId) -> Result<(), DagError> {
        self.node(root)?;
        let closure = self.affected_closure(root);
        for id in std::iter::once(root).chain(closure) {
            let Some(node) = self.slot_mut(id) else { continue };
            let was = node.kind.is_snapshotted();
            node.kind.restore_me();
            if was {
                self.pending -= 1;
            }
        }
        Ok(())
    }

    /// Inserts every stochastic node whose probability depends on `root`
    /// through deterministic intermediates. Neither `root` nor deterministic
    /// nodes are inserted.
    pub fn affected(&self, root: NodeId, collector: &mut FxHashSet<NodeId>) -> Result<(), DagError> {
        self.node(root)?;
        collector.extend(
            self.affected_closure(root)
                .into_iter()
                .filter(|id| self.slot(*id).map(|n| n.node_type()) == Some(NodeType::Stochastic)),
        );
        Ok(())
    }

    /// Nodes reached from `root`'s children, in discovery order, passing
    /// through deterministic nodes and stopping at stochastic ones. Excludes
    /// `root` unless a cycle exists, which the edge operations rule out.
    pub(crate) fn affected_closure(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        visited.insert(root);
        let mut stack: Vec<NodeId> = match self.slot(root) {
            Some(node) => node.children.iter().copied().collect(),
            None => return order,
        };
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.slot(id) else { continue };
            order.push(id);
            if node.node_type() == NodeType::Deterministic {
                stack.extend(node.children.iter().copied());
            }
        }
        order
    }

    fn touch_one(&mut self, id: NodeId, origin: TouchOrigin) {
        let Some(node) = self.slot_mut(id) else { return };
        let was = node.kind.is_snapshotted();
        node.kind.touch_me(origin);
        if !was && node.kind.is_snapshotted() {
            self.pending += 1;
        }
    }
}
