//! Deep copies of connected subgraphs.
//!
//! Cloning walks the connected component of a root (following both parent
//! and child links), orders it topologically and copies each node exactly
//! once. The caller-supplied node map (original to clone) is consulted first,
//! so nodes that already have a counterpart are reused rather than copied,
//! which is how several roots can share cloned ancestors.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use super::errors::DagError;
use super::graph::ModelGraph;
use super::node::{DagNode, NodeId};

impl ModelGraph {
    /// Clones the component of `root` into this graph and returns the clone
    /// of `root`. `node_map` receives an entry for every copied node.
    pub fn clone_dag(
        &mut self,
        root: NodeId,
        node_map: &mut FxHashMap<NodeId, NodeId>,
    ) -> Result<NodeId, DagError> {
        let plan = self.clone_plan(root, node_map)?;
        self.check_targets(node_map, &plan)?;
        self.materialize(plan, node_map, root)
    }

    /// Clones the component of `root` into `target` and returns the clone of
    /// `root`. Entries already in `node_map` must name nodes of `target`.
    pub fn clone_dag_into(
        &self,
        root: NodeId,
        target: &mut ModelGraph,
        node_map: &mut FxHashMap<NodeId, NodeId>,
    ) -> Result<NodeId, DagError> {
        let plan = self.clone_plan(root, node_map)?;
        target.check_targets(node_map, &plan)?;
        target.materialize(plan, node_map, root)
    }

    /// Detached copies of every unmapped node in `root`'s component, parents
    /// first. Copies keep their original adjacency for rewiring; children and
    /// reference counts are reset.
    fn clone_plan(
        &self,
        root: NodeId,
        node_map: &FxHashMap<NodeId, NodeId>,
    ) -> Result<ClonePlan, DagError> {
        self.node(root)?;
        self.ensure_quiescent()?;

        let component = self.component(root);
        let order = self.topological_order(&component)?;
        let nodes = order
            .into_iter()
            .filter(|id| !node_map.contains_key(id))
            .filter_map(|id| {
                self.slot(id).map(|node| {
                    let mut copy = node.clone();
                    copy.children.clear();
                    copy.ref_count = 0;
                    (id, copy)
                })
            })
            .collect();
        Ok(ClonePlan { component, nodes })
    }

    /// Undirected reachability from `root`.
    fn component(&self, root: NodeId) -> FxHashSet<NodeId> {
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.slot(id) {
                stack.extend(node.parents.iter().copied());
                stack.extend(node.children.iter().copied());
            }
        }
        seen
    }

    /// Kahn's algorithm over a parent-closed node set. Ties are broken by id
    /// so the clone order, and with it the clone ids, is reproducible.
    fn topological_order(&self, component: &FxHashSet<NodeId>) -> Result<Vec<NodeId>, DagError> {
        let mut in_degree: FxHashMap<NodeId, usize> = FxHashMap::default();
        for &id in component {
            let parents = self.node(id)?.parents.len();
            in_degree.insert(id, parents);
        }

        let mut ready: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_unstable();
        let mut queue: VecDeque<NodeId> = ready.into();

        let mut order = Vec::with_capacity(component.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            let mut children: Vec<NodeId> = self.node(id)?.children.iter().copied().collect();
            children.sort_unstable();
            for child in children {
                if let Some(d) = in_degree.get_mut(&child) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if order.len() != component.len() {
            return Err(DagError::InvalidOperation(
                "graph contains a cycle; cannot clone".to_string(),
            ));
        }
        Ok(order)
    }

    /// Validates the pre-existing map entries that the plan will link to.
    fn check_targets(
        &self,
        node_map: &FxHashMap<NodeId, NodeId>,
        plan: &ClonePlan,
    ) -> Result<(), DagError> {
        for original in &plan.component {
            if let Some(mapped) = node_map.get(original) {
                if !self.contains(*mapped) {
                    return Err(DagError::InvalidOperation(format!(
                        "node map sends {original} to {mapped}, which is not in the target graph"
                    )));
                }
            }
        }
        if !plan.nodes.is_empty() {
            self.ensure_quiescent()?;
        }
        Ok(())
    }

    fn materialize(
        &mut self,
        plan: ClonePlan,
        node_map: &mut FxHashMap<NodeId, NodeId>,
        root: NodeId,
    ) -> Result<NodeId, DagError> {
        for (original, mut node) in plan.nodes {
            let parents = std::mem::take(&mut node.parents);
            let args: Vec<Option<NodeId>> = node
                .kind
                .arguments_mut()
                .map(|args| args.iter_mut().map(Option::take).collect())
                .unwrap_or_default();

            let clone = self.insert(node);
            node_map.insert(original, clone);

            let mapped = |id: NodeId| node_map.get(&id).copied().ok_or(DagError::UnknownNode(id));
            let rebound = args
                .into_iter()
                .map(|slot| slot.map(mapped).transpose())
                .collect::<Result<Vec<_>, _>>()?;
            let new_parents = parents
                .into_iter()
                .map(mapped)
                .collect::<Result<Vec<_>, _>>()?;

            if let Some(slots) = self.slot_mut(clone).and_then(|n| n.kind.arguments_mut()) {
                for (slot, bound) in slots.iter_mut().zip(rebound) {
                    *slot = bound;
                }
            }
            for parent in new_parents {
                self.link(parent, clone);
            }
        }

        node_map.get(&root).copied().ok_or(DagError::UnknownNode(root))
    }
}

struct ClonePlan {
    component: FxHashSet<NodeId>,
    nodes: Vec<(NodeId, DagNode)>,
}
