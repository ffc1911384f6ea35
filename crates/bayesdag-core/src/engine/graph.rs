//! # Model Graph
//!
//! The arena that owns every node of a probabilistic model and maintains the
//! parent/child relation between them.
//!
//! ## Design
//!
//! - Nodes are stored in a slot vector and addressed by [`NodeId`]. Freed slots
//!   are recycled.
//! - Edges are id sets on both endpoints and are always updated together.
//! - Edges never keep nodes alive. External holders call [`ModelGraph::retain`]
//!   and [`ModelGraph::release`]; removal is refused while a node is retained.
//! - Deterministic values and stochastic log-probabilities are cached and
//!   recomputed lazily on read.
//! - Every walk uses an explicit stack and a visited set, so deep chains cannot
//!   overflow the call stack and diamonds are visited once.
//!
//! Propagation (`touch`/`keep`/`restore`) lives in
//! [`propagation`](crate::engine::propagation), probability bookkeeping in
//! [`stochastic`](crate::engine::stochastic) and cloning in
//! [`clone`](crate::engine::clone).
//!
//! ## Example
//!
//! ```rust
//! use bayesdag_core::distributions::Normal;
//! use bayesdag_core::functions::MathFunction;
//! use bayesdag_core::ModelGraph;
//!
//! let mut g = ModelGraph::new();
//! let mu = g.add_constant(Some("mu"), 0.0);
//! let sd = g.add_constant(Some("sd"), 1.0);
//! let x = g.add_stochastic(Some("x"), Normal, &[mu, sd], 0.5).unwrap();
//! let y = g.add_deterministic(Some("y"), MathFunction::Exp, &[x]).unwrap();
//! assert_eq!(g.value(y).unwrap().as_real(), Some(0.5_f64.exp()));
//! ```

use rand::RngCore;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use super::errors::{DagError, DomainError};
use super::node::{
    Arguments, ConstantNode, DagNode, DeterministicNode, NodeId, NodeKind, NodeType,
    StochasticNode, INLINE_ARGS,
};
use super::value::Value;
use crate::distributions::Distribution;
use crate::functions::{Arity, DagFunction};

/// An arena of model nodes connected into a directed acyclic graph.
///
/// A graph is used by one thread of control at a time. Independent chains
/// should each own a clone.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    slots: Vec<Option<DagNode>>,
    free: Vec<u32>,
    live: usize,
    /// Number of nodes currently holding a proposal snapshot.
    pub(crate) pending: usize,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty graph with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    /// Ids of all live nodes in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    pub fn node(&self, id: NodeId) -> Result<&DagNode, DagError> {
        self.slot(id).ok_or(DagError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut DagNode, DagError> {
        self.slot_mut(id).ok_or(DagError::UnknownNode(id))
    }

    pub(crate) fn slot(&self, id: NodeId) -> Option<&DagNode> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn slot_mut(&mut self, id: NodeId) -> Option<&mut DagNode> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// First live node with the given name, by ascending id.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.node_ids()
            .find(|id| self.slot(*id).and_then(DagNode::name) == Some(name))
    }

    pub fn name(&self, id: NodeId) -> Result<Option<&str>, DagError> {
        Ok(self.node(id)?.name())
    }

    pub fn set_name(&mut self, id: NodeId, name: Option<&str>) -> Result<(), DagError> {
        self.node_mut(id)?.name = name.map(Into::into);
        Ok(())
    }

    pub fn node_type(&self, id: NodeId) -> Result<NodeType, DagError> {
        Ok(self.node(id)?.node_type())
    }

    /// Unique parents of `id`, in no meaningful order.
    pub fn parents(&self, id: NodeId) -> Result<&[NodeId], DagError> {
        Ok(self.node(id)?.parents())
    }

    /// Children of `id`, in no meaningful order.
    pub fn children(&self, id: NodeId) -> Result<&FxHashSet<NodeId>, DagError> {
        Ok(self.node(id)?.children())
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn add_constant(&mut self, name: Option<&str>, value: impl Into<Value>) -> NodeId {
        let kind = NodeKind::Constant(ConstantNode {
            value: value.into(),
        });
        self.insert(DagNode::new(name, kind))
    }

    /// Adds a node computing `function` over the values of `args`.
    ///
    /// The value is computed on first read.
    pub fn add_deterministic(
        &mut self,
        name: Option<&str>,
        function: impl DagFunction + 'static,
        args: &[NodeId],
    ) -> Result<NodeId, DagError> {
        check_arity(function.name(), function.arity(), args.len())?;
        self.check_all(args)?;
        let kind = NodeKind::Deterministic(DeterministicNode::new(Box::new(function), bound(args)));
        Ok(self.insert_linked(name, kind, args))
    }

    /// Adds a node distributed as `distribution(args)` with the given initial value.
    pub fn add_stochastic(
        &mut self,
        name: Option<&str>,
        distribution: impl Distribution + 'static,
        args: &[NodeId],
        value: impl Into<Value>,
    ) -> Result<NodeId, DagError> {
        let distribution: Box<dyn Distribution> = Box::new(distribution);
        self.add_stochastic_boxed(name, distribution, args, value.into())
    }

    /// Adds a stochastic node whose initial value is drawn from its distribution.
    pub fn add_stochastic_sampled(
        &mut self,
        name: Option<&str>,
        distribution: impl Distribution + 'static,
        args: &[NodeId],
        rng: &mut dyn RngCore,
    ) -> Result<NodeId, DagError> {
        let distribution: Box<dyn Distribution> = Box::new(distribution);
        check_arity(
            distribution.name(),
            Arity::Exact(distribution.parameter_names().len()),
            args.len(),
        )?;
        self.check_all(args)?;
        for &arg in args {
            self.refresh_known(arg);
        }
        let value = {
            let params = self
                .argument_values(&bound(args))
                .map_err(DomainError::while_sampling)?;
            distribution
                .sample(&params, rng)
                .map_err(DomainError::while_sampling)?
        };
        self.add_stochastic_boxed(name, distribution, args, value)
    }

    pub(crate) fn add_stochastic_boxed(
        &mut self,
        name: Option<&str>,
        distribution: Box<dyn Distribution>,
        args: &[NodeId],
        value: Value,
    ) -> Result<NodeId, DagError> {
        check_arity(
            distribution.name(),
            Arity::Exact(distribution.parameter_names().len()),
            args.len(),
        )?;
        self.check_all(args)?;
        let kind = NodeKind::Stochastic(StochasticNode::new(distribution, bound(args), value));
        Ok(self.insert_linked(name, kind, args))
    }

    pub(crate) fn insert(&mut self, node: DagNode) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(node);
                NodeId(i)
            }
            None => {
                self.slots.push(Some(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Inserts a fresh node and registers it as a child of each argument.
    /// A new node has no children, so no cycle can form.
    fn insert_linked(&mut self, name: Option<&str>, kind: NodeKind, args: &[NodeId]) -> NodeId {
        let id = self.insert(DagNode::new(name, kind));
        for &parent in args {
            self.link(parent, id);
        }
        id
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Registers `child` as a child of `parent`.
    ///
    /// Fails with [`DagError::Cycle`] if `child` is `parent` or one of its
    /// ancestors; the graph is left unchanged. Adding an existing edge is a
    /// no-op. The new edge is structural only: it takes part in propagation
    /// but binds no argument slot.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DagError> {
        self.node(parent)?;
        if self.node(child)?.node_type() == NodeType::Constant {
            return Err(DagError::InvalidOperation(format!(
                "constant node {child} cannot have parents"
            )));
        }
        if self.node(parent)?.children.contains(&child) {
            return Ok(());
        }
        if parent == child || self.is_ancestor(child, parent) {
            #[cfg(feature = "tracing")]
            tracing::debug!(%parent, %child, "rejected edge that would create a cycle");
            return Err(DagError::Cycle { parent, child });
        }
        self.ensure_quiescent()?;
        self.link(parent, child);
        self.invalidate_from(child);
        Ok(())
    }

    /// Unregisters the edge `parent -> child` on both endpoints.
    ///
    /// Removing an edge that does not exist is not an error. Argument slots of
    /// `child` bound to `parent` become unbound.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DagError> {
        self.node(child)?;
        if !self.node(parent)?.children.contains(&child) {
            return Ok(());
        }
        self.ensure_quiescent()?;
        self.unlink(parent, child);
        self.invalidate_from(child);
        Ok(())
    }

    /// Whether `ancestor` can be reached from `node` by following parent links.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack: Vec<NodeId> = match self.slot(node) {
            Some(n) => n.parents.to_vec(),
            None => return false,
        };
        while let Some(id) = stack.pop() {
            if id == ancestor {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(n) = self.slot(id) {
                stack.extend(n.parents.iter().copied());
            }
        }
        false
    }

    /// Replaces `old` with `new` as a parent of `node`, rebinding every
    /// argument slot that referred to `old`.
    ///
    /// Validation happens before any change: `old` must be a parent of `node`
    /// and `new` must not be `node` or one of its descendants.
    pub fn swap_parent(&mut self, node: NodeId, old: NodeId, new: NodeId) -> Result<(), DagError> {
        if !self.node(node)?.parents.contains(&old) {
            return Err(DagError::InvalidOperation(format!(
                "{old} is not a parent of {node}"
            )));
        }
        self.node(new)?;
        if old == new {
            return Ok(());
        }
        if new == node || self.is_ancestor(node, new) {
            return Err(DagError::Cycle {
                parent: new,
                child: node,
            });
        }
        self.ensure_quiescent()?;

        let target = self.node_mut(node)?;
        if let Some(args) = target.kind.arguments_mut() {
            for slot in args.iter_mut().filter(|slot| **slot == Some(old)) {
                *slot = Some(new);
            }
        }
        target.parents.retain(|p| *p != old);
        if let Some(old_node) = self.slot_mut(old) {
            old_node.children.remove(&node);
        }
        self.link(new, node);

        #[cfg(feature = "tracing")]
        tracing::debug!(%node, %old, %new, "swapped parent");

        self.invalidate_from(node);
        Ok(())
    }

    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p) = self.slot_mut(parent) {
            p.children.insert(child);
        }
        if let Some(c) = self.slot_mut(child) {
            c.add_parent(parent);
        }
    }

    fn unlink(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p) = self.slot_mut(parent) {
            p.children.remove(&child);
        }
        if let Some(c) = self.slot_mut(child) {
            c.remove_parent(parent);
        }
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Records an external reference to `id` and returns the new count.
    pub fn retain(&mut self, id: NodeId) -> Result<usize, DagError> {
        let node = self.node_mut(id)?;
        node.ref_count += 1;
        Ok(node.ref_count)
    }

    /// Drops an external reference to `id` and returns the new count.
    pub fn release(&mut self, id: NodeId) -> Result<usize, DagError> {
        let node = self.node_mut(id)?;
        if node.ref_count == 0 {
            return Err(DagError::InvalidOperation(format!(
                "release of node {id} which holds no references"
            )));
        }
        node.ref_count -= 1;
        Ok(node.ref_count)
    }

    pub fn ref_count(&self, id: NodeId) -> Result<usize, DagError> {
        Ok(self.node(id)?.ref_count)
    }

    /// Frees `id`.
    ///
    /// Every remaining child drops its edge back (its argument slots become
    /// unbound) and the node drops its edges to all parents. Removing a node
    /// that is still retained is a programming error and is refused with
    /// [`DagError::ReferenceLeak`].
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), DagError> {
        let ref_count = self.node(id)?.ref_count;
        if ref_count != 0 {
            #[cfg(feature = "tracing")]
            tracing::error!(node = %id, ref_count, "attempted to free a node that is still referenced");
            return Err(DagError::ReferenceLeak { node: id, ref_count });
        }
        self.ensure_quiescent()?;

        let (parents, children) = {
            let node = self.node(id)?;
            (node.parents.clone(), node.children.iter().copied().collect::<Vec<_>>())
        };
        for child in children {
            self.unlink(id, child);
            self.invalidate_from(child);
        }
        for parent in parents {
            self.unlink(parent, id);
        }
        self.slots[id.0 as usize] = None;
        self.free.push(id.0);
        self.live -= 1;

        #[cfg(feature = "tracing")]
        tracing::trace!(node = %id, "removed node");
        Ok(())
    }

    /// Removes every node that has no external references and no children,
    /// cascading to parents that become orphaned in turn.
    ///
    /// Returns the removed ids in removal order.
    pub fn prune_unreferenced(&mut self) -> Result<Vec<NodeId>, DagError> {
        self.ensure_quiescent()?;
        let is_orphan =
            |node: &DagNode| node.ref_count == 0 && node.children.is_empty();
        let mut worklist: Vec<NodeId> = self
            .node_ids()
            .filter(|id| self.slot(*id).is_some_and(is_orphan))
            .collect();
        let mut removed = Vec::new();
        while let Some(id) = worklist.pop() {
            let Some(node) = self.slot(id) else { continue };
            if !is_orphan(node) {
                continue;
            }
            let parents = node.parents.clone();
            self.remove_node(id)?;
            removed.push(id);
            worklist.extend(
                parents
                    .into_iter()
                    .filter(|p| self.slot(*p).is_some_and(is_orphan)),
            );
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(count = removed.len(), "pruned unreferenced nodes");
        Ok(removed)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Current value of `id`, recomputing stale deterministic values first.
    ///
    /// Fails with [`DagError::InvalidOperation`] if a needed argument slot is
    /// unbound and with [`DagError::Domain`] if the value is undefined.
    pub fn value(&mut self, id: NodeId) -> Result<&Value, DagError> {
        self.node(id)?;
        self.refresh_known(id);
        match &self.node(id)?.kind {
            NodeKind::Constant(c) => Ok(&c.value),
            NodeKind::Stochastic(s) => Ok(&s.value),
            NodeKind::Deterministic(d) => d.value.as_ref().map_err(|e| e.clone().at(id)),
        }
    }

    /// Recomputes a deterministic node from its parents' current values.
    ///
    /// Idempotent: with unchanged parents the value is unchanged.
    pub fn update(&mut self, id: NodeId) -> Result<(), DagError> {
        match &self.node(id)?.kind {
            NodeKind::Deterministic(_) => {}
            _ => {
                return Err(DagError::InvalidOperation(format!(
                    "node {id} is not deterministic"
                )))
            }
        }
        let parents = self.node(id)?.parents.clone();
        for parent in parents {
            self.refresh_known(parent);
        }
        self.recompute(id);
        Ok(())
    }

    /// Whether a deterministic node's cached value is stale.
    pub fn is_dirty(&self, id: NodeId) -> Result<bool, DagError> {
        match &self.node(id)?.kind {
            NodeKind::Deterministic(d) => Ok(d.dirty),
            _ => Ok(false),
        }
    }

    /// Brings `id` up to date: recomputes stale deterministic ancestors in
    /// dependency order, then the node itself.
    pub(crate) fn refresh_known(&mut self, id: NodeId) {
        for stale in self.stale_ancestry(id) {
            self.recompute(stale);
        }
    }

    /// Stale nodes `id` depends on, parents before children, ending with `id`
    /// itself if it is stale. Only deterministic ancestors are followed:
    /// stochastic and constant values are never stale.
    fn stale_ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.slot(current) else { continue };
            if !node.kind.needs_refresh() {
                continue;
            }
            stack.push((current, true));
            for parent in &node.parents {
                if let Some(NodeKind::Deterministic(d)) = self.slot(*parent).map(|p| &p.kind) {
                    if d.dirty {
                        stack.push((*parent, false));
                    }
                }
            }
        }
        order
    }

    /// Recomputes the cached result of one node, assuming its parents are fresh.
    ///
    /// Deterministic failures are stored as the node's value; stochastic
    /// failures become a log-probability of negative infinity.
    pub(crate) fn recompute(&mut self, id: NodeId) {
        enum Fresh {
            Value(Result<Value, DomainError>),
            LnProb(f64),
        }

        let fresh = match self.slot(id).map(|n| &n.kind) {
            Some(NodeKind::Deterministic(d)) => Fresh::Value(
                self.argument_values(&d.args)
                    .and_then(|args| d.function.compute(&args)),
            ),
            Some(NodeKind::Stochastic(s)) => Fresh::LnProb(
                self.argument_values(&s.args)
                    .and_then(|params| s.distribution.ln_pdf(&params, &s.value))
                    .ok()
                    .filter(|lp| !lp.is_nan())
                    .unwrap_or(f64::NEG_INFINITY),
            ),
            _ => return,
        };

        match (self.slot_mut(id).map(|n| &mut n.kind), fresh) {
            (Some(NodeKind::Deterministic(d)), Fresh::Value(value)) => {
                d.value = value;
                d.dirty = false;
            }
            (Some(NodeKind::Stochastic(s)), Fresh::LnProb(lp)) => {
                s.ln_prob = lp;
                s.needs_recalculation = false;
            }
            _ => {}
        }
    }

    /// Values bound to `args`, failing on the first unbound or undefined slot.
    pub(crate) fn argument_values(
        &self,
        args: &[Option<NodeId>],
    ) -> Result<SmallVec<[&Value; INLINE_ARGS]>, DomainError> {
        args.iter()
            .enumerate()
            .map(|(slot, arg)| {
                let id = arg.ok_or(DomainError::Unbound(slot))?;
                match self.slot(id).map(|n| &n.kind) {
                    Some(NodeKind::Constant(c)) => Ok(&c.value),
                    Some(NodeKind::Stochastic(s)) => Ok(&s.value),
                    Some(NodeKind::Deterministic(d)) if d.dirty => Err(DomainError::NotEvaluated),
                    Some(NodeKind::Deterministic(d)) => d.value.as_ref().map_err(Clone::clone),
                    None => Err(DomainError::Unbound(slot)),
                }
            })
            .collect()
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Marks `id` and everything downstream of it stale without taking
    /// snapshots. Used after structural edits and data binding.
    pub(crate) fn invalidate_from(&mut self, id: NodeId) {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.slot_mut(current) else { continue };
            node.kind.mark_stale();
            if current == id || node.node_type() == NodeType::Deterministic {
                stack.extend(node.children.iter().copied());
            }
        }
    }

    /// Fails while any node holds a proposal snapshot.
    ///
    /// Structural edits and data binding would otherwise invalidate the
    /// snapshots a pending `restore` relies on.
    pub fn ensure_quiescent(&self) -> Result<(), DagError> {
        if self.pending == 0 {
            Ok(())
        } else {
            Err(DagError::InvalidOperation(format!(
                "{} node(s) hold pending proposal snapshots; keep or restore first",
                self.pending
            )))
        }
    }

    /// Whether no node holds a proposal snapshot.
    pub fn is_quiescent(&self) -> bool {
        self.pending == 0
    }

    pub(crate) fn check_all(&self, ids: &[NodeId]) -> Result<(), DagError> {
        for id in ids {
            self.node(*id)?;
        }
        Ok(())
    }
}

fn bound(args: &[NodeId]) -> Arguments {
    args.iter().copied().map(Some).collect()
}

fn check_arity(name: &'static str, arity: Arity, actual: usize) -> Result<(), DagError> {
    if arity.accepts(actual) {
        Ok(())
    } else {
        Err(DagError::Arity {
            name,
            expected: arity.to_string(),
            actual,
        })
    }
}
