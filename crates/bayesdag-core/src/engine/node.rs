//! # DAG Nodes
//!
//! Node identity, adjacency and the three node kinds.
//!
//! ## Ownership
//!
//! Nodes live in the [`ModelGraph`](crate::engine::graph::ModelGraph) arena and
//! refer to each other by [`NodeId`]. Parent and child links are plain id sets:
//! they never keep a node alive. Lifetime is decided by the external reference
//! count (`retain`/`release`) and explicit removal.
//!
//! ## Local state transitions
//!
//! Each kind implements the same small set of local transitions, which the
//! graph drives during propagation:
//!
//! - `touch_me`: snapshot once per proposal cycle, then mark stale
//! - `keep_me`: drop the snapshot and accept the current state
//! - `restore_me`: put the snapshot back
//! - `mark_stale`: invalidate cached results without taking a snapshot
//!
//! The transitions never read other nodes. Any recomputation a transition
//! depends on (a fresh value before a snapshot, a fresh log-probability before
//! a keep) is done by the graph first.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use super::errors::DomainError;
use super::value::Value;
use crate::distributions::Distribution;
use crate::functions::DagFunction;

/// Inline capacity for argument and parent lists. Most functions and
/// distributions take at most four parameters.
pub const INLINE_ARGS: usize = 4;

/// Argument slots of a variable node. `None` marks an unbound slot.
pub type Arguments = SmallVec<[Option<NodeId>; INLINE_ARGS]>;

/// A stable handle to a node in a [`ModelGraph`](crate::engine::graph::ModelGraph).
///
/// Ids of removed nodes may be reused by later insertions.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which of the three node kinds a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Constant,
    Deterministic,
    Stochastic,
}

/// Where a touch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TouchOrigin {
    /// The node itself is about to change.
    Direct,
    /// Something upstream is about to change.
    Upstream,
}

/// A node in the model graph: identity, adjacency and kind-specific state.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub(crate) name: Option<Arc<str>>,
    /// Unique parents. Argument slots may repeat a parent; this list does not.
    pub(crate) parents: SmallVec<[NodeId; INLINE_ARGS]>,
    pub(crate) children: FxHashSet<NodeId>,
    pub(crate) ref_count: usize,
    pub(crate) kind: NodeKind,
}

impl DagNode {
    pub(crate) fn new(name: Option<&str>, kind: NodeKind) -> Self {
        Self {
            name: name.map(Arc::from),
            parents: SmallVec::new(),
            children: FxHashSet::default(),
            ref_count: 0,
            kind,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn children(&self) -> &FxHashSet<NodeId> {
        &self.children
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub(crate) fn add_parent(&mut self, parent: NodeId) {
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
    }

    /// Drops `parent` from the parent list and unbinds every argument slot
    /// that referred to it.
    pub(crate) fn remove_parent(&mut self, parent: NodeId) {
        self.parents.retain(|p| *p != parent);
        if let Some(args) = self.kind.arguments_mut() {
            for slot in args.iter_mut().filter(|slot| **slot == Some(parent)) {
                *slot = None;
            }
        }
    }
}

/// Kind-specific node state.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Constant(ConstantNode),
    Deterministic(DeterministicNode),
    Stochastic(StochasticNode),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Constant(_) => NodeType::Constant,
            NodeKind::Deterministic(_) => NodeType::Deterministic,
            NodeKind::Stochastic(_) => NodeType::Stochastic,
        }
    }

    /// Argument slots; empty for constants.
    pub fn arguments(&self) -> &[Option<NodeId>] {
        match self {
            NodeKind::Constant(_) => &[],
            NodeKind::Deterministic(d) => &d.args,
            NodeKind::Stochastic(s) => &s.args,
        }
    }

    pub(crate) fn arguments_mut(&mut self) -> Option<&mut Arguments> {
        match self {
            NodeKind::Constant(_) => None,
            NodeKind::Deterministic(d) => Some(&mut d.args),
            NodeKind::Stochastic(s) => Some(&mut s.args),
        }
    }

    /// Whether the node's own value is under proposal. Stochastic nodes that
    /// are only affected by an upstream change do not count.
    pub fn is_touched(&self) -> bool {
        match self {
            NodeKind::Constant(_) => false,
            NodeKind::Deterministic(d) => d.touched,
            NodeKind::Stochastic(s) => s.touched,
        }
    }

    /// Whether the node holds a rollback snapshot for the current cycle.
    pub fn is_snapshotted(&self) -> bool {
        match self {
            NodeKind::Constant(_) => false,
            NodeKind::Deterministic(d) => d.touched,
            NodeKind::Stochastic(s) => s.touched || s.affected,
        }
    }

    /// Whether a cached result must be recomputed before it can be read.
    pub fn needs_refresh(&self) -> bool {
        match self {
            NodeKind::Constant(_) => false,
            NodeKind::Deterministic(d) => d.dirty,
            NodeKind::Stochastic(s) => s.needs_recalculation,
        }
    }

    pub(crate) fn touch_me(&mut self, origin: TouchOrigin) {
        match self {
            NodeKind::Constant(_) => {}
            NodeKind::Deterministic(d) => d.touch_me(),
            NodeKind::Stochastic(s) => s.touch_me(origin),
        }
    }

    pub(crate) fn keep_me(&mut self) {
        match self {
            NodeKind::Constant(_) => {}
            NodeKind::Deterministic(d) => d.keep_me(),
            NodeKind::Stochastic(s) => s.keep_me(),
        }
    }

    pub(crate) fn restore_me(&mut self) {
        match self {
            NodeKind::Constant(_) => {}
            NodeKind::Deterministic(d) => d.restore_me(),
            NodeKind::Stochastic(s) => s.restore_me(),
        }
    }

    pub(crate) fn mark_stale(&mut self) {
        match self {
            NodeKind::Constant(_) => {}
            NodeKind::Deterministic(d) => d.dirty = true,
            NodeKind::Stochastic(s) => s.needs_recalculation = true,
        }
    }
}

/// A leaf holding an immutable value.
#[derive(Debug, Clone)]
pub struct ConstantNode {
    pub(crate) value: Value,
}

impl ConstantNode {
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A node whose value is a pure function of its parents.
///
/// The value is cached and recomputed lazily: touching the node only sets
/// `dirty`, and the next read recomputes it.
#[derive(Debug, Clone)]
pub struct DeterministicNode {
    pub(crate) function: Box<dyn DagFunction>,
    pub(crate) args: Arguments,
    /// Last computed result. An `Err` records why the value is undefined.
    pub(crate) value: Result<Value, DomainError>,
    /// Snapshot taken on the first touch of a cycle.
    pub(crate) stored_value: Option<Result<Value, DomainError>>,
    pub(crate) dirty: bool,
    pub(crate) touched: bool,
}

impl DeterministicNode {
    pub(crate) fn new(function: Box<dyn DagFunction>, args: Arguments) -> Self {
        Self {
            function,
            args,
            value: Err(DomainError::NotEvaluated),
            stored_value: None,
            dirty: true,
            touched: false,
        }
    }

    pub fn function(&self) -> &dyn DagFunction {
        self.function.as_ref()
    }

    /// The cached value, whether or not it is stale.
    pub fn cached_value(&self) -> Option<&Value> {
        self.value.as_ref().ok()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    fn touch_me(&mut self) {
        if !self.touched {
            self.stored_value = Some(self.value.clone());
            self.touched = true;
        }
        self.dirty = true;
    }

    fn keep_me(&mut self) {
        self.stored_value = None;
        self.touched = false;
    }

    fn restore_me(&mut self) {
        if !self.touched {
            return;
        }
        if let Some(stored) = self.stored_value.take() {
            self.value = stored;
            self.dirty = false;
        }
        self.touched = false;
    }
}

/// A node whose value is governed by a distribution over its parents.
#[derive(Debug, Clone)]
pub struct StochasticNode {
    pub(crate) distribution: Box<dyn Distribution>,
    pub(crate) args: Arguments,
    pub(crate) value: Value,
    /// Rollback target. Equal to `value` while clean; `None` while clamped.
    pub(crate) stored_value: Option<Value>,
    pub(crate) clamped: bool,
    pub(crate) ln_prob: f64,
    pub(crate) stored_ln_prob: f64,
    pub(crate) needs_recalculation: bool,
    /// The node's own value is under proposal.
    pub(crate) touched: bool,
    /// An upstream value is under proposal.
    pub(crate) affected: bool,
}

impl StochasticNode {
    pub(crate) fn new(distribution: Box<dyn Distribution>, args: Arguments, value: Value) -> Self {
        Self {
            distribution,
            args,
            stored_value: Some(value.clone()),
            value,
            clamped: false,
            ln_prob: f64::NEG_INFINITY,
            stored_ln_prob: f64::NEG_INFINITY,
            needs_recalculation: true,
            touched: false,
            affected: false,
        }
    }

    pub fn distribution(&self) -> &dyn Distribution {
        self.distribution.as_ref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_clamped(&self) -> bool {
        self.clamped
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn is_affected(&self) -> bool {
        self.affected
    }

    /// The cached log-probability, whether or not it is stale.
    pub fn cached_ln_probability(&self) -> f64 {
        self.ln_prob
    }

    fn touch_me(&mut self, origin: TouchOrigin) {
        if !self.touched && !self.affected {
            self.stored_ln_prob = self.ln_prob;
        }
        match origin {
            // Clamped values never change, so a direct touch only re-scores them.
            TouchOrigin::Direct if !self.clamped => {
                if !self.touched {
                    self.stored_value = Some(self.value.clone());
                    self.touched = true;
                }
            }
            _ => self.affected = true,
        }
        self.needs_recalculation = true;
    }

    fn keep_me(&mut self) {
        if !self.touched && !self.affected {
            return;
        }
        if !self.clamped {
            self.stored_value = Some(self.value.clone());
        }
        self.stored_ln_prob = self.ln_prob;
        self.touched = false;
        self.affected = false;
    }

    fn restore_me(&mut self) {
        if !self.touched && !self.affected {
            return;
        }
        if self.touched {
            if let Some(stored) = &self.stored_value {
                self.value = stored.clone();
            }
        }
        self.ln_prob = self.stored_ln_prob;
        self.needs_recalculation = false;
        self.touched = false;
        self.affected = false;
    }
}
