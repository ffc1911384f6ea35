//! Error types for graph construction and evaluation.

use thiserror::Error;

use super::node::NodeId;

/// Errors raised by [`ModelGraph`](crate::engine::graph::ModelGraph) operations.
///
/// Structural errors are detected before any node state changes, so a failed
/// call never leaves the graph partially mutated.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// without breaking changes.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DagError {
    /// Adding the edge `parent -> child` would close a cycle.
    #[error("cycle error: edge {parent} -> {child} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    /// The operation is not allowed in the node's current state
    /// (e.g., assigning to a clamped node, reading an unbound node).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A node was about to be freed while external holders still reference it.
    #[error("reference leak: node {node} still has {ref_count} external reference(s)")]
    ReferenceLeak { node: NodeId, ref_count: usize },

    /// The id does not name a live node in this graph.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// A function or distribution was bound to the wrong number of arguments.
    #[error("arity mismatch: {name} expects {expected} argument(s), got {actual}")]
    Arity {
        name: &'static str,
        expected: String,
        actual: usize,
    },

    /// A value could not be computed or drawn.
    #[error("domain error at node {node}: {source}")]
    Domain {
        node: NodeId,
        #[source]
        source: DomainError,
    },
}

/// Errors returned by distributions and deterministic functions.
///
/// These never escape the propagation protocol: a stochastic node whose
/// density cannot be evaluated gets a log-probability of negative infinity.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// The result is mathematically undefined for the given inputs.
    #[error("undefined: {0}")]
    Undefined(String),

    /// An argument had the wrong value type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// An argument slot has no node bound to it.
    #[error("argument slot {0} is unbound")]
    Unbound(usize),

    /// The value has never been computed.
    #[error("value has not been evaluated")]
    NotEvaluated,
}

impl DomainError {
    pub(crate) fn at(self, node: NodeId) -> DagError {
        match self {
            DomainError::Unbound(slot) => DagError::InvalidOperation(format!(
                "node {node} has no parent bound to argument slot {slot}"
            )),
            source => DagError::Domain { node, source },
        }
    }

    /// A draw that could not be made, whether or not the node exists yet.
    pub(crate) fn while_sampling(self) -> DagError {
        DagError::InvalidOperation(format!("cannot sample: {self}"))
    }
}
