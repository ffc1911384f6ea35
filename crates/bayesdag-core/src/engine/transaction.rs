//! Scoped proposals.
//!
//! [`Proposal`] wraps one touch / keep|restore cycle. It borrows the graph
//! mutably for its lifetime, so no other edit can interleave, and restores
//! the graph if it is dropped without a decision (for example when the
//! caller returns early with `?`).

use rustc_hash::FxHashSet;

use super::errors::DagError;
use super::graph::ModelGraph;
use super::node::{NodeId, NodeType};
use super::value::Value;

/// An open proposal on a single root node.
///
/// # Example
///
/// ```rust
/// use bayesdag_core::distributions::Normal;
/// use bayesdag_core::{ModelGraph, Proposal};
///
/// let mut g = ModelGraph::new();
/// let zero = g.add_constant(None, 0.0);
/// let one = g.add_constant(None, 1.0);
/// let mu = g.add_stochastic(Some("mu"), Normal, &[zero, one], 0.0).unwrap();
/// let x = g.add_stochastic(Some("x"), Normal, &[mu, one], 0.0).unwrap();
/// g.clamp(x, 1.0).unwrap();
///
/// let mut proposal = Proposal::propose(&mut g, mu, 0.5).unwrap();
/// assert!(proposal.affected().contains(&x));
/// let ratio = proposal.ln_acceptance_ratio().unwrap();
/// assert!(ratio > 0.0);
/// proposal.accept().unwrap();
/// assert_eq!(g.value(mu).unwrap().as_real(), Some(0.5));
/// ```
#[derive(Debug)]
pub struct Proposal<'g> {
    graph: &'g mut ModelGraph,
    root: NodeId,
    affected: FxHashSet<NodeId>,
    decided: bool,
}

impl<'g> Proposal<'g> {
    /// Touches `root` and collects the stochastic nodes its change reaches.
    pub fn begin(graph: &'g mut ModelGraph, root: NodeId) -> Result<Self, DagError> {
        graph.touch(root)?;
        let mut affected = FxHashSet::default();
        graph.affected(root, &mut affected)?;
        Ok(Self {
            graph,
            root,
            affected,
            decided: false,
        })
    }

    /// Begins a proposal and writes `value` to the stochastic node `root`.
    pub fn propose(
        graph: &'g mut ModelGraph,
        root: NodeId,
        value: impl Into<Value>,
    ) -> Result<Self, DagError> {
        if graph.is_clamped(root)? {
            return Err(DagError::InvalidOperation(format!(
                "node {root} is clamped to observed data"
            )));
        }
        let mut proposal = Self::begin(graph, root)?;
        proposal.set_value(value)?;
        Ok(proposal)
    }

    /// Replaces the proposed value of the root. The first snapshot is kept.
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<(), DagError> {
        if self.graph.is_clamped(self.root)? {
            return Err(DagError::InvalidOperation(format!(
                "node {} is clamped to observed data",
                self.root
            )));
        }
        self.graph.write_value(self.root, value.into())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Stochastic nodes downstream of the root, excluding the root.
    pub fn affected(&self) -> &FxHashSet<NodeId> {
        &self.affected
    }

    pub fn graph(&self) -> &ModelGraph {
        self.graph
    }

    /// Log Metropolis-Hastings ratio of the proposal, without the proposal
    /// density: the root's prior ratio plus every affected likelihood ratio.
    pub fn ln_acceptance_ratio(&mut self) -> Result<f64, DagError> {
        let mut total = 0.0;
        if self.graph.node_type(self.root)? == NodeType::Stochastic {
            total += self.graph.ln_probability_ratio(self.root)?;
        }
        for &id in &self.affected {
            total += self.graph.ln_probability_ratio(id)?;
        }
        Ok(total)
    }

    pub fn accept(mut self) -> Result<(), DagError> {
        self.decided = true;
        self.graph.keep(self.root)
    }

    pub fn reject(mut self) -> Result<(), DagError> {
        self.decided = true;
        self.graph.restore(self.root)
    }
}

impl Drop for Proposal<'_> {
    fn drop(&mut self) {
        if self.decided {
            return;
        }
        match self.graph.restore(self.root) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(root = %self.root, "undecided proposal restored on drop");
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(root = %self.root, error = %_err, "failed to restore undecided proposal on drop");
            }
        }
    }
}
