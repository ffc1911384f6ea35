//! Stochastic node operations: data binding, proposals and probability
//! bookkeeping.

use rand::RngCore;

use super::errors::{DagError, DomainError};
use super::graph::ModelGraph;
use super::node::{NodeId, NodeKind, StochasticNode};
use super::value::Value;

impl ModelGraph {
    fn stochastic(&self, id: NodeId) -> Result<&StochasticNode, DagError> {
        match &self.node(id)?.kind {
            NodeKind::Stochastic(s) => Ok(s),
            other => Err(DagError::InvalidOperation(format!(
                "node {id} is {:?}, not stochastic",
                other.node_type()
            ))),
        }
    }

    fn stochastic_mut(&mut self, id: NodeId) -> Result<&mut StochasticNode, DagError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Stochastic(s) => Ok(s),
            other => Err(DagError::InvalidOperation(format!(
                "node {id} is {:?}, not stochastic",
                other.node_type()
            ))),
        }
    }

    fn unclamped(&self, id: NodeId) -> Result<&StochasticNode, DagError> {
        let s = self.stochastic(id)?;
        if s.clamped {
            return Err(DagError::InvalidOperation(format!(
                "node {id} is clamped to observed data"
            )));
        }
        Ok(s)
    }

    /// Fails with `InvalidOperation` if any argument slot of `id` is unbound.
    /// A density over missing parameters is a wiring error, not an
    /// impossible value.
    fn check_bound(&self, id: NodeId) -> Result<(), DagError> {
        match self.stochastic(id)?.args.iter().position(Option::is_none) {
            Some(slot) => Err(DomainError::Unbound(slot).at(id)),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Data binding
    // ========================================================================

    /// Fixes `id` to an observed value.
    ///
    /// The stored value is discarded, and the node and everything downstream
    /// of it are recomputed against the observation.
    pub fn clamp(&mut self, id: NodeId, observed: impl Into<Value>) -> Result<(), DagError> {
        self.stochastic(id)?;
        self.ensure_quiescent()?;
        let s = self.stochastic_mut(id)?;
        s.value = observed.into();
        s.clamped = true;
        s.stored_value = None;
        s.needs_recalculation = true;

        #[cfg(feature = "tracing")]
        tracing::debug!(node = %id, value = %s.value, "clamped");

        self.invalidate_from(id);
        self.commit_from(id);
        Ok(())
    }

    /// Releases an observation. The current value becomes the stored value.
    /// Unclamping an unclamped node is a no-op.
    pub fn unclamp(&mut self, id: NodeId) -> Result<(), DagError> {
        if !self.stochastic(id)?.clamped {
            return Ok(());
        }
        self.ensure_quiescent()?;
        let s = self.stochastic_mut(id)?;
        s.clamped = false;
        s.stored_value = Some(s.value.clone());

        #[cfg(feature = "tracing")]
        tracing::debug!(node = %id, "unclamped");
        Ok(())
    }

    /// Replaces the value of an unclamped node outside of any proposal.
    ///
    /// The stored value is refreshed to the new value, so a later `restore`
    /// does not undo the assignment.
    pub fn set_value(&mut self, id: NodeId, value: impl Into<Value>) -> Result<(), DagError> {
        self.unclamped(id)?;
        self.ensure_quiescent()?;
        let s = self.stochastic_mut(id)?;
        s.value = value.into();
        s.stored_value = Some(s.value.clone());
        s.needs_recalculation = true;
        self.invalidate_from(id);
        Ok(())
    }

    /// Touches `id` and writes a proposed value. Undo with `restore(id)`.
    pub fn propose_value(&mut self, id: NodeId, value: impl Into<Value>) -> Result<(), DagError> {
        self.unclamped(id)?;
        self.touch(id)?;
        self.write_value(id, value.into())
    }

    /// Writes a value without snapshotting or invalidating downstream nodes.
    /// Callers must have touched `id` first.
    pub(crate) fn write_value(&mut self, id: NodeId, value: Value) -> Result<(), DagError> {
        let s = self.stochastic_mut(id)?;
        s.value = value;
        s.needs_recalculation = true;
        Ok(())
    }

    /// Draws a fresh value for an unclamped node from its distribution.
    pub fn redraw(&mut self, id: NodeId, rng: &mut dyn RngCore) -> Result<(), DagError> {
        self.unclamped(id)?;
        self.ensure_quiescent()?;
        self.refresh_parents(id)?;
        let value = {
            let s = self.stochastic(id)?;
            let params = self
                .argument_values(&s.args)
                .map_err(DomainError::while_sampling)?;
            s.distribution
                .sample(&params, rng)
                .map_err(DomainError::while_sampling)?
        };
        self.set_value(id, value)
    }

    /// Brings `id` and its closure up to date after a binding change.
    fn commit_from(&mut self, id: NodeId) {
        let closure = self.affected_closure(id);
        for node in std::iter::once(id).chain(closure) {
            self.refresh_known(node);
        }
    }

    fn refresh_parents(&mut self, id: NodeId) -> Result<(), DagError> {
        let parents = self.node(id)?.parents.clone();
        for parent in parents {
            self.refresh_known(parent);
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_clamped(&self, id: NodeId) -> Result<bool, DagError> {
        Ok(self.stochastic(id)?.clamped)
    }

    /// Whether the node's own value is under proposal.
    pub fn is_touched(&self, id: NodeId) -> Result<bool, DagError> {
        Ok(self.node(id)?.kind.is_touched())
    }

    /// The rollback value while the node is touched, else the current value.
    pub fn stored_value(&self, id: NodeId) -> Result<&Value, DagError> {
        let s = self.stochastic(id)?;
        match (&s.stored_value, s.touched) {
            (Some(stored), true) => Ok(stored),
            _ => Ok(&s.value),
        }
    }

    // ========================================================================
    // Probabilities
    // ========================================================================

    /// Log-probability of the node's value, recomputed only if stale.
    pub fn ln_probability(&mut self, id: NodeId) -> Result<f64, DagError> {
        self.check_bound(id)?;
        self.refresh_known(id);
        Ok(self.stochastic(id)?.ln_prob)
    }

    /// Log-probability of the node's value, recomputed unconditionally.
    pub fn calculate_ln_probability(&mut self, id: NodeId) -> Result<f64, DagError> {
        self.check_bound(id)?;
        self.refresh_parents(id)?;
        self.recompute(id);
        Ok(self.stochastic(id)?.ln_prob)
    }

    /// Change in this node's log-probability since the proposal began.
    ///
    /// - nothing touched: exactly `0.0`
    /// - only the value touched: the distribution's prior ratio of the new
    ///   and stored values
    /// - parents touched: the fresh log-probability minus the stored one
    ///
    /// An impossible new state yields negative infinity. Unbound parameters
    /// fail with [`DagError::InvalidOperation`].
    pub fn ln_probability_ratio(&mut self, id: NodeId) -> Result<f64, DagError> {
        self.check_bound(id)?;
        let touched = self.stochastic(id)?.touched;
        let parents_touched = self.are_parents_touched(id)?;
        match (touched, parents_touched) {
            (false, false) => Ok(0.0),
            (true, false) => self.ln_prior_ratio(id),
            (_, true) => {
                let new = self.ln_probability(id)?;
                if new == f64::NEG_INFINITY {
                    return Ok(f64::NEG_INFINITY);
                }
                Ok(new - self.stochastic(id)?.stored_ln_prob)
            }
        }
    }

    /// Prior ratio `ln p(value) - ln p(stored)` under the current parameters
    /// when the node's own value is touched, else `0.0`.
    pub fn ln_prior_ratio(&mut self, id: NodeId) -> Result<f64, DagError> {
        self.check_bound(id)?;
        if !self.stochastic(id)?.touched {
            return Ok(0.0);
        }
        self.refresh_parents(id)?;
        let s = self.stochastic(id)?;
        let Some(stored) = &s.stored_value else {
            return Ok(0.0);
        };
        let ratio = self
            .argument_values(&s.args)
            .and_then(|params| s.distribution.ln_prior_ratio(&params, &s.value, stored))
            .ok()
            .filter(|r| !r.is_nan())
            .unwrap_or(f64::NEG_INFINITY);
        Ok(ratio)
    }

    fn are_parents_touched(&self, id: NodeId) -> Result<bool, DagError> {
        Ok(self
            .node(id)?
            .parents
            .iter()
            .any(|p| self.slot(*p).is_some_and(|n| n.kind.is_touched())))
    }

    /// Sum of the log-probabilities of every stochastic node.
    ///
    /// Fails like [`ln_probability`](Self::ln_probability) on the first node
    /// with an unbound parameter.
    pub fn ln_joint_probability(&mut self) -> Result<f64, DagError> {
        let ids: Vec<NodeId> = self
            .node_ids()
            .filter(|id| matches!(self.slot(*id).map(|n| &n.kind), Some(NodeKind::Stochastic(_))))
            .collect();
        let mut total = 0.0;
        for id in ids {
            total += self.ln_probability(id)?;
        }
        Ok(total)
    }
}
