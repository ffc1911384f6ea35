//! # Bayesdag Core
//!
//! Incremental evaluation of probabilistic model graphs.
//!
//! A model is a DAG of constant, deterministic and stochastic nodes held in a
//! [`ModelGraph`]. Samplers perturb it locally with the touch / keep /
//! restore protocol, and only the nodes downstream of a change are
//! recomputed.

pub mod distributions;
pub mod engine;
pub mod functions;

// Re-export commonly used types
pub use distributions::Distribution;
pub use engine::errors::{DagError, DomainError};
pub use engine::graph::ModelGraph;
pub use engine::node::{NodeId, NodeType};
pub use engine::transaction::Proposal;
pub use engine::value::Value;
pub use functions::DagFunction;

#[cfg(feature = "parallel")]
pub use engine::parallel::{chain_seeds, run_replicates};
