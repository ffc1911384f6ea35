//! The evaluation engine for probabilistic model graphs.
//!
//! This module provides:
//! - **errors**: Error types for graph operations and domain failures
//! - **value**: The opaque values carried by nodes
//! - **node**: Node identity, adjacency and the three node kinds
//! - **graph**: The node arena, edge management and lazy evaluation
//! - **propagation**: The touch / keep / restore protocol
//! - **stochastic**: Data binding and probability bookkeeping
//! - **clone**: Deep copies of connected subgraphs
//! - **transaction**: Scoped proposals that restore on drop
//! - **parallel**: Replicate chains on a thread pool (feature `parallel`)

pub mod clone;
pub mod errors;
pub mod graph;
pub mod node;
pub mod propagation;
pub mod stochastic;
pub mod transaction;
pub mod value;

#[cfg(feature = "parallel")]
pub mod parallel;
