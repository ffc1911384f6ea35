//! Independent replicate chains on a thread pool.
//!
//! A graph is never shared between threads. Each replicate receives its own
//! deep copy and its own seeded random source, so results are reproducible
//! regardless of scheduling.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::errors::DagError;
use super::graph::ModelGraph;

/// Runs `chain` once per seed, in parallel, on independent copies of `graph`.
///
/// The closure receives the replicate index, the copy and a `ChaCha8Rng`
/// seeded from `seeds[index]`. Results are returned in seed order.
pub fn run_replicates<T, F>(graph: &ModelGraph, seeds: &[u64], chain: F) -> Result<Vec<T>, DagError>
where
    T: Send,
    F: Fn(usize, ModelGraph, ChaCha8Rng) -> T + Sync,
{
    graph.ensure_quiescent()?;

    #[cfg(feature = "tracing")]
    tracing::debug!(replicates = seeds.len(), nodes = graph.len(), "starting replicate chains");

    Ok(seeds
        .par_iter()
        .enumerate()
        .map(|(index, &seed)| chain(index, graph.clone(), ChaCha8Rng::seed_from_u64(seed)))
        .collect())
}

/// Derives `count` well-separated chain seeds from one master seed.
pub fn chain_seeds(master: u64, count: usize) -> Vec<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(master);
    (0..count).map(|_| rng.next_u64()).collect()
}
