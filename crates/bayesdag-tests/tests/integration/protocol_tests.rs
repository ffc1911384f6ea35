use bayesdag_core::distributions::Normal;
use bayesdag_core::functions::MathFunction;
use bayesdag_core::{DagError, ModelGraph, NodeId, Value};
use rustc_hash::FxHashSet;

/// Stochastic `a` -> deterministic `b` -> stochastic `c`.
fn chain() -> (ModelGraph, NodeId, NodeId, NodeId) {
    let mut g = ModelGraph::new();
    let zero = g.add_constant(Some("zero"), 0.0);
    let one = g.add_constant(Some("one"), 1.0);
    let a = g.add_stochastic(Some("a"), Normal, &[zero, one], 0.4).unwrap();
    let b = g.add_deterministic(Some("b"), MathFunction::Mul, &[a, a]).unwrap();
    let c = g.add_stochastic(Some("c"), Normal, &[b, one], 0.9).unwrap();
    (g, a, b, c)
}

fn snapshot(g: &mut ModelGraph) -> Vec<(NodeId, Option<Value>, Option<u64>)> {
    let ids: Vec<NodeId> = g.node_ids().collect();
    ids.into_iter()
        .map(|id| {
            let value = g.value(id).ok().cloned();
            let lp = g.ln_probability(id).ok().map(f64::to_bits);
            (id, value, lp)
        })
        .collect()
}

#[test]
fn affected_through_deterministic_is_exactly_the_stochastic_child() {
    let (g, a, _, c) = chain();
    let mut out = FxHashSet::default();
    g.affected(a, &mut out).unwrap();
    assert_eq!(out, FxHashSet::from_iter([c]));
}

#[test]
fn affected_of_a_leaf_is_empty() {
    let (g, _, _, c) = chain();
    let mut out = FxHashSet::default();
    g.affected(c, &mut out).unwrap();
    assert!(out.is_empty());
}

#[test]
fn touch_then_restore_is_bit_identical() {
    let (mut g, a, _, _) = chain();
    let before = snapshot(&mut g);
    g.propose_value(a, -2.5).unwrap();
    let during = snapshot(&mut g);
    assert_ne!(before, during);
    g.restore(a).unwrap();
    assert_eq!(snapshot(&mut g), before);
}

#[test]
fn keep_twice_is_a_noop() {
    let (mut g, a, _, _) = chain();
    g.propose_value(a, 1.5).unwrap();
    g.keep(a).unwrap();
    let kept = snapshot(&mut g);
    g.keep(a).unwrap();
    assert_eq!(snapshot(&mut g), kept);
    assert!(g.is_quiescent());
}

#[test]
fn kept_state_survives_a_later_rejected_proposal() {
    let (mut g, a, b, _) = chain();
    g.propose_value(a, 2.0).unwrap();
    g.keep(a).unwrap();
    g.propose_value(a, 3.0).unwrap();
    assert_eq!(g.value(b).unwrap(), &Value::Real(9.0));
    g.restore(a).unwrap();
    assert_eq!(g.value(b).unwrap(), &Value::Real(4.0));
}

#[test]
fn fan_in_snapshots_once() {
    // Two stochastic roots feed one deterministic node.
    let mut g = ModelGraph::new();
    let zero = g.add_constant(None, 0.0);
    let one = g.add_constant(None, 1.0);
    let p = g.add_stochastic(Some("p"), Normal, &[zero, one], 1.0).unwrap();
    let q = g.add_stochastic(Some("q"), Normal, &[zero, one], 2.0).unwrap();
    let s = g.add_deterministic(Some("s"), MathFunction::Add, &[p, q]).unwrap();
    let y = g.add_stochastic(Some("y"), Normal, &[s, one], 3.5).unwrap();
    let before = snapshot(&mut g);

    g.propose_value(p, 5.0).unwrap();
    g.propose_value(q, 7.0).unwrap();
    assert_eq!(g.value(s).unwrap(), &Value::Real(12.0));
    g.restore(p).unwrap();
    g.restore(q).unwrap();

    assert!(g.is_quiescent());
    assert_eq!(snapshot(&mut g), before);
    assert_eq!(g.value(s).unwrap(), &Value::Real(3.0));
    assert!(g.ln_probability(y).unwrap().is_finite());
}

#[test]
fn cycle_is_rejected_and_adjacency_unchanged() {
    let (mut g, a, b, c) = chain();
    let parents_before = g.parents(a).unwrap().to_vec();
    let children_before = g.children(c).unwrap().clone();

    assert_eq!(g.add_child(c, a), Err(DagError::Cycle { parent: c, child: a }));
    assert_eq!(g.add_child(b, a), Err(DagError::Cycle { parent: b, child: a }));

    assert_eq!(g.parents(a).unwrap(), parents_before.as_slice());
    assert_eq!(g.children(c).unwrap(), &children_before);
}

#[test]
fn structural_edge_joins_the_propagation_closure() {
    let (mut g, a, _, _) = chain();
    let zero = g.find_by_name("zero").unwrap();
    let one = g.find_by_name("one").unwrap();
    let z = g.add_stochastic(Some("z"), Normal, &[zero, one], 0.0).unwrap();
    g.add_child(a, z).unwrap();
    assert!(g.parents(z).unwrap().contains(&a));

    let mut out = FxHashSet::default();
    g.affected(a, &mut out).unwrap();
    assert!(out.contains(&z));

    // The edge binds no argument slot, so z's density ignores a.
    let lp = g.ln_probability(z).unwrap();
    g.propose_value(a, 10.0).unwrap();
    assert_eq!(g.ln_probability(z).unwrap().to_bits(), lp.to_bits());
    g.restore(a).unwrap();

    g.remove_child(a, z).unwrap();
    assert!(!g.children(a).unwrap().contains(&z));
}

#[test]
fn reading_an_unbound_node_is_invalid() {
    let (mut g, a, b, _) = chain();
    g.remove_child(a, b).unwrap();
    assert!(matches!(g.value(b), Err(DagError::InvalidOperation(_))));
}

#[test]
fn scoring_a_node_with_a_removed_parameter_is_invalid() {
    let mut g = ModelGraph::new();
    let zero = g.add_constant(Some("zero"), 0.0);
    let one = g.add_constant(Some("one"), 1.0);
    let x = g.add_stochastic(Some("x"), Normal, &[zero, one], 0.2).unwrap();
    g.remove_node(one).unwrap();

    assert!(matches!(g.ln_probability(x), Err(DagError::InvalidOperation(_))));
    assert!(matches!(
        g.ln_probability_ratio(x),
        Err(DagError::InvalidOperation(_))
    ));

    // Undefined parameters are still scored as impossible.
    let bad_sd = g.add_constant(Some("bad_sd"), -1.0);
    let y = g.add_stochastic(Some("y"), Normal, &[zero, bad_sd], 0.2).unwrap();
    assert_eq!(g.ln_probability(y).unwrap(), f64::NEG_INFINITY);
}
