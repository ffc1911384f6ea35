use bayesdag_core::distributions::Normal;
use bayesdag_core::functions::MathFunction;
use bayesdag_core::{ModelGraph, NodeId, Value};
use rustc_hash::{FxHashMap, FxHashSet};

/// Diamond `a -> b, a -> c, b -> d, c -> d` where `d ~ N(b, c)`.
fn diamond() -> (ModelGraph, [NodeId; 4]) {
    let mut g = ModelGraph::new();
    let a = g.add_constant(Some("a"), 0.5);
    let b = g.add_deterministic(Some("b"), MathFunction::Exp, &[a]).unwrap();
    let c = g.add_deterministic(Some("c"), MathFunction::Mul, &[a, a]).unwrap();
    let d = g.add_stochastic(Some("d"), Normal, &[b, c], 1.0).unwrap();
    (g, [a, b, c, d])
}

#[test]
fn diamond_clone_creates_exactly_four_nodes() {
    let (source, [a, b, c, d]) = diamond();
    assert_eq!(source.len(), 4);

    let mut target = ModelGraph::new();
    let mut map = FxHashMap::default();
    let d2 = source.clone_dag_into(d, &mut target, &mut map).unwrap();

    assert_eq!(target.len(), 4);
    assert_eq!(map.len(), 4);
    let clones: FxHashSet<NodeId> = map.values().copied().collect();
    assert_eq!(clones.len(), 4);

    // Both branches share the single clone of the apex.
    let a2 = map[&a];
    assert_eq!(target.parents(map[&b]).unwrap(), &[a2]);
    assert_eq!(target.parents(map[&c]).unwrap(), &[a2]);
    assert_eq!(
        target.children(a2).unwrap(),
        &FxHashSet::from_iter([map[&b], map[&c]])
    );
    assert_eq!(
        target.parents(d2).unwrap().iter().copied().collect::<FxHashSet<_>>(),
        FxHashSet::from_iter([map[&b], map[&c]])
    );
}

#[test]
fn clones_evolve_independently() {
    let (mut source, [_, _, _, d]) = diamond();
    let mut map = FxHashMap::default();
    let d2 = source.clone_dag(d, &mut map).unwrap();
    assert_eq!(source.len(), 8);

    let lp = source.ln_probability(d).unwrap();
    assert_eq!(source.ln_probability(d2).unwrap().to_bits(), lp.to_bits());

    source.set_value(d2, 2.0).unwrap();
    assert_eq!(source.value(d).unwrap(), &Value::Real(1.0));
    assert_ne!(source.ln_probability(d2).unwrap(), lp);
    assert_eq!(source.ln_probability(d).unwrap().to_bits(), lp.to_bits());
}

#[test]
fn cloning_from_any_member_copies_the_whole_component() {
    let (source, [a, _, _, _]) = diamond();
    let mut target = ModelGraph::new();
    let mut map = FxHashMap::default();
    let a2 = source.clone_dag_into(a, &mut target, &mut map).unwrap();
    assert_eq!(target.len(), 4);
    assert_eq!(target.children(a2).unwrap().len(), 2);
}

#[test]
fn second_root_reuses_earlier_clones() {
    let mut source = ModelGraph::new();
    let zero = source.add_constant(None, 0.0);
    let one = source.add_constant(None, 1.0);
    let mu = source.add_stochastic(Some("mu"), Normal, &[zero, one], 0.0).unwrap();
    let x = source.add_stochastic(Some("x"), Normal, &[mu, one], 0.5).unwrap();
    let y = source.add_stochastic(Some("y"), Normal, &[mu, one], -0.5).unwrap();

    let mut target = ModelGraph::new();
    let mut map = FxHashMap::default();
    source.clone_dag_into(x, &mut target, &mut map).unwrap();
    let cloned = target.len();
    let y2 = source.clone_dag_into(y, &mut target, &mut map).unwrap();
    assert_eq!(target.len(), cloned);
    assert_eq!(y2, map[&y]);
    assert_eq!(target.name(y2).unwrap(), Some("y"));
}

#[test]
fn whole_graph_clone_is_independent() {
    let (source, [_, _, _, d]) = diamond();
    let mut copy = source.clone();
    copy.set_value(d, 3.0).unwrap();
    let mut source = source;
    assert_eq!(source.value(d).unwrap(), &Value::Real(1.0));
    assert_eq!(copy.value(d).unwrap(), &Value::Real(3.0));
}
