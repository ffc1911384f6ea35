use bayesdag_core::distributions::Normal;
use bayesdag_core::functions::MathFunction;
use bayesdag_core::{DagError, ModelGraph, NodeId};

#[test]
fn retained_nodes_cannot_be_removed() {
    let mut g = ModelGraph::new();
    let k = g.add_constant(Some("k"), 1.0);
    assert_eq!(g.retain(k), Ok(1));
    assert_eq!(g.retain(k), Ok(2));
    assert_eq!(
        g.remove_node(k),
        Err(DagError::ReferenceLeak { node: k, ref_count: 2 })
    );
    assert_eq!(g.release(k), Ok(1));
    assert_eq!(g.release(k), Ok(0));
    g.remove_node(k).unwrap();
    assert!(g.is_empty());
    assert_eq!(g.node(k).err(), Some(DagError::UnknownNode(k)));
}

#[test]
fn removing_a_distribution_node_prunes_its_parameters() {
    let mut g = ModelGraph::new();
    let zero = g.add_constant(None, 0.0);
    let one = g.add_constant(None, 1.0);
    let shared = g.add_constant(Some("shared"), 2.0);
    let x = g.add_stochastic(Some("x"), Normal, &[zero, one], 0.0).unwrap();
    let y = g.add_stochastic(Some("y"), Normal, &[shared, one], 0.0).unwrap();
    g.retain(y).unwrap();

    g.remove_node(x).unwrap();
    let mut removed = g.prune_unreferenced().unwrap();
    removed.sort();
    assert_eq!(removed, vec![zero]);
    assert!(g.contains(one) && g.contains(shared) && g.contains(y));
}

#[test]
fn teardown_unbinds_children_and_parents() {
    let mut g = ModelGraph::new();
    let k = g.add_constant(None, 4.0);
    let s = g.add_deterministic(Some("s"), MathFunction::Ln, &[k]).unwrap();
    let t = g.add_deterministic(Some("t"), MathFunction::Exp, &[s]).unwrap();
    g.value(t).unwrap();

    g.remove_node(s).unwrap();
    assert!(g.children(k).unwrap().is_empty());
    assert!(g.parents(t).unwrap().is_empty());
    assert_eq!(g.node(t).unwrap().kind().arguments(), &[None]);
    assert!(matches!(g.value(t), Err(DagError::InvalidOperation(_))));

    // Rebinding through a fresh structural edge restores propagation only.
    let u = g.add_deterministic(None, MathFunction::Exp, &[k]).unwrap();
    g.add_child(u, t).unwrap();
    assert_eq!(g.parents(t).unwrap(), &[u]);
}

#[test]
fn swap_parent_rebinds_every_slot() {
    let mut g = ModelGraph::new();
    let two = g.add_constant(None, 2.0);
    let three = g.add_constant(None, 3.0);
    let sq = g.add_deterministic(Some("sq"), MathFunction::Mul, &[two, two]).unwrap();
    assert_eq!(g.value(sq).unwrap().as_real(), Some(4.0));
    g.swap_parent(sq, two, three).unwrap();
    assert_eq!(g.value(sq).unwrap().as_real(), Some(9.0));
    assert!(g.children(two).unwrap().is_empty());
    assert_eq!(g.parents(sq).unwrap(), &[three]);
}

#[test]
fn operations_on_unknown_ids_fail() {
    let mut g = ModelGraph::new();
    let ghost = NodeId(3);
    assert_eq!(g.retain(ghost), Err(DagError::UnknownNode(ghost)));
    assert_eq!(g.remove_node(ghost), Err(DagError::UnknownNode(ghost)));
    assert!(g.value(ghost).is_err());
    assert!(!g.is_ancestor(ghost, ghost));
}
