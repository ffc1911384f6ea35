use bayesdag_core::distributions::{Exponential, Normal, Poisson};
use bayesdag_core::functions::MathFunction;
use bayesdag_core::{DagError, ModelGraph, NodeId, Value};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn normal_ln_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    -0.5 * (2.0 * std::f64::consts::PI).ln() - sd.ln() - 0.5 * z * z
}

/// `rate ~ Exp(1)`, `scale = 1 / rate`, `y ~ N(0, scale)`.
fn hierarchical() -> (ModelGraph, NodeId, NodeId) {
    let mut g = ModelGraph::new();
    let zero = g.add_constant(None, 0.0);
    let one = g.add_constant(None, 1.0);
    let rate = g.add_stochastic(Some("rate"), Exponential, &[one], 2.0).unwrap();
    let scale = g.add_deterministic(Some("scale"), MathFunction::Div, &[one, rate]).unwrap();
    let y = g.add_stochastic(Some("y"), Normal, &[zero, scale], 0.3).unwrap();
    (g, rate, y)
}

#[test]
fn clamp_then_set_value_fails_until_unclamped() {
    let (mut g, _, y) = hierarchical();
    g.clamp(y, 0.1).unwrap();
    assert!(matches!(g.set_value(y, 0.2), Err(DagError::InvalidOperation(_))));
    assert_eq!(g.value(y).unwrap(), &Value::Real(0.1));
    g.unclamp(y).unwrap();
    g.set_value(y, 0.2).unwrap();
    assert_eq!(g.value(y).unwrap(), &Value::Real(0.2));
    assert!(!g.is_clamped(y).unwrap());
}

#[test]
fn ratio_case_nothing_touched_is_exactly_zero() {
    let (mut g, rate, y) = hierarchical();
    assert_eq!(g.ln_probability_ratio(rate).unwrap(), 0.0);
    assert_eq!(g.ln_probability_ratio(y).unwrap(), 0.0);
}

#[test]
fn ratio_case_only_value_touched_uses_prior_ratio() {
    let (mut g, rate, _) = hierarchical();
    g.propose_value(rate, 0.5).unwrap();
    // Exp(1): ln p(0.5) - ln p(2.0) = -(0.5 - 2.0)
    assert!((g.ln_probability_ratio(rate).unwrap() - 1.5).abs() < 1e-12);
    assert!((g.ln_prior_ratio(rate).unwrap() - 1.5).abs() < 1e-12);
    g.restore(rate).unwrap();
}

#[test]
fn ratio_case_only_parents_touched_is_likelihood_ratio() {
    let (mut g, rate, y) = hierarchical();
    g.propose_value(rate, 4.0).unwrap();
    let expected = normal_ln_pdf(0.3, 0.0, 0.25) - normal_ln_pdf(0.3, 0.0, 0.5);
    assert!((g.ln_probability_ratio(y).unwrap() - expected).abs() < 1e-12);
    assert_eq!(g.ln_prior_ratio(y).unwrap(), 0.0);
    g.restore(rate).unwrap();
}

#[test]
fn ratio_case_both_touched_is_density_difference() {
    let (mut g, rate, y) = hierarchical();
    let stored = g.ln_probability(y).unwrap();
    g.propose_value(rate, 1.0).unwrap();
    g.propose_value(y, -0.4).unwrap();
    let expected = normal_ln_pdf(-0.4, 0.0, 1.0) - stored;
    assert!((g.ln_probability_ratio(y).unwrap() - expected).abs() < 1e-12);
    assert_eq!(g.stored_value(y).unwrap(), &Value::Real(0.3));
    g.restore(y).unwrap();
    g.restore(rate).unwrap();
    assert!(g.is_quiescent());
    assert_eq!(g.value(y).unwrap(), &Value::Real(0.3));
}

#[test]
fn undefined_parameters_reject_the_proposal() {
    let (mut g, rate, y) = hierarchical();
    // A rate of zero makes the scale undefined.
    g.propose_value(rate, 0.0).unwrap();
    assert_eq!(g.ln_probability(y).unwrap(), f64::NEG_INFINITY);
    assert_eq!(g.ln_probability_ratio(y).unwrap(), f64::NEG_INFINITY);
    g.restore(rate).unwrap();
    assert!(g.ln_probability(y).unwrap().is_finite());
}

#[test]
fn sampled_nodes_are_reproducible() {
    let build = |seed: u64| {
        let mut g = ModelGraph::new();
        let rate = g.add_constant(None, 3.0);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let k = g.add_stochastic_sampled(Some("k"), Poisson, &[rate], &mut rng).unwrap();
        let v = g.value(k).unwrap().clone();
        v
    };
    assert_eq!(build(9), build(9));
    assert!(build(9).as_integer().is_some());
}

#[test]
fn sampling_with_undefined_parameters_fails() {
    let mut g = ModelGraph::new();
    let rate = g.add_constant(None, -1.0);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    assert!(matches!(
        g.add_stochastic_sampled(None, Poisson, &[rate], &mut rng),
        Err(DagError::InvalidOperation(_))
    ));
    assert_eq!(g.len(), 1);
}

#[test]
fn joint_probability_tracks_accepted_ratios() {
    let (mut g, rate, y) = hierarchical();
    let mut joint = g.ln_joint_probability().unwrap();
    for (r, v) in [(1.0, 0.2), (3.0, -0.1), (0.7, 0.9)] {
        g.propose_value(rate, r).unwrap();
        g.propose_value(y, v).unwrap();
        let ratio = g.ln_probability_ratio(rate).unwrap() + g.ln_probability_ratio(y).unwrap();
        g.keep(rate).unwrap();
        g.keep(y).unwrap();
        joint += ratio;
        assert!((g.ln_joint_probability().unwrap() - joint).abs() < 1e-9);
    }
}
