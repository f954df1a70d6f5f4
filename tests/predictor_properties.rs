use adpredictor::normal::{cdf, ppf};
use adpredictor::numeric::GaussianCorrections;
use adpredictor::observer::{BeliefTransition, PredictorObserver};
use adpredictor::{AdPredictor, Belief, FeatureKey, PredictorConfig, PredictorError};
use approx::assert_abs_diff_eq;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const BETA: f64 = 0.05;
const PRIOR: f64 = 0.3;
const EPSILON: f64 = 0.01;
const NUM_FEATURES: usize = 10;

fn predictor() -> AdPredictor {
    AdPredictor::new(BETA, PRIOR, EPSILON, NUM_FEATURES).unwrap()
}

#[test]
fn bias_is_initialised_to_prior_probability() {
    let mut rng = StdRng::seed_from_u64(0xAD5EED);
    for _ in 0..50 {
        let prior: f64 = rng.gen_range(0.001..0.999);
        let p = AdPredictor::new(BETA, prior, EPSILON, NUM_FEATURES).unwrap();
        let predicted = p.predict(&p.baseline_features()).unwrap();
        assert_abs_diff_eq!(predicted, prior, epsilon = 1e-5);
    }
}

#[test]
fn concrete_scenario_predicts_prior() {
    let p = predictor();
    assert_abs_diff_eq!(p.predict(&p.baseline_features()).unwrap(), 0.3, epsilon = 1e-5);
}

#[test]
fn bias_initialisation_holds_for_other_arities() {
    for num_features in [1, 2, 5, 64] {
        let p = AdPredictor::new(0.3, 0.7, EPSILON, num_features).unwrap();
        assert_abs_diff_eq!(p.predict(&p.baseline_features()).unwrap(), 0.7, epsilon = 1e-5);
    }
}

#[test]
fn importance_of_empty_feature_is_zero() {
    let p = predictor();
    assert_eq!(p.importance(FeatureKey::FILLER).unwrap(), 0.0);
    assert_eq!(p.importance(FeatureKey::new(10, 5)).unwrap(), 0.0);
}

#[test]
fn importance_of_set_feature_is_positive() {
    let mut p = predictor();
    let f = FeatureKey::new(10, 5);
    p.set_belief(f, Belief::new(0.5, 0.5)).unwrap();
    let importance = p.importance(f).unwrap();
    assert!(importance > 0.0, "Importance {importance} should be greater than 0.0");
}

#[test]
fn importance_is_monotonic_in_mean() {
    // Variance is held at the prior's so the sweep starts from zero importance.
    let mut p = predictor();
    let f = FeatureKey::new(10, 5);
    let means = Array1::linspace(0.0, 3.0, 10);

    let importances: Vec<f64> = means
        .iter()
        .map(|&mean| {
            p.set_belief(f, Belief::new(mean, 1.0)).unwrap();
            p.importance(f).unwrap()
        })
        .collect();

    assert_eq!(importances[0], 0.0);
    for pair in importances.windows(2) {
        assert!(pair[1] >= pair[0], "importance decreased: {importances:?}");
    }
}

#[test]
fn importance_is_non_negative_for_arbitrary_beliefs() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut p = predictor();
    let f = FeatureKey::new(99, 1);
    for _ in 0..200 {
        let belief = Belief::new(rng.gen_range(-4.0..4.0), rng.gen_range(0.0..3.0));
        p.set_belief(f, belief).unwrap();
        assert!(p.importance(f).unwrap() >= -1e-15);
    }
}

#[test]
fn importance_stays_finite_when_prediction_saturates() {
    // A mean of 100 drives the treated prediction to exactly 1.0.
    let mut p = predictor();
    let strong = FeatureKey::new(7, 7);
    let weak = FeatureKey::new(7, 8);
    let features = p.features_with(strong);
    for mean in [90.0, 100.0, 200.0] {
        p.set_belief(strong, Belief::new(mean, 1.0)).unwrap();
        assert_eq!(p.predict(&features).unwrap(), 1.0);
        let importance = p.importance(strong).unwrap();
        assert!(importance.is_finite(), "importance at mean {mean} is {importance}");
        assert_abs_diff_eq!(importance, (1.0 / PRIOR).ln(), epsilon = 1e-4);
    }

    p.set_belief(weak, Belief::new(20.0, 1.0)).unwrap();
    let ranked = p.rank_features(&[weak, strong]).unwrap();
    assert_eq!(ranked[0].0, strong);
    assert!(ranked.iter().all(|(_, score)| score.is_finite()));
}

#[test]
fn dynamics_shift_towards_prior() {
    let p = AdPredictor::new(BETA, PRIOR, 0.05, NUM_FEATURES).unwrap();
    let initial = Belief::new(5.0, 0.5);
    let adjusted = p.apply_dynamics(initial);
    assert!(initial.mean > adjusted.mean);
    assert!(initial.variance < adjusted.variance);
}

#[test]
fn dynamics_neutral_for_prior() {
    for epsilon in [0.0, 0.01, 0.05, 0.5, 1.0] {
        let p = AdPredictor::new(BETA, PRIOR, epsilon, NUM_FEATURES).unwrap();
        let adjusted = p.apply_dynamics(Belief::PRIOR);
        assert_abs_diff_eq!(adjusted.mean, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(adjusted.variance, 1.0, epsilon = 1e-6);
    }
}

#[test]
fn dynamics_is_identity_for_epsilon_zero() {
    let p = AdPredictor::new(BETA, PRIOR, 0.0, NUM_FEATURES).unwrap();
    for initial in [Belief::new(5.0, 0.5), Belief::new(-1.5, 2.0), Belief::new(0.1, 0.01)] {
        let adjusted = p.apply_dynamics(initial);
        assert_abs_diff_eq!(initial.mean, adjusted.mean, epsilon = 1e-6);
        assert_abs_diff_eq!(initial.variance, adjusted.variance, epsilon = 1e-6);
    }
}

#[test]
fn cdf_reference_properties() {
    assert_eq!(cdf(0.0, 0.0, 1.0), 0.5);
    for x in Array1::linspace(-8.0, 8.0, 161).iter() {
        assert_abs_diff_eq!(cdf(-x, 0.0, 1.0), 1.0 - cdf(*x, 0.0, 1.0), epsilon = 1e-7);
    }
    for x in Array1::linspace(-1.8, 1.8, 37).iter() {
        assert_abs_diff_eq!(ppf(cdf(*x, 0.0, 1.0), 0.0, 1.0).unwrap(), *x, epsilon = 1e-6);
    }
}

#[test]
fn repeated_positive_training_increases_prediction() {
    let mut p = predictor();
    let features = p.baseline_features();
    let mut previous = p.predict(&features).unwrap();
    for step in 0..25 {
        p.train(&features, true).unwrap();
        let current = p.predict(&features).unwrap();
        assert!(
            current > previous,
            "prediction did not increase at step {step}: {previous} -> {current}"
        );
        assert!(current < 0.5);
        previous = current;
    }
}

#[test]
fn training_stores_regressed_pre_update_belief_not_posterior() {
    // The moment-matched posterior would move a positively labelled feature's
    // mean up; what is actually stored is only the prior regression of the old value.
    let mut p = predictor();
    let f = FeatureKey::new(3, 14);
    let before = Belief::new(-0.4, 0.6);
    p.set_belief(f, before).unwrap();

    let features = p.features_with(f);
    let sum = p.active_mean_variance(&features);
    p.train(&features, true).unwrap();

    let total_std = sum.total_variance.sqrt();
    let corrections = GaussianCorrections::at(sum.total_mean / total_std);
    let posterior_mean = before.mean + before.variance / total_std * corrections.v;

    let stored = p.belief(&f);
    assert_eq!(stored, p.apply_dynamics(before));
    assert!(stored.mean < posterior_mean);
    assert!(stored.mean > before.mean);
}

#[test]
fn arity_errors_on_both_entry_points() {
    let mut p = predictor();
    let features = vec![FeatureKey::BIAS; 3];
    assert_eq!(
        p.predict(&features).unwrap_err(),
        PredictorError::Arity {
            expected: NUM_FEATURES,
            found: 3
        }
    );
    assert!(matches!(
        p.train(&features, false).unwrap_err(),
        PredictorError::Arity { .. }
    ));
}

#[test]
fn training_a_zero_variance_belief_is_rejected() {
    // N(m, 0) regresses to a NaN mean, which the store refuses.
    let mut p = predictor();
    let f = FeatureKey::new(6, 6);
    p.set_belief(f, Belief::new(1.0, 0.0)).unwrap();
    let features = p.features_with(f);
    let err = p.train(&features, true).unwrap_err();
    assert!(matches!(err, PredictorError::InvalidWeight(_)));
    assert_eq!(p.belief(&f), Belief::new(1.0, 0.0));
}

#[test]
fn construction_from_config() {
    let config = PredictorConfig {
        beta: BETA,
        prior_probability: PRIOR,
        epsilon: EPSILON,
        num_features: NUM_FEATURES,
    };
    let p = AdPredictor::from_config(&config).unwrap();
    assert_eq!(p.config(), config);
    assert_eq!(p.num_features(), NUM_FEATURES);
    assert_eq!(p.beta(), BETA);
    assert_eq!(p.epsilon(), EPSILON);
    assert_eq!(p.prior_probability(), PRIOR);
}

#[test]
fn concurrent_readers_agree_with_sequential_reads() {
    let mut p = predictor();
    let keys: Vec<FeatureKey> = (0..64).map(|i| FeatureKey::new(50, i)).collect();
    for (i, key) in keys.iter().enumerate() {
        p.set_belief(*key, Belief::new(i as f64 / 16.0 - 2.0, 0.5)).unwrap();
    }

    let sequential: Vec<f64> = keys.iter().map(|k| p.importance(*k).unwrap()).collect();
    let parallel: Vec<f64> = keys.par_iter().map(|k| p.importance(*k).unwrap()).collect();
    assert_eq!(sequential, parallel);

    let ranked = p.rank_features(&keys).unwrap();
    assert_eq!(ranked.len(), keys.len());
    for pair in ranked.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
}

#[derive(Default)]
struct CountingObserver {
    predictions: AtomicUsize,
    transitions: AtomicUsize,
}

impl PredictorObserver for CountingObserver {
    fn on_prediction(&self, _: &adpredictor::observer::PredictionEvent) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }
    fn on_belief_transition(&self, _: &BeliefTransition) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn observer_does_not_change_results() {
    let counter = Arc::new(CountingObserver::default());
    let mut observed = predictor().with_observer(counter.clone());
    let mut plain = predictor();

    let features = observed.features_with(FeatureKey::new(1, 1));
    for label in [true, false, true, true] {
        observed.train(&features, label).unwrap();
        plain.train(&features, label).unwrap();
    }
    assert_eq!(
        observed.predict(&features).unwrap(),
        plain.predict(&features).unwrap()
    );
    assert_eq!(counter.transitions.load(Ordering::Relaxed), 4 * NUM_FEATURES);
    assert_eq!(counter.predictions.load(Ordering::Relaxed), 1);
}
