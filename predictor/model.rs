//! # The AdPredictor Model
//!
//! Online Bayesian probit regression over sparse binary features. Each active
//! feature contributes an independent Gaussian weight; a click is modelled as the
//! event that the sum of active weights plus `N(0, beta^2)` noise is positive.
//!
//! - `predict` integrates the summed Gaussian through the normal CDF.
//! - `train` computes the moment-matched posterior for every active weight and
//!   then writes back each weight after regressing it toward the prior
//!   (`apply_dynamics`).
//! - `importance` measures how far a single feature moves the prediction away
//!   from the all-prior baseline, as a Bernoulli KL divergence.
//!
//! Reads take `&self` and writes take `&mut self`, so concurrent `predict` and
//! `importance` calls are safe and training is serialised by the borrow checker.

use crate::belief::{self, Belief, BeliefError, BeliefStore, FeatureKey};
use crate::config::PredictorConfig;
use crate::normal::{self, DomainError};
use crate::numeric::{GaussianCorrections, bernoulli_kl_divergence, label_to_sign};
use crate::observer::{
    BeliefTransition, NoopObserver, PredictionEvent, PredictorObserver, TransitionCause,
};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictorError {
    #[error("Feature vector has {found} entries, but the model expects exactly {expected}.")]
    Arity { expected: usize, found: usize },
    #[error(transparent)]
    InvalidWeight(#[from] BeliefError),
    #[error("Numerical domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("Invalid model parameter '{name}' = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Sum of the active beliefs' means and variances, noise included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSum {
    pub total_mean: f64,
    pub total_variance: f64,
}

pub struct AdPredictor {
    beta: f64,
    prior_probability: f64,
    epsilon: f64,
    num_features: usize,
    weights: BeliefStore,
    observer: Arc<dyn PredictorObserver>,
}

impl fmt::Debug for AdPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdPredictor")
            .field("beta", &self.beta)
            .field("prior_probability", &self.prior_probability)
            .field("epsilon", &self.epsilon)
            .field("num_features", &self.num_features)
            .field("stored_beliefs", &self.weights.len())
            .finish()
    }
}

impl AdPredictor {
    /// Builds a predictor and seeds the bias so that a fresh model predicts
    /// `prior_probability` on `baseline_features()`.
    pub fn new(
        beta: f64,
        prior_probability: f64,
        epsilon: f64,
        num_features: usize,
    ) -> Result<Self, PredictorError> {
        internal::validate_parameters(beta, prior_probability, epsilon, num_features)?;

        let bias = belief::prior_bias_belief(prior_probability, beta, num_features)?;
        let mut weights = BeliefStore::new();
        weights.set(FeatureKey::BIAS, bias)?;

        log::info!(
            "Initialised AdPredictor: beta = {beta}, prior = {prior_probability}, epsilon = {epsilon}, {num_features} features, bias {bias}"
        );

        Ok(Self {
            beta,
            prior_probability,
            epsilon,
            num_features,
            weights,
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn from_config(config: &PredictorConfig) -> Result<Self, PredictorError> {
        Self::new(
            config.beta,
            config.prior_probability,
            config.epsilon,
            config.num_features,
        )
    }

    /// Replaces the observer that receives prediction and transition events.
    pub fn with_observer(mut self, observer: Arc<dyn PredictorObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn prior_probability(&self) -> f64 {
        self.prior_probability
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn config(&self) -> PredictorConfig {
        PredictorConfig {
            beta: self.beta,
            prior_probability: self.prior_probability,
            epsilon: self.epsilon,
            num_features: self.num_features,
        }
    }

    /// Read-only view of every explicitly stored belief.
    pub fn weights(&self) -> &BeliefStore {
        &self.weights
    }

    /// Current belief for `key`, falling back to the prior.
    pub fn belief(&self, key: &FeatureKey) -> Belief {
        self.weights.get(key)
    }

    /// Probability of a positive label for `features`.
    pub fn predict(&self, features: &[FeatureKey]) -> Result<f64, PredictorError> {
        self.check_arity(features)?;
        let sum = self.active_mean_variance(features);
        let probability = normal::cdf(sum.total_mean / sum.total_variance, 0.0, 1.0);

        log::trace!("Predicting over {} features: p = {probability}", features.len());
        self.observer.on_prediction(&PredictionEvent {
            num_features: features.len(),
            total_mean: sum.total_mean,
            total_variance: sum.total_variance,
            probability,
        });
        Ok(probability)
    }

    /// Updates the beliefs of every feature in `features` from one labelled observation.
    ///
    /// The moment-matched posterior is computed and reported to the observer, but
    /// the value written back is `apply_dynamics` of the belief as it stood before
    /// this step. The bias is only touched if it appears in `features`.
    pub fn train(&mut self, features: &[FeatureKey], label: bool) -> Result<(), PredictorError> {
        self.check_arity(features)?;
        log::trace!("Training on {} features with label {label}", features.len());

        let y = label_to_sign(label);
        let sum = self.active_mean_variance(features);
        let total_std = sum.total_variance.sqrt();
        let corrections = GaussianCorrections::at(y * sum.total_mean / total_std);

        for &key in features {
            let weight = self.weights.get(&key);
            let mean_delta = y * weight.variance / total_std * corrections.v;
            let var_mult = 1.0 - weight.variance / sum.total_variance * corrections.w;
            let moment_matched = Belief::new(weight.mean + mean_delta, weight.variance + var_mult);

            let adjusted = self.apply_dynamics(weight);
            self.store(key, adjusted, TransitionCause::Training, Some(moment_matched))?;
        }
        Ok(())
    }

    /// Regresses `belief` toward the global prior at rate `epsilon`.
    ///
    /// This is the product of `belief^(1 - epsilon)` and `prior^epsilon` in
    /// natural parameters: `epsilon = 0` leaves it unchanged and the prior is a
    /// fixed point.
    pub fn apply_dynamics(&self, belief: Belief) -> Belief {
        let prior = Belief::PRIOR;
        let eps = self.epsilon;
        let adj_variance = belief.variance * prior.variance
            / ((1.0 - eps) * prior.variance + eps * belief.variance);
        let adj_mean = adj_variance
            * ((1.0 - eps) * belief.mean / belief.variance + eps * prior.mean / prior.variance);
        Belief::new(adj_mean, adj_variance)
    }

    /// Validated write into the belief store.
    pub fn set_belief(&mut self, key: FeatureKey, belief: Belief) -> Result<(), PredictorError> {
        self.store(key, belief, TransitionCause::Assignment, None)
    }

    /// `[bias, filler, ..., filler]` of length `num_features`.
    pub fn baseline_features(&self) -> Vec<FeatureKey> {
        let mut features = vec![FeatureKey::FILLER; self.num_features];
        features[0] = FeatureKey::BIAS;
        features
    }

    /// The baseline vector with its last slot replaced by `feature`.
    pub fn features_with(&self, feature: FeatureKey) -> Vec<FeatureKey> {
        let mut features = self.baseline_features();
        if let Some(last) = features.last_mut() {
            *last = feature;
        }
        features
    }

    /// KL divergence, in nats, of the prediction with `feature` active from the
    /// all-prior baseline prediction. Exactly zero for a feature never written.
    pub fn importance(&self, feature: FeatureKey) -> Result<f64, PredictorError> {
        if self.num_features == 1 {
            log::warn!("Importance with a single feature slot replaces the bias itself");
        }
        let baseline = self.predict(&self.baseline_features())?;
        let treated = self.predict(&self.features_with(feature))?;
        Ok(bernoulli_kl_divergence(treated, baseline))
    }

    /// Importance of every key in `features`, most important first.
    ///
    /// Evaluated in parallel; the store is only read.
    pub fn rank_features(
        &self,
        features: &[FeatureKey],
    ) -> Result<Vec<(FeatureKey, f64)>, PredictorError> {
        let mut ranked = features
            .par_iter()
            .map(|&key| self.importance(key).map(|score| (key, score)))
            .collect::<Result<Vec<_>, _>>()?;
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(ranked)
    }

    /// Sum of means and of variances over `features`, plus `beta^2`.
    pub fn active_mean_variance(&self, features: &[FeatureKey]) -> ActiveSum {
        let (sum_mean, sum_variance) = features.iter().fold((0.0, 0.0), |(m, v), key| {
            let weight = self.weights.get(key);
            (m + weight.mean, v + weight.variance)
        });
        ActiveSum {
            total_mean: sum_mean,
            total_variance: sum_variance + self.beta.powi(2),
        }
    }

    fn check_arity(&self, features: &[FeatureKey]) -> Result<(), PredictorError> {
        if features.len() != self.num_features {
            return Err(PredictorError::Arity {
                expected: self.num_features,
                found: features.len(),
            });
        }
        Ok(())
    }

    fn store(
        &mut self,
        key: FeatureKey,
        belief: Belief,
        cause: TransitionCause,
        moment_matched: Option<Belief>,
    ) -> Result<(), PredictorError> {
        let before = self.weights.set(key, belief)?;
        self.observer.on_belief_transition(&BeliefTransition {
            key,
            cause,
            before,
            moment_matched,
            after: belief,
        });
        Ok(())
    }
}

mod internal {
    use super::PredictorError;

    pub(super) fn validate_parameters(
        beta: f64,
        prior_probability: f64,
        epsilon: f64,
        num_features: usize,
    ) -> Result<(), PredictorError> {
        if !(beta.is_finite() && beta > 0.0) {
            return Err(PredictorError::InvalidParameter {
                name: "beta",
                value: beta,
                reason: "must be finite and strictly positive",
            });
        }
        if !(prior_probability > 0.0 && prior_probability < 1.0) {
            return Err(PredictorError::InvalidParameter {
                name: "prior_probability",
                value: prior_probability,
                reason: "must lie strictly between 0 and 1",
            });
        }
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(PredictorError::InvalidParameter {
                name: "epsilon",
                value: epsilon,
                reason: "must lie in [0, 1]",
            });
        }
        if num_features == 0 {
            return Err(PredictorError::InvalidParameter {
                name: "num_features",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}
