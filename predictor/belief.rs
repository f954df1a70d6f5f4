//! # Beliefs and the Belief Store
//!
//! A `Belief` is a Gaussian estimate `(mean, variance)` of one feature's latent
//! weight. The `BeliefStore` maps sparse feature keys to beliefs. Keys that were
//! never written read as the global prior `N(0, 1)`; reads never insert.

use crate::normal::{self, DomainError};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A sparse feature identified by a `(feature_id, value_id)` pair.
///
/// Keys compare and hash by value. `(0, 0)` is reserved for the bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureKey {
    pub feature_id: u64,
    pub value_id: u64,
}

impl FeatureKey {
    /// The always-active intercept feature.
    pub const BIAS: FeatureKey = FeatureKey::new(0, 0);

    /// Key used to fill defaulted slots when building baseline vectors.
    /// The library never trains it on its own.
    pub const FILLER: FeatureKey = FeatureKey::new(1, 2);

    pub const fn new(feature_id: u64, value_id: u64) -> Self {
        Self {
            feature_id,
            value_id,
        }
    }

    pub fn is_bias(&self) -> bool {
        *self == Self::BIAS
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.feature_id, self.value_id)
    }
}

/// Error for feature keys that are not of the form `feature_id:value_id`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid feature key '{0}'. Expected 'feature_id:value_id' with unsigned integers.")]
pub struct ParseFeatureKeyError(pub String);

impl FromStr for FeatureKey {
    type Err = ParseFeatureKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseFeatureKeyError(s.to_string());
        let (feature, value) = s.trim().split_once(':').ok_or_else(invalid)?;
        let feature_id = feature.parse::<u64>().map_err(|_| invalid())?;
        let value_id = value.parse::<u64>().map_err(|_| invalid())?;
        Ok(FeatureKey::new(feature_id, value_id))
    }
}

/// Gaussian belief over a feature weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    pub mean: f64,
    pub variance: f64,
}

impl Belief {
    /// The global prior on every non-bias weight.
    pub const PRIOR: Belief = Belief::new(0.0, 1.0);

    pub const fn new(mean: f64, variance: f64) -> Self {
        Self { mean, variance }
    }

    /// A belief is storable when its mean is finite and its variance is a
    /// non-negative number.
    pub fn is_valid(&self) -> bool {
        self.mean.is_finite() && self.variance >= 0.0
    }

    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

impl Default for Belief {
    fn default() -> Self {
        Self::PRIOR
    }
}

impl fmt::Display for Belief {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N(mean={:.6}, var={:.6})", self.mean, self.variance)
    }
}

/// The bias belief that makes a freshly initialised model predict
/// `prior_probability` on a vector holding the bias and `num_features - 1`
/// prior-valued features.
///
/// With every other slot at `N(0, 1)` the total variance is
/// `num_features + beta^2`, so scaling the probit of the prior by that total
/// cancels it in `cdf(total_mean / total_variance)`.
pub fn prior_bias_belief(
    prior_probability: f64,
    beta: f64,
    num_features: usize,
) -> Result<Belief, DomainError> {
    let mean = normal::ppf(prior_probability, 0.0, 1.0)? * (beta.powi(2) + num_features as f64);
    Ok(Belief::new(mean, 1.0))
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BeliefError {
    #[error(
        "Refusing to store belief for feature {key}: mean must be finite and variance non-negative (mean = {mean}, variance = {variance})."
    )]
    InvalidWeight {
        key: FeatureKey,
        mean: f64,
        variance: f64,
    },
}

/// Mapping from feature key to belief with prior-on-miss reads.
#[derive(Debug, Clone, Default)]
pub struct BeliefStore {
    beliefs: AHashMap<FeatureKey, Belief>,
}

impl BeliefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored belief, or the global prior for a key never written.
    pub fn get(&self, key: &FeatureKey) -> Belief {
        match self.beliefs.get(key) {
            Some(belief) => *belief,
            None => Belief::PRIOR,
        }
    }

    /// Validates and stores `belief`, returning what `get` reported before the write.
    ///
    /// On error nothing is written.
    pub fn set(&mut self, key: FeatureKey, belief: Belief) -> Result<Belief, BeliefError> {
        if !belief.is_valid() {
            return Err(BeliefError::InvalidWeight {
                key,
                mean: belief.mean,
                variance: belief.variance,
            });
        }
        Ok(self.beliefs.insert(key, belief).unwrap_or(Belief::PRIOR))
    }

    pub fn contains(&self, key: &FeatureKey) -> bool {
        self.beliefs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.beliefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beliefs.is_empty()
    }

    /// Iterates over explicitly stored entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeatureKey, &Belief)> {
        self.beliefs.iter()
    }
}
