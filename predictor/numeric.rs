//! Small numeric helpers shared by training and diagnostics.

use crate::normal;

/// Largest absolute surprise fed to the truncated-Gaussian corrections. Beyond
/// this the CDF in the denominator of `v` underflows toward zero.
pub const MAX_ABS_SURPRISE: f64 = 5.0;

/// Maps a binary label to the sign used by the probit update.
#[inline]
pub fn label_to_sign(label: bool) -> f64 {
    if label { 1.0 } else { -1.0 }
}

/// Clips a surprise value to `[-MAX_ABS_SURPRISE, MAX_ABS_SURPRISE]`.
#[inline]
pub fn clip_surprise(t: f64) -> f64 {
    t.clamp(-MAX_ABS_SURPRISE, MAX_ABS_SURPRISE)
}

/// Additive and multiplicative corrections for the mean and variance of a
/// truncated Gaussian, `V(t)` and `W(t) = V(t) * (V(t) + t)` in the TrueSkill
/// and AdPredictor papers. The surprise is clipped before evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianCorrections {
    pub v: f64,
    pub w: f64,
}

impl GaussianCorrections {
    pub fn at(t: f64) -> Self {
        let t = clip_surprise(t);
        let v = normal::pdf(t, 0.0, 1.0) / normal::cdf(t, 0.0, 1.0);
        let w = v * (v + t);
        Self { v, w }
    }
}

/// `x * ln(x / y)`, taken as zero when `x == 0`.
#[inline]
fn xlogy_ratio(x: f64, y: f64) -> f64 {
    if x == 0.0 { 0.0 } else { x * (x / y).ln() }
}

/// Kullback–Leibler divergence `KL(p || q)` between two Bernoulli variables, in nats.
///
/// `p` may saturate at 0 or 1 when the normal CDF rounds in the tail.
pub fn bernoulli_kl_divergence(p: f64, q: f64) -> f64 {
    xlogy_ratio(p, q) + xlogy_ratio(1.0 - p, 1.0 - q)
}
