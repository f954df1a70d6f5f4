//! Normal Distribution Approximations
//!
//! Density, cumulative distribution and inverse cumulative distribution for a
//! located and scaled normal distribution. Everything here is pure and
//! deterministic; the predictor evaluates these once per feature vector.
//!
//! # Accuracy
//!
//! - `cdf` uses the Zelen–Severo rational polynomial (Abramowitz & Stegun
//!   26.2.17). Its absolute error is below 7.5e-8 everywhere. Near the tails that
//!   absolute error is large relative to the density, so inverting a tail
//!   probability computed here only recovers the abscissa to about `1e-7 / pdf(x)`.
//! - `ppf` uses Peter Acklam's rational approximation in three regions and has a
//!   relative error below 1.15e-9.

use std::f64::consts::PI;
use thiserror::Error;

/// Error returned when the inverse CDF is asked for a probability outside (0, 1).
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Inverse normal CDF is only defined on the open interval (0, 1); got p = {p}.")]
pub struct DomainError {
    pub p: f64,
}

/// Coefficients of the Zelen–Severo polynomial in `k = 1 / (1 + 0.2316419 |z|)`.
const CDF_COEFFS: [f64; 5] = [
    0.319_381_53,
    -0.356_563_782,
    1.781_477_937,
    -1.821_255_978,
    1.330_274_429,
];
const CDF_K_SCALE: f64 = 0.231_641_9;

// Acklam's coefficients: numerator/denominator of the central region (A, B)
// and of both tails (C, D).
const PPF_A: [f64; 6] = [
    -3.969_683_028_665_376e1,
    2.209_460_984_245_205e2,
    -2.759_285_104_469_687e2,
    1.383_577_518_672_69e2,
    -3.066_479_806_614_716e1,
    2.506_628_277_459_239,
];
const PPF_B: [f64; 5] = [
    -5.447_609_879_822_406e1,
    1.615_858_368_580_409e2,
    -1.556_989_798_598_866e2,
    6.680_131_188_771_972e1,
    -1.328_068_155_288_572e1,
];
const PPF_C: [f64; 6] = [
    -7.784_894_002_430_293e-3,
    -3.223_964_580_411_365e-1,
    -2.400_758_277_161_838,
    -2.549_732_539_343_734,
    4.374_664_141_464_968,
    2.938_163_982_698_783,
];
const PPF_D: [f64; 4] = [
    7.784_695_709_041_462e-3,
    3.224_671_290_700_398e-1,
    2.445_134_137_142_996,
    3.754_408_661_907_416,
];

/// Lower break point between the tail and central regions of `ppf`.
const PPF_LOW: f64 = 0.024_25;
const PPF_HIGH: f64 = 1.0 - PPF_LOW;

/// Gaussian density at `x` for a normal with the given location and scale.
#[inline]
pub fn pdf(x: f64, mean: f64, scale: f64) -> f64 {
    let z = (x - mean) / scale;
    (-0.5 * z * z).exp() / (scale * (2.0 * PI).sqrt())
}

/// Cumulative distribution function of a normal with the given location and scale.
///
/// The upper tail `Q(|z|)` is approximated once and reflected, so
/// `cdf(-x) + cdf(x) == 1` up to rounding.
pub fn cdf(x: f64, mean: f64, scale: f64) -> f64 {
    let z = (x - mean) / scale;
    // The polynomial misses the midpoint by ~5e-10; pin it.
    if z == 0.0 {
        return 0.5;
    }
    let abs_z = z.abs();
    let k = 1.0 / (1.0 + CDF_K_SCALE * abs_z);
    let poly = CDF_COEFFS.iter().rev().fold(0.0, |acc, &c| (acc + c) * k);
    let upper_tail = pdf(abs_z, 0.0, 1.0) * poly;
    if z > 0.0 { 1.0 - upper_tail } else { upper_tail }
}

/// Inverse CDF (quantile function) of a normal with the given location and scale.
///
/// # Errors
/// Returns `DomainError` when `p` is not strictly inside (0, 1), including NaN.
pub fn ppf(p: f64, mean: f64, scale: f64) -> Result<f64, DomainError> {
    if !(p > 0.0 && p < 1.0) {
        return Err(DomainError { p });
    }

    let standard = if p < PPF_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        tail_ratio(q)
    } else if p <= PPF_HIGH {
        let q = p - 0.5;
        let r = q * q;
        let num = horner(&PPF_A, r) * q;
        let den = horner(&PPF_B, r) * r + 1.0;
        num / den
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -tail_ratio(q)
    };

    Ok(mean + scale * standard)
}

/// Rational approximation shared by both tails of `ppf`.
fn tail_ratio(q: f64) -> f64 {
    horner(&PPF_C, q) / (horner(&PPF_D, q) * q + 1.0)
}

/// Evaluates `c[0] x^(n-1) + ... + c[n-1]` by Horner's rule.
#[inline]
fn horner(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}
