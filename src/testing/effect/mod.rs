//! Effect estimates and their standard errors.
//!
//! Every test reports the effect of the right arm against the left (control) arm,
//! either as an absolute difference or as a relative change. Relative standard errors
//! come from the delta method applied to the ratio of the two estimates.

use crate::error::{Error, Result};
use crate::testing::TestType;
use crate::testing::utils::{mean, variance};

/// An effect with its standard error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectEstimate {
    pub effect: f64,
    pub standard_error: f64,
}

/// Summary of one arm: location estimate and the variance of that estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmEstimate {
    pub value: f64,
    /// Variance of `value` itself (e.g. `s^2 / n` for a mean)
    pub variance: f64,
}

/// Effect of `right` against `left` for two independent arms.
///
/// Relative mode uses `Var(r/l) ≈ Var(r)/l^2 + r^2 Var(l)/l^4`.
pub fn independent_effect(
    left: ArmEstimate,
    right: ArmEstimate,
    test_type: TestType,
) -> Result<EffectEstimate> {
    match test_type {
        TestType::Absolute => Ok(EffectEstimate {
            effect: right.value - left.value,
            standard_error: (left.variance + right.variance).sqrt(),
        }),
        TestType::Relative => {
            check_control(left.value)?;
            let l2 = left.value * left.value;
            let var = right.variance / l2 + right.value * right.value * left.variance / (l2 * l2);
            Ok(EffectEstimate {
                effect: right.value / left.value - 1.0,
                standard_error: var.max(0.0).sqrt(),
            })
        }
    }
}

/// Effect of `right` against `left` when both estimates are correlated
/// (paired designs, regression coefficients). `covariance` is `Cov(left, right)`.
pub fn correlated_effect(
    left: ArmEstimate,
    right: ArmEstimate,
    covariance: f64,
    test_type: TestType,
) -> Result<EffectEstimate> {
    match test_type {
        TestType::Absolute => Ok(EffectEstimate {
            effect: right.value - left.value,
            standard_error: (left.variance + right.variance - 2.0 * covariance).max(0.0).sqrt(),
        }),
        TestType::Relative => {
            check_control(left.value)?;
            let (l, r) = (left.value, right.value);
            let var = right.variance / (l * l) - 2.0 * r * covariance / (l * l * l)
                + r * r * left.variance / (l * l * l * l);
            Ok(EffectEstimate {
                effect: r / l - 1.0,
                standard_error: var.max(0.0).sqrt(),
            })
        }
    }
}

/// Errors when `value` is too close to zero to divide a relative effect by.
pub(crate) fn check_control(value: f64) -> Result<()> {
    if value.abs() < f64::EPSILON {
        return Err(Error::Numerical(
            "Control estimate is zero; relative effect is undefined".to_string(),
        ));
    }
    Ok(())
}

/// Cohen's d effect size with pooled standard deviation, `(mean(y) - mean(x)) / s_pooled`.
pub fn cohens_d(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() < 2 || y.len() < 2 {
        return Err(Error::insufficient(2, x.len().min(y.len()), "Cohen's d"));
    }
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let pooled_sd =
        (((n1 - 1.0) * variance(x) + (n2 - 1.0) * variance(y)) / (n1 + n2 - 2.0)).sqrt();
    if pooled_sd == 0.0 {
        return Err(Error::Numerical(
            "Pooled standard deviation is zero".to_string(),
        ));
    }
    Ok((mean(y) - mean(x)) / pooled_sd)
}

/// Calculate Hedge's g (bias-corrected effect size)
pub fn hedges_g(x: &[f64], y: &[f64]) -> Result<f64> {
    let d = cohens_d(x, y)?;
    let n = (x.len() + y.len()) as f64;
    // Correction factor J
    let j = 1.0 - 3.0 / (4.0 * (n - 2.0) - 1.0);
    Ok(j * d)
}
