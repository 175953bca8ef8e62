//! Parametric statistical tests for experiment arms.
//!
//! Every test here reduces the comparison to an effect estimate with a standard error
//! and then reads the p-value and the confidence interval off the same reference
//! distribution, so `reject` always agrees with whether the interval covers zero.

use crate::error::{Error, Result};
use crate::testing::effect::EffectEstimate;
use nalgebra::{Cholesky, DMatrix, Dyn};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

pub mod ancova;
pub mod cuped;
pub mod paired;
pub mod ttest;
pub mod ztest;

pub use ancova::{AncovaDiagnostics, AncovaTest, CovarianceType};
pub use cuped::CupedTTest;
pub use paired::PairedTTest;
pub use ttest::TTest;
pub use ztest::ZTest;

/// Distribution the standardized effect is compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reference {
    StudentT { df: f64 },
    Normal,
}

/// Test statistic, two-sided p-value and confidence bounds for one estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    pub statistic: f64,
    pub pvalue: f64,
    pub bounds: (f64, f64),
}

/// Two-sided inference for `estimate` at level `alpha`.
///
/// A zero standard error is the degenerate case: the interval collapses onto the
/// estimate and the p-value is 1 for a zero effect and 0 otherwise.
///
/// # Arguments
///
/// * `estimate` - Effect and its standard error
/// * `reference` - Normal or Student-t reference distribution
/// * `alpha` - Significance level of the interval
///
/// # Returns
///
/// Test statistic, two-sided p-value and `1 - alpha` interval, or a numerical error
/// for a non-finite estimate.
pub fn two_sided(estimate: EffectEstimate, reference: Reference, alpha: f64) -> Result<Inference> {
    let EffectEstimate { effect, standard_error: se } = estimate;
    if !effect.is_finite() || !se.is_finite() || se < 0.0 {
        return Err(Error::Numerical(format!(
            "Non-finite effect estimate ({}) or standard error ({})",
            effect, se
        )));
    }

    if se == 0.0 {
        let (statistic, pvalue) = if effect == 0.0 {
            (0.0, 1.0)
        } else {
            (effect.signum() * f64::INFINITY, 0.0)
        };
        return Ok(Inference {
            statistic,
            pvalue,
            bounds: (effect, effect),
        });
    }

    let statistic = effect / se;
    let (pvalue, critical) = match reference {
        Reference::StudentT { df } => {
            let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| {
                Error::Numerical(format!("Invalid t distribution (df = {}): {}", df, e))
            })?;
            (2.0 * dist.sf(statistic.abs()), dist.inverse_cdf(1.0 - alpha / 2.0))
        }
        Reference::Normal => {
            let dist = standard_normal()?;
            (2.0 * dist.sf(statistic.abs()), dist.inverse_cdf(1.0 - alpha / 2.0))
        }
    };

    Ok(Inference {
        statistic,
        pvalue: pvalue.min(1.0),
        bounds: (effect - critical * se, effect + critical * se),
    })
}

/// Cholesky factor of a symmetric positive definite matrix, rejecting matrices whose
/// squared pivots fall below `tolerance` times the matching diagonal entry.
pub(crate) fn checked_cholesky(
    matrix: DMatrix<f64>,
    tolerance: f64,
    what: &str,
) -> Result<Cholesky<f64, Dyn>> {
    let singular = || Error::Numerical(format!("{} is singular", what));
    let diagonal = matrix.diagonal();
    let chol = matrix.cholesky().ok_or_else(singular)?;
    let l = chol.l();
    if (0..diagonal.len()).any(|j| l[(j, j)] * l[(j, j)] <= tolerance * diagonal[j]) {
        return Err(singular());
    }
    Ok(chol)
}

pub(crate) fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| Error::Numerical(format!("Normal distribution: {}", e)))
}

/// Standard normal quantile at `p`.
pub(crate) fn normal_quantile(p: f64) -> Result<f64> {
    Ok(standard_normal()?.inverse_cdf(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normal_inference_known_values() {
        let est = EffectEstimate { effect: 1.96, standard_error: 1.0 };
        let inf = two_sided(est, Reference::Normal, 0.05).unwrap();
        assert_abs_diff_eq!(inf.pvalue, 0.05, epsilon = 1e-3);
        assert_abs_diff_eq!(inf.bounds.0, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(inf.bounds.1, 3.92, epsilon = 1e-3);
    }

    #[test]
    fn test_t_inference_wider_than_normal() {
        let est = EffectEstimate { effect: 1.0, standard_error: 0.5 };
        let t = two_sided(est, Reference::StudentT { df: 4.0 }, 0.05).unwrap();
        let z = two_sided(est, Reference::Normal, 0.05).unwrap();
        assert!(t.pvalue > z.pvalue);
        assert!(t.bounds.1 - t.bounds.0 > z.bounds.1 - z.bounds.0);
        // t_{0.975, 4} = 2.776
        assert_abs_diff_eq!(t.bounds.1, 1.0 + 2.776 * 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_degenerate_standard_error() {
        let zero = two_sided(
            EffectEstimate { effect: 0.0, standard_error: 0.0 },
            Reference::Normal,
            0.05,
        )
        .unwrap();
        assert_eq!(zero.pvalue, 1.0);
        assert_eq!(zero.bounds, (0.0, 0.0));

        let shifted = two_sided(
            EffectEstimate { effect: 2.0, standard_error: 0.0 },
            Reference::StudentT { df: 3.0 },
            0.05,
        )
        .unwrap();
        assert_eq!(shifted.pvalue, 0.0);
        assert_eq!(shifted.bounds, (2.0, 2.0));
    }

    #[test]
    fn test_non_finite_rejected() {
        let est = EffectEstimate { effect: 1.0, standard_error: f64::NAN };
        assert!(matches!(
            two_sided(est, Reference::Normal, 0.05),
            Err(Error::Numerical(_))
        ));
    }
}
