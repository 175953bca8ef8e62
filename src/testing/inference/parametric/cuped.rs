//! CUPED variance reduction followed by a two-sample t-test.
//!
//! The adjustment coefficient `theta` is estimated on both arms pooled together, so
//! the same linear correction is subtracted from control and treatment alike and the
//! treatment effect itself is left unbiased.

use super::checked_cholesky;
use super::ttest::t_test_values;
use crate::data::SampleData;
use crate::error::{Error, Result};
use crate::testing::inference::Comparison;
use crate::testing::utils::{covariance, mean, variance};
use crate::testing::{TTestType, TestConfig, TestResult};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Relative tolerance under which a covariate counts as constant.
const VARIANCE_TOLERANCE: f64 = 1e-12;

/// Outcome of the pooled CUPED fit.
#[derive(Debug, Clone)]
pub(crate) struct CupedAdjustment {
    pub left: SampleData,
    pub right: SampleData,
    pub theta: Vec<f64>,
    pub variance_reduction: f64,
}

fn covariate_columns(sample: &SampleData, k: usize) -> Vec<Vec<f64>> {
    match sample.covariates() {
        Some(c) => (0..k).map(|j| c.column(j).to_vec()).collect(),
        None => Vec::new(),
    }
}

/// Fit `theta` on the pooled arms and return both arms with
/// `y - theta' (x - mean(x))` in place of the metric.
pub(crate) fn cuped_adjust(a: &SampleData, b: &SampleData) -> Result<CupedAdjustment> {
    let k = a.n_covariates();
    if k == 0 || b.n_covariates() == 0 {
        return Err(Error::Configuration(
            "CUPED requires covariates on both samples".to_string(),
        ));
    }
    if k != b.n_covariates() {
        return Err(Error::Configuration(format!(
            "Covariate column count differs between samples: {} vs {}",
            k,
            b.n_covariates()
        )));
    }

    let a_cols = covariate_columns(a, k);
    let b_cols = covariate_columns(b, k);
    let pooled_x: Vec<Vec<f64>> = a_cols
        .iter()
        .zip(&b_cols)
        .map(|(ca, cb)| ca.iter().chain(cb).copied().collect())
        .collect();
    let pooled_y: Vec<f64> = a.data().iter().chain(b.data()).copied().collect();

    if pooled_y.len() < 3 {
        return Err(Error::insufficient(3, pooled_y.len(), "CUPED pooled sample"));
    }

    for (j, col) in pooled_x.iter().enumerate() {
        // relative to the covariate's own magnitude; an all-zero column fails too
        let scale = col.iter().map(|v| v * v).sum::<f64>() / col.len() as f64;
        if variance(col) <= VARIANCE_TOLERANCE * scale {
            return Err(Error::Numerical(format!(
                "Covariate {} has (near) zero variance; CUPED adjustment is undefined",
                j
            )));
        }
    }

    let theta: Vec<f64> = if k == 1 {
        vec![covariance(&pooled_y, &pooled_x[0]) / variance(&pooled_x[0])]
    } else {
        let sxx = DMatrix::from_fn(k, k, |i, j| covariance(&pooled_x[i], &pooled_x[j]));
        let sxy = DVector::from_fn(k, |i, _| covariance(&pooled_x[i], &pooled_y));
        // squared pivots are the residual variances of each covariate given the previous ones
        let chol = checked_cholesky(sxx, VARIANCE_TOLERANCE, "Covariate covariance matrix")?;
        chol.solve(&sxy).iter().copied().collect()
    };

    let centers: Vec<f64> = pooled_x.iter().map(|c| mean(c)).collect();
    let adjust = |y: &[f64], cols: &[Vec<f64>]| -> Vec<f64> {
        y.iter()
            .enumerate()
            .map(|(i, &yi)| {
                let shift: f64 = (0..k).map(|j| theta[j] * (cols[j][i] - centers[j])).sum();
                yi - shift
            })
            .collect()
    };
    let adj_a = adjust(a.data(), &a_cols);
    let adj_b = adjust(b.data(), &b_cols);

    let pooled_adj: Vec<f64> = adj_a.iter().chain(&adj_b).copied().collect();
    let raw_var = variance(&pooled_y);
    let variance_reduction = if raw_var > 0.0 {
        1.0 - variance(&pooled_adj) / raw_var
    } else {
        0.0
    };
    debug!(?theta, variance_reduction, "fitted CUPED adjustment");

    Ok(CupedAdjustment {
        left: a.with_replaced_data(adj_a)?,
        right: b.with_replaced_data(adj_b)?,
        theta,
        variance_reduction,
    })
}

pub(crate) fn theta_metadata(mut result: TestResult, theta: &[f64]) -> TestResult {
    if theta.len() == 1 {
        result = result.with_metadata("theta", theta[0]);
    } else {
        for (j, t) in theta.iter().enumerate() {
            result = result.with_metadata(&format!("theta_{}", j), *t);
        }
    }
    result
}

/// T-test on CUPED-adjusted metric values.
#[derive(Debug, Clone, Default)]
pub struct CupedTTest {
    config: TestConfig,
    ttest_type: TTestType,
}

impl CupedTTest {
    pub fn new(config: TestConfig) -> Self {
        CupedTTest {
            config,
            ttest_type: TTestType::Welch,
        }
    }

    pub fn with_ttest_type(mut self, ttest_type: TTestType) -> Self {
        self.ttest_type = ttest_type;
        self
    }
}

impl Comparison for CupedTTest {
    type Sample = SampleData;

    fn name(&self) -> &'static str {
        "cuped-t-test"
    }

    fn config(&self) -> &TestConfig {
        &self.config
    }

    fn validate_sample(&self, sample: &SampleData) -> Result<()> {
        sample.require_covariates(self.name())
    }

    fn compare_samples_with(
        &self,
        a: &SampleData,
        b: &SampleData,
        config: &TestConfig,
    ) -> Result<TestResult> {
        let fit = cuped_adjust(a, b)?;
        let result = t_test_values(
            self.name(),
            fit.left.data(),
            fit.right.data(),
            self.ttest_type,
            config,
        )?
        .with_metadata("variance_reduction", fit.variance_reduction);
        Ok(theta_metadata(result, &fit.theta))
    }
}
