//! ANCOVA: regression adjustment of the treatment effect for one or more covariates.
//!
//! The model `y ~ 1 + treatment + (x - mean(x))` is fitted by ordinary least squares on
//! both arms together. Covariates are centered on their pooled mean, which makes the
//! intercept the covariate-adjusted control mean and the treatment coefficient the
//! adjusted absolute effect.
//!
//! Besides the [`TestResult`], the fit produces [`AncovaDiagnostics`]: a variance
//! inflation factor per covariate and a Jarque-Bera check on the residuals.

use super::{Reference, checked_cholesky, two_sided};
use crate::data::SampleData;
use crate::error::{Error, Result};
use crate::testing::effect::{ArmEstimate, EffectEstimate, correlated_effect};
use crate::testing::inference::Comparison;
use crate::testing::utils::mean;
use crate::testing::{TestConfig, TestResult, TestType};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{debug, warn};

const DESIGN_TOLERANCE: f64 = 1e-12;
const VIF_WARNING: f64 = 10.0;
const NORMALITY_WARNING: f64 = 0.05;

/// Estimator for the covariance of the regression coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CovarianceType {
    /// Homoscedastic `s^2 (X'X)^-1`
    Classical,
    /// White's heteroscedasticity-consistent estimator
    Hc0,
    /// HC0 scaled by `n / (n - p)`
    Hc1,
    /// Leverage-adjusted, robust in small samples
    #[default]
    Hc3,
}

/// Diagnostics of the ANCOVA fit.
#[derive(Debug, Clone, PartialEq)]
pub struct AncovaDiagnostics {
    /// Variance inflation factor per covariate column
    pub vif: Vec<f64>,
    /// Jarque-Bera statistic of the residuals
    pub residual_jb: f64,
    /// p-value of the residual normality check; small values cast doubt on the fit
    pub residual_normality_pvalue: f64,
    pub r_squared: f64,
    pub df: f64,
}

struct OlsFit {
    beta: DVector<f64>,
    residuals: DVector<f64>,
    xtx_inv: DMatrix<f64>,
}

fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsFit> {
    let xt = x.transpose();
    let chol = checked_cholesky(&xt * x, DESIGN_TOLERANCE, "Regression design matrix")?;
    let beta = chol.solve(&(&xt * y));
    let residuals = y - x * &beta;
    Ok(OlsFit {
        beta,
        residuals,
        xtx_inv: chol.inverse(),
    })
}

fn r_squared(y: &DVector<f64>, residuals: &DVector<f64>) -> f64 {
    let my = y.mean();
    let sst: f64 = y.iter().map(|v| (v - my).powi(2)).sum();
    if sst == 0.0 {
        return 1.0;
    }
    1.0 - residuals.norm_squared() / sst
}

/// Jarque-Bera statistic and its chi-squared(2) p-value. A perfect fit (zero residual
/// variance) reports a statistic of 0 and p-value 1.
fn jarque_bera(residuals: &[f64]) -> Result<(f64, f64)> {
    let n = residuals.len() as f64;
    let m = mean(residuals);
    let moment = |k: i32| residuals.iter().map(|r| (r - m).powi(k)).sum::<f64>() / n;
    let m2 = moment(2);
    if m2 <= f64::EPSILON * f64::EPSILON {
        return Ok((0.0, 1.0));
    }
    let skew = moment(3) / m2.powf(1.5);
    let kurt = moment(4) / (m2 * m2);
    let jb = n / 6.0 * (skew * skew + (kurt - 3.0).powi(2) / 4.0);
    let chi2 = ChiSquared::new(2.0)
        .map_err(|e| Error::Numerical(format!("Chi-squared distribution: {}", e)))?;
    Ok((jb, chi2.sf(jb)))
}

#[derive(Debug, Clone, Default)]
pub struct AncovaTest {
    config: TestConfig,
    covariance: CovarianceType,
}

impl AncovaTest {
    pub fn new(config: TestConfig) -> Self {
        AncovaTest {
            config,
            covariance: CovarianceType::default(),
        }
    }

    pub fn with_covariance(mut self, covariance: CovarianceType) -> Self {
        self.covariance = covariance;
        self
    }

    fn coefficient_covariance(&self, x: &DMatrix<f64>, fit: &OlsFit) -> Result<DMatrix<f64>> {
        let (n, p) = x.shape();
        let df = (n - p) as f64;
        if self.covariance == CovarianceType::Classical {
            let s2 = fit.residuals.norm_squared() / df;
            return Ok(&fit.xtx_inv * s2);
        }

        let mut meat = DMatrix::<f64>::zeros(p, p);
        for i in 0..n {
            let row = x.row(i).transpose();
            let e2 = fit.residuals[i] * fit.residuals[i];
            let weight = match self.covariance {
                CovarianceType::Hc3 => {
                    let leverage = (row.transpose() * &fit.xtx_inv * &row)[(0, 0)];
                    let denom = 1.0 - leverage;
                    if denom <= DESIGN_TOLERANCE {
                        return Err(Error::Numerical(format!(
                            "Observation {} has leverage 1; HC3 covariance is undefined",
                            i
                        )));
                    }
                    e2 / (denom * denom)
                }
                _ => e2,
            };
            meat += &row * row.transpose() * weight;
        }

        let mut cov = &fit.xtx_inv * meat * &fit.xtx_inv;
        if self.covariance == CovarianceType::Hc1 {
            cov *= n as f64 / df;
        }
        Ok(cov)
    }

    /// Run the regression and return the result together with its diagnostics.
    pub fn compare_samples_with_diagnostics(
        &self,
        a: &SampleData,
        b: &SampleData,
        config: &TestConfig,
    ) -> Result<(TestResult, AncovaDiagnostics)> {
        let k = a.n_covariates();
        let (ca, cb) = match (a.covariates(), b.covariates()) {
            (Some(ca), Some(cb)) if ca.ncols() == cb.ncols() => (ca, cb),
            (Some(ca), Some(cb)) => {
                return Err(Error::Configuration(format!(
                    "Covariate column count differs between samples: {} vs {}",
                    ca.ncols(),
                    cb.ncols()
                )));
            }
            _ => {
                return Err(Error::Configuration(
                    "ANCOVA requires covariates on both samples".to_string(),
                ));
            }
        };
        let (na, nb) = (a.len(), b.len());
        if na.min(nb) < self.min_sample_size() {
            return Err(Error::insufficient(self.min_sample_size(), na.min(nb), "ANCOVA arm"));
        }
        let n = na + nb;
        let p = k + 2;
        if n <= p {
            return Err(Error::insufficient(p + 1, n, "ANCOVA regression"));
        }

        let centers: Vec<f64> = (0..k)
            .map(|j| (ca.column(j).sum() + cb.column(j).sum()) / n as f64)
            .collect();
        let covariate = |i: usize, j: usize| {
            let raw = if i < na { ca[(i, j)] } else { cb[(i - na, j)] };
            raw - centers[j]
        };

        let x = DMatrix::from_fn(n, p, |i, c| match c {
            0 => 1.0,
            1 => {
                if i < na {
                    0.0
                } else {
                    1.0
                }
            }
            _ => covariate(i, c - 2),
        });
        let y = DVector::from_iterator(n, a.data().iter().chain(b.data()).copied());

        let fit = ols(&x, &y)?;
        let cov = self.coefficient_covariance(&x, &fit)?;
        let df = (n - p) as f64;

        let (b0, bt) = (fit.beta[0], fit.beta[1]);
        let estimate = match config.test_type() {
            TestType::Absolute => EffectEstimate {
                effect: bt,
                standard_error: cov[(1, 1)].max(0.0).sqrt(),
            },
            TestType::Relative => correlated_effect(
                ArmEstimate { value: b0, variance: cov[(0, 0)] },
                ArmEstimate {
                    value: b0 + bt,
                    variance: cov[(0, 0)] + cov[(1, 1)] + 2.0 * cov[(0, 1)],
                },
                cov[(0, 0)] + cov[(0, 1)],
                TestType::Relative,
            )?,
        };
        let inference = two_sided(estimate, Reference::StudentT { df }, config.alpha())?;

        let diagnostics = self.diagnostics(&x, &y, &fit, df)?;
        debug!(
            effect = estimate.effect,
            se = estimate.standard_error,
            r_squared = diagnostics.r_squared,
            "fitted ANCOVA"
        );

        let mut result =
            TestResult::new(self.name(), config, estimate.effect, inference.pvalue, inference.bounds)?
                .with_statistic(inference.statistic)
                .with_standard_error(estimate.standard_error)
                .with_metadata("df", df)
                .with_metadata("adjusted_control_mean", b0)
                .with_metadata("residual_jb", diagnostics.residual_jb)
                .with_metadata("residual_normality_pvalue", diagnostics.residual_normality_pvalue)
                .with_metadata("r_squared", diagnostics.r_squared);
        for (j, v) in diagnostics.vif.iter().enumerate() {
            result = result.with_metadata(&format!("vif_{}", j), *v);
        }
        Ok((result, diagnostics))
    }

    fn diagnostics(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        fit: &OlsFit,
        df: f64,
    ) -> Result<AncovaDiagnostics> {
        let p = x.ncols();

        // VIF_j = 1 / (1 - R^2_j), regressing covariate j on intercept, treatment
        // and the remaining covariates.
        let mut vif = Vec::with_capacity(p - 2);
        for j in 2..p {
            let target = x.column(j).into_owned();
            let others: Vec<usize> = (0..p).filter(|&c| c != j).collect();
            let design = x.select_columns(others.iter());
            let aux = ols(&design, &target)?;
            let r2 = r_squared(&target, &aux.residuals);
            let value = if r2 >= 1.0 { f64::INFINITY } else { 1.0 / (1.0 - r2) };
            if value > VIF_WARNING {
                warn!(covariate = j - 2, vif = value, "high variance inflation in ANCOVA covariate");
            }
            vif.push(value);
        }

        let residuals: Vec<f64> = fit.residuals.iter().copied().collect();
        let (residual_jb, residual_normality_pvalue) = jarque_bera(&residuals)?;
        if residual_normality_pvalue < NORMALITY_WARNING {
            warn!(
                jb = residual_jb,
                pvalue = residual_normality_pvalue,
                "ANCOVA residuals deviate from normality"
            );
        }

        Ok(AncovaDiagnostics {
            vif,
            residual_jb,
            residual_normality_pvalue,
            r_squared: r_squared(y, &fit.residuals),
            df,
        })
    }
}

impl Comparison for AncovaTest {
    type Sample = SampleData;

    fn name(&self) -> &'static str {
        "ancova"
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
        self.compare_samples_with_diagnostics(a, b, config)
            .map(|(result, _)| result)
    }
}
