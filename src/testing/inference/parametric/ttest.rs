//! Two-sample t-test on arm means.

use super::{Inference, Reference, two_sided};
use crate::data::SampleData;
use crate::error::{Error, Result};
use crate::testing::effect::{ArmEstimate, EffectEstimate, cohens_d, independent_effect};
use crate::testing::inference::Comparison;
use crate::testing::utils::{mean, variance};
use crate::testing::{TTestType, TestConfig, TestResult};

/// Mean, unbiased variance and size of one arm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmSummary {
    pub mean: f64,
    pub variance: f64,
    pub n: f64,
}

impl ArmSummary {
    pub fn from_values(values: &[f64]) -> Self {
        ArmSummary {
            mean: mean(values),
            variance: variance(values),
            n: values.len() as f64,
        }
    }
}

/// Perform a t-test using precomputed summary statistics.
///
/// Student's variant pools the variances with `n1 + n2 - 2` degrees of freedom, Welch's
/// keeps them separate and uses the Welch-Satterthwaite degrees of freedom.
///
/// # Arguments
///
/// * `left`, `right` - Mean, variance and count of the control and treatment arms
/// * `test_type` - Type of t-test to perform (Student's or Welch's)
/// * `config` - Effect scale and significance level
///
/// # Returns
///
/// The effect estimate, the degrees of freedom and the inference.
pub fn t_test_from_summary(
    left: ArmSummary,
    right: ArmSummary,
    test_type: TTestType,
    config: &TestConfig,
) -> Result<(EffectEstimate, f64, Inference)> {
    if left.n < 2.0 || right.n < 2.0 {
        return Err(Error::insufficient(2, left.n.min(right.n) as usize, "t-test arm"));
    }
    let (n1, n2) = (left.n, right.n);

    let (var_mean1, var_mean2, df) = match test_type {
        TTestType::Student => {
            let pooled_var =
                ((n1 - 1.0) * left.variance + (n2 - 1.0) * right.variance) / (n1 + n2 - 2.0);
            (pooled_var / n1, pooled_var / n2, n1 + n2 - 2.0)
        }
        TTestType::Welch => {
            let term1 = left.variance / n1;
            let term2 = right.variance / n2;
            let combined = term1 + term2;
            let denom = term1 * term1 / (n1 - 1.0) + term2 * term2 / (n2 - 1.0);
            let df = if denom > 0.0 {
                combined * combined / denom
            } else {
                n1 + n2 - 2.0
            };
            (term1, term2, df)
        }
    };

    let estimate = independent_effect(
        ArmEstimate { value: left.mean, variance: var_mean1 },
        ArmEstimate { value: right.mean, variance: var_mean2 },
        config.test_type(),
    )?;
    let inference = two_sided(estimate, Reference::StudentT { df }, config.alpha())?;
    Ok((estimate, df, inference))
}

/// Shared by [`TTest`] and the CUPED variant, which runs it on adjusted values.
pub(crate) fn t_test_values(
    method: &'static str,
    x: &[f64],
    y: &[f64],
    test_type: TTestType,
    config: &TestConfig,
) -> Result<TestResult> {
    let left = ArmSummary::from_values(x);
    let right = ArmSummary::from_values(y);
    let (estimate, df, inference) = t_test_from_summary(left, right, test_type, config)?;

    let mut result = TestResult::new(method, config, estimate.effect, inference.pvalue, inference.bounds)?
        .with_statistic(inference.statistic)
        .with_standard_error(estimate.standard_error)
        .with_metadata("df", df)
        .with_metadata("mean_left", left.mean)
        .with_metadata("mean_right", right.mean);
    if let Ok(d) = cohens_d(x, y) {
        result = result.with_metadata("cohens_d", d);
    }
    Ok(result)
}

/// Independent two-sample t-test; Welch's variant unless configured otherwise.
#[derive(Debug, Clone, Default)]
pub struct TTest {
    config: TestConfig,
    ttest_type: TTestType,
}

impl TTest {
    pub fn new(config: TestConfig) -> Self {
        TTest {
            config,
            ttest_type: TTestType::Welch,
        }
    }

    pub fn with_ttest_type(mut self, ttest_type: TTestType) -> Self {
        self.ttest_type = ttest_type;
        self
    }

    pub fn ttest_type(&self) -> TTestType {
        self.ttest_type
    }
}

impl Comparison for TTest {
    type Sample = SampleData;

    fn name(&self) -> &'static str {
        "t-test"
    }

    fn config(&self) -> &TestConfig {
        &self.config
    }

    fn compare_samples_with(
        &self,
        a: &SampleData,
        b: &SampleData,
        config: &TestConfig,
    ) -> Result<TestResult> {
        t_test_values(self.name(), a.data(), b.data(), self.ttest_type, config)
    }
}
