//! Paired t-test on observations matched by identifier.

use super::{Reference, two_sided};
use crate::data::SampleData;
use crate::error::{Error, Result};
use crate::testing::effect::{ArmEstimate, correlated_effect};
use crate::testing::inference::Comparison;
use crate::testing::utils::{align_pairs, covariance, mean, variance};
use crate::testing::{TestConfig, TestResult};

/// Values of both arms reordered so that position `k` of each holds the same unit.
pub(crate) fn paired_values(a: &SampleData, b: &SampleData) -> Result<(Vec<f64>, Vec<f64>)> {
    let (a_ids, b_ids) = match (a.paired_ids(), b.paired_ids()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(Error::Configuration(
                "Paired comparison requires paired_ids on both samples".to_string(),
            ));
        }
    };
    let pairs = align_pairs(a_ids, b_ids)?;
    let x = pairs.iter().map(|&(i, _)| a.data()[i]).collect();
    let y = pairs.iter().map(|&(_, j)| b.data()[j]).collect();
    Ok((x, y))
}

/// One-sample t-test on the per-pair differences `b - a`.
#[derive(Debug, Clone, Default)]
pub struct PairedTTest {
    config: TestConfig,
}

impl PairedTTest {
    pub fn new(config: TestConfig) -> Self {
        PairedTTest { config }
    }
}

impl Comparison for PairedTTest {
    type Sample = SampleData;

    fn name(&self) -> &'static str {
        "paired-t-test"
    }

    fn config(&self) -> &TestConfig {
        &self.config
    }

    fn validate_sample(&self, sample: &SampleData) -> Result<()> {
        sample.require_paired_ids(self.name())
    }

    fn compare_samples_with(
        &self,
        a: &SampleData,
        b: &SampleData,
        config: &TestConfig,
    ) -> Result<TestResult> {
        let (x, y) = paired_values(a, b)?;
        let n = x.len();
        if n < 2 {
            return Err(Error::insufficient(2, n, "paired t-test"));
        }
        let nf = n as f64;

        // Var(mean(y) - mean(x)) = Var(d) / n, expressed through the arm moments so the
        // relative effect gets the covariance term of the delta method.
        let estimate = correlated_effect(
            ArmEstimate { value: mean(&x), variance: variance(&x) / nf },
            ArmEstimate { value: mean(&y), variance: variance(&y) / nf },
            covariance(&x, &y) / nf,
            config.test_type(),
        )?;
        let df = nf - 1.0;
        let inference = two_sided(estimate, Reference::StudentT { df }, config.alpha())?;

        Ok(
            TestResult::new(self.name(), config, estimate.effect, inference.pvalue, inference.bounds)?
                .with_statistic(inference.statistic)
                .with_standard_error(estimate.standard_error)
                .with_metadata("df", df)
                .with_metadata("n_pairs", nf),
        )
    }
}
