//! Normal-approximation test for two independent proportions.

use super::{Inference, Reference, normal_quantile, standard_normal, two_sided};
use crate::data::ProportionData;
use crate::error::{Error, Result};
use crate::testing::effect::{ArmEstimate, EffectEstimate, independent_effect};
use crate::testing::inference::Comparison;
use crate::testing::{TestConfig, TestResult, TestType};
use statrs::distribution::ContinuousCDF;

#[derive(Debug, Clone)]
pub struct ZTest {
    config: TestConfig,
    pooled: bool,
    continuity_correction: bool,
}

impl Default for ZTest {
    fn default() -> Self {
        ZTest::new(TestConfig::default())
    }
}

impl ZTest {
    pub fn new(config: TestConfig) -> Self {
        ZTest {
            config,
            pooled: true,
            continuity_correction: false,
        }
    }

    /// Use the pooled proportion for the standard error of the test statistic
    /// (absolute mode only; the interval always uses the unpooled error).
    pub fn with_pooled(mut self, pooled: bool) -> Self {
        self.pooled = pooled;
        self
    }

    /// Apply the continuity correction `0.5 * (1/n_a + 1/n_b)`.
    pub fn with_continuity_correction(mut self, correction: bool) -> Self {
        self.continuity_correction = correction;
        self
    }

    fn absolute(
        &self,
        a: &ProportionData,
        b: &ProportionData,
        alpha: f64,
    ) -> Result<(EffectEstimate, Inference)> {
        let (p1, p2) = (a.rate(), b.rate());
        let (n1, n2) = (a.trials() as f64, b.trials() as f64);
        let diff = p2 - p1;
        let unpooled_se = (p1 * (1.0 - p1) / n1 + p2 * (1.0 - p2) / n2).sqrt();
        let test_se = if self.pooled {
            let p = (a.successes() + b.successes()) as f64 / (n1 + n2);
            (p * (1.0 - p) * (1.0 / n1 + 1.0 / n2)).sqrt()
        } else {
            unpooled_se
        };
        let cc = if self.continuity_correction {
            0.5 * (1.0 / n1 + 1.0 / n2)
        } else {
            0.0
        };

        let (statistic, pvalue) = if test_se == 0.0 {
            // both arms all-success or all-failure with identical rates
            (0.0, if diff == 0.0 { 1.0 } else { 0.0 })
        } else {
            let z = (diff.abs() - cc).max(0.0) / test_se;
            (diff.signum() * z, (2.0 * standard_normal()?.sf(z)).min(1.0))
        };

        let margin = normal_quantile(1.0 - alpha / 2.0)? * unpooled_se + cc;
        Ok((
            EffectEstimate { effect: diff, standard_error: unpooled_se },
            Inference {
                statistic,
                pvalue,
                bounds: (diff - margin, diff + margin),
            },
        ))
    }

    fn relative(
        &self,
        a: &ProportionData,
        b: &ProportionData,
        alpha: f64,
    ) -> Result<(EffectEstimate, Inference)> {
        let (p1, p2) = (a.rate(), b.rate());
        let (n1, n2) = (a.trials() as f64, b.trials() as f64);
        let estimate = independent_effect(
            ArmEstimate { value: p1, variance: p1 * (1.0 - p1) / n1 },
            ArmEstimate { value: p2, variance: p2 * (1.0 - p2) / n2 },
            TestType::Relative,
        )?;
        let inference = two_sided(estimate, Reference::Normal, alpha)?;
        Ok((estimate, inference))
    }
}

impl Comparison for ZTest {
    type Sample = ProportionData;

    fn name(&self) -> &'static str {
        "z-test"
    }

    fn config(&self) -> &TestConfig {
        &self.config
    }

    fn min_sample_size(&self) -> usize {
        1
    }

    fn compare_samples_with(
        &self,
        a: &ProportionData,
        b: &ProportionData,
        config: &TestConfig,
    ) -> Result<TestResult> {
        let (estimate, inference) = match config.test_type() {
            TestType::Absolute => self.absolute(a, b, config.alpha())?,
            TestType::Relative => {
                if a.successes() == 0 {
                    return Err(Error::Numerical(
                        "Control proportion is zero; relative effect is undefined".to_string(),
                    ));
                }
                self.relative(a, b, config.alpha())?
            }
        };

        Ok(
            TestResult::new(self.name(), config, estimate.effect, inference.pvalue, inference.bounds)?
                .with_statistic(inference.statistic)
                .with_standard_error(estimate.standard_error)
                .with_metadata("rate_left", a.rate())
                .with_metadata("rate_right", b.rate()),
        )
    }
}
