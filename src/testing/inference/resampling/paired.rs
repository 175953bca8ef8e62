//! Bootstrap over matched pairs.

use super::engine::{
    ResamplingConfig, Resampler, Statistic, bootstrap_distribution, effect_of, summarize,
};
use crate::data::SampleData;
use crate::error::{Error, Result};
use crate::testing::effect::check_control;
use crate::testing::inference::Comparison;
use crate::testing::utils::align_pairs;
use crate::testing::{TestConfig, TestResult, TestType};
use rand::rngs::StdRng;

/// Resamples whole pairs: a unit drawn into a bootstrap sample brings both its control
/// and its treatment observation, so the within-pair correlation is kept in every draw.
#[derive(Debug, Clone, Default)]
pub struct PairedBootstrapTest {
    config: TestConfig,
    resampling: ResamplingConfig,
    statistic: Statistic,
}

impl PairedBootstrapTest {
    pub fn new(config: TestConfig, resampling: ResamplingConfig) -> Self {
        PairedBootstrapTest {
            config,
            resampling,
            statistic: Statistic::mean(),
        }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }
}

impl Comparison for PairedBootstrapTest {
    type Sample = SampleData;

    fn name(&self) -> &'static str {
        "paired-bootstrap"
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
        let (a_ids, b_ids) = match (a.paired_ids(), b.paired_ids()) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(Error::Configuration(
                    "Paired bootstrap requires paired_ids on both samples".to_string(),
                ));
            }
        };
        let pairs = align_pairs(a_ids, b_ids)?;
        if pairs.len() < self.min_sample_size() {
            return Err(Error::insufficient(self.min_sample_size(), pairs.len(), "paired bootstrap"));
        }
        self.resampling.check_resolution(config.alpha())?;

        let x: Vec<f64> = pairs.iter().map(|&(i, _)| a.data()[i]).collect();
        let y: Vec<f64> = pairs.iter().map(|&(_, j)| b.data()[j]).collect();
        let strata: Option<Vec<String>> = a
            .strata()
            .map(|s| pairs.iter().map(|&(i, _)| s[i].clone()).collect());

        let test_type = config.test_type();
        let control = self.statistic.compute(&x);
        if test_type == TestType::Relative {
            check_control(control)?;
        }
        let effect = effect_of(control, self.statistic.compute(&y), test_type);

        let resampler = Resampler::new(pairs.len(), strata.as_deref());
        let draws = bootstrap_distribution(&self.resampling, |rng: &mut StdRng| {
            let mut idx = Vec::new();
            resampler.draw(rng, &mut idx);
            let xs: Vec<f64> = idx.iter().map(|&k| x[k]).collect();
            let ys: Vec<f64> = idx.iter().map(|&k| y[k]).collect();
            effect_of(self.statistic.compute(&xs), self.statistic.compute(&ys), test_type)
        });
        let summary = summarize(&draws, config.alpha())?;

        Ok(TestResult::new(self.name(), config, effect, summary.pvalue, summary.bounds)?
            .with_standard_error(summary.standard_error)
            .with_metadata("n_resamples", draws.len() as f64)
            .with_metadata("bootstrap_se", summary.standard_error)
            .with_metadata("n_pairs", pairs.len() as f64))
    }
}
