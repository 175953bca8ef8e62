//! Bootstrap test on two independently resampled arms.

use super::engine::{
    ResamplingConfig, Resampler, Statistic, bootstrap_distribution, effect_of, summarize,
};
use crate::data::SampleData;
use crate::error::{Error, Result};
use crate::testing::effect::check_control;
use crate::testing::inference::Comparison;
use crate::testing::{TestConfig, TestResult, TestType};
use rand::rngs::StdRng;

#[derive(Debug, Clone, Default)]
pub struct BootstrapTest {
    config: TestConfig,
    resampling: ResamplingConfig,
    statistic: Statistic,
}

impl BootstrapTest {
    pub fn new(config: TestConfig, resampling: ResamplingConfig) -> Self {
        BootstrapTest {
            config,
            resampling,
            statistic: Statistic::mean(),
        }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn resampling(&self) -> &ResamplingConfig {
        &self.resampling
    }

    pub fn statistic(&self) -> &Statistic {
        &self.statistic
    }

    pub(crate) fn run(
        &self,
        method: &'static str,
        a: &SampleData,
        b: &SampleData,
        config: &TestConfig,
    ) -> Result<TestResult> {
        self.resampling.check_resolution(config.alpha())?;
        let shortest = a.len().min(b.len());
        if shortest < self.min_sample_size() {
            return Err(Error::insufficient(self.min_sample_size(), shortest, "bootstrap arm"));
        }

        let (x, y) = (a.data(), b.data());
        let test_type = config.test_type();
        let control = self.statistic.compute(x);
        if test_type == TestType::Relative {
            check_control(control)?;
        }
        let effect = effect_of(control, self.statistic.compute(y), test_type);

        let left = Resampler::new(x.len(), a.strata());
        let right = Resampler::new(y.len(), b.strata());
        let draws = bootstrap_distribution(&self.resampling, |rng: &mut StdRng| {
            let mut idx = Vec::new();
            left.draw(rng, &mut idx);
            let xs: Vec<f64> = idx.iter().map(|&i| x[i]).collect();
            right.draw(rng, &mut idx);
            let ys: Vec<f64> = idx.iter().map(|&i| y[i]).collect();
            effect_of(self.statistic.compute(&xs), self.statistic.compute(&ys), test_type)
        });
        let summary = summarize(&draws, config.alpha())?;

        Ok(TestResult::new(method, config, effect, summary.pvalue, summary.bounds)?
            .with_standard_error(summary.standard_error)
            .with_metadata("n_resamples", draws.len() as f64)
            .with_metadata("bootstrap_se", summary.standard_error))
    }
}

impl Comparison for BootstrapTest {
    type Sample = SampleData;

    fn name(&self) -> &'static str {
        "bootstrap"
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
        self.run(self.name(), a, b, config)
    }
}
