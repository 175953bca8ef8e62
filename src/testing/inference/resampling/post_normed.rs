//! Bootstrap on covariate-normalized metric values.

use super::bootstrap::BootstrapTest;
use super::engine::{ResamplingConfig, Statistic};
use crate::data::SampleData;
use crate::error::Result;
use crate::testing::inference::Comparison;
use crate::testing::inference::parametric::cuped::{cuped_adjust, theta_metadata};
use crate::testing::{TestConfig, TestResult};

/// Applies the pooled CUPED adjustment (same `theta` estimator and zero-variance guard as
/// [`CupedTTest`](crate::testing::inference::parametric::CupedTTest)) and bootstraps the
/// adjusted values.
#[derive(Debug, Clone, Default)]
pub struct PostNormedBootstrapTest {
    inner: BootstrapTest,
}

impl PostNormedBootstrapTest {
    pub fn new(config: TestConfig, resampling: ResamplingConfig) -> Self {
        PostNormedBootstrapTest {
            inner: BootstrapTest::new(config, resampling),
        }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.inner = self.inner.with_statistic(statistic);
        self
    }
}

impl Comparison for PostNormedBootstrapTest {
    type Sample = SampleData;

    fn name(&self) -> &'static str {
        "post-normed-bootstrap"
    }

    fn config(&self) -> &TestConfig {
        self.inner.config()
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
        let result = self
            .inner
            .run(self.name(), &fit.left, &fit.right, config)?
            .with_metadata("variance_reduction", fit.variance_reduction);
        Ok(theta_metadata(result, &fit.theta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::TestType;

    fn absolute() -> TestConfig {
        TestConfig::new(0.05, TestType::Absolute).unwrap()
    }

    fn with_cov(y: &[f64], x: &[f64]) -> SampleData {
        SampleData::new(y.to_vec()).unwrap().with_covariate(x.to_vec()).unwrap()
    }

    #[test]
    fn test_requires_covariates() {
        let a = SampleData::new(vec![1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(
            PostNormedBootstrapTest::default().compare_samples(&a, &a),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_narrower_than_plain_bootstrap() {
        let x_a = [5.0, 7.0, 6.0, 9.0, 4.0, 8.0, 6.5, 7.5, 5.5, 8.5];
        let x_b = [6.0, 5.5, 8.0, 7.0, 9.5, 4.5, 6.0, 7.0, 5.0, 8.0];
        let noise = [0.3, -0.2, 0.1, -0.4, 0.2, 0.0, -0.1, 0.3, -0.3, 0.1];
        let y_a: Vec<f64> = x_a.iter().zip(&noise).map(|(x, e)| 3.0 * x + e).collect();
        let y_b: Vec<f64> = x_b.iter().zip(&noise).map(|(x, e)| 3.0 * x + 1.0 - e).collect();
        let a = with_cov(&y_a, &x_a);
        let b = with_cov(&y_b, &x_b);

        let cfg = ResamplingConfig::new(2000, 21).unwrap();
        let normed = PostNormedBootstrapTest::new(absolute(), cfg).compare_samples(&a, &b).unwrap();
        let plain = BootstrapTest::new(absolute(), cfg).compare_samples(&a, &b).unwrap();

        assert!(normed.ci_length < plain.ci_length / 3.0);
        assert!(normed.metadata("theta").unwrap() > 2.5);
        assert_eq!(normed.method, "post-normed-bootstrap");
    }

    #[test]
    fn test_constant_covariate() {
        let a = with_cov(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0]);
        let b = with_cov(&[2.0, 2.0, 4.0], &[1.0, 1.0, 1.0]);
        assert!(matches!(
            PostNormedBootstrapTest::default().compare_samples(&a, &b),
            Err(Error::Numerical(_))
        ));
    }
}
