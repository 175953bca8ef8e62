//! The comparison contract shared by every test.
//!
//! A test only implements [`Comparison::compare_samples_with`] for a single pair of
//! arms. Batch orchestration over all pairs `(i, j)` with `i < j` lives here once,
//! so every parametric and resampling test enumerates, labels and reports pairs in
//! exactly the same order.

use crate::data::Named;
use crate::error::{Error, Result};
use crate::testing::{ArmRef, TestConfig, TestResult, TestType};
use tracing::{debug, warn};

pub mod parametric;
pub mod resampling;

/// What happens to a batch when one pair fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// The first error fails the whole call.
    #[default]
    Abort,
    /// Pair-local errors (numerical, insufficient data) stay in that pair's slot;
    /// configuration and validation errors still fail the call.
    Isolate,
}

pub trait Comparison {
    type Sample: Named;

    /// Name reported in [`TestResult::method`].
    fn name(&self) -> &'static str;

    fn config(&self) -> &TestConfig;

    /// Compare exactly one pair; `a` is the control arm, `b` the treatment arm.
    fn compare_samples_with(
        &self,
        a: &Self::Sample,
        b: &Self::Sample,
        config: &TestConfig,
    ) -> Result<TestResult>;

    /// Smallest per-arm sample the test can work with.
    fn min_sample_size(&self) -> usize {
        2
    }

    /// Per-arm requirements (covariates, pairing ids) checked on every sample before
    /// any pair is compared.
    fn validate_sample(&self, _sample: &Self::Sample) -> Result<()> {
        Ok(())
    }

    fn compare_samples(&self, a: &Self::Sample, b: &Self::Sample) -> Result<TestResult> {
        self.compare_samples_with(a, b, self.config())
    }

    /// Compare every pair of samples, failing on the first error.
    fn compare(&self, samples: &[Self::Sample]) -> Result<Vec<TestResult>> {
        run_pairs(self, samples, self.config(), BatchPolicy::Abort)?
            .into_iter()
            .collect()
    }

    /// [`compare`](Comparison::compare) with per-call overrides of the effect scale and alpha.
    fn compare_with(
        &self,
        samples: &[Self::Sample],
        test_type: Option<TestType>,
        alpha: Option<f64>,
    ) -> Result<Vec<TestResult>> {
        let config = self.config().overridden(test_type, alpha)?;
        run_pairs(self, samples, &config, BatchPolicy::Abort)?
            .into_iter()
            .collect()
    }

    /// Compare every pair, keeping pair-local failures in place instead of aborting.
    fn compare_each(&self, samples: &[Self::Sample]) -> Result<Vec<Result<TestResult>>> {
        run_pairs(self, samples, self.config(), BatchPolicy::Isolate)
    }
}

/// All unordered index pairs `(i, j)` with `i < j`, in lexicographic order.
pub fn pairwise_indices(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect()
}

fn check_batch<S>(samples: &[S]) -> Result<()> {
    if samples.len() < 2 {
        return Err(Error::Configuration(format!(
            "At least two samples are required for a comparison, got {}",
            samples.len()
        )));
    }
    Ok(())
}

/// Batch size check plus [`Comparison::validate_sample`] on every arm.
pub(crate) fn validate_batch<C>(test: &C, samples: &[C::Sample]) -> Result<()>
where
    C: Comparison + ?Sized,
{
    check_batch(samples)?;
    samples.iter().try_for_each(|s| test.validate_sample(s))
}

pub(crate) fn arm_ref<S: Named>(samples: &[S], index: usize) -> ArmRef {
    ArmRef {
        index,
        name: samples[index].label().map(str::to_string),
    }
}

/// Run a test over all pairs under the given policy.
///
/// With [`BatchPolicy::Abort`] the returned vector only ever holds `Ok` entries since
/// the first error is returned directly.
pub fn run_pairs<C>(
    test: &C,
    samples: &[C::Sample],
    config: &TestConfig,
    policy: BatchPolicy,
) -> Result<Vec<Result<TestResult>>>
where
    C: Comparison + ?Sized,
{
    validate_batch(test, samples)?;
    let pairs = pairwise_indices(samples.len());
    let mut out = Vec::with_capacity(pairs.len());

    for (i, j) in pairs {
        let outcome = test
            .compare_samples_with(&samples[i], &samples[j], config)
            .map(|r| r.with_arms(arm_ref(samples, i), arm_ref(samples, j)));

        match outcome {
            Ok(result) => {
                debug!(
                    test = test.name(),
                    left = i,
                    right = j,
                    effect = result.effect,
                    pvalue = result.pvalue,
                    "pair compared"
                );
                out.push(Ok(result));
            }
            Err(e) if policy == BatchPolicy::Isolate && e.is_pair_local() => {
                warn!(test = test.name(), left = i, right = j, error = %e, "pair failed, isolated");
                out.push(Err(e));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SampleData;
    use std::cell::Cell;

    /// Difference of first observations; fails numerically on a zero control.
    struct FirstValue {
        config: TestConfig,
    }

    impl Comparison for FirstValue {
        type Sample = SampleData;

        fn name(&self) -> &'static str {
            "first-value"
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
            let (x, y) = (a.data()[0], b.data()[0]);
            if x == 0.0 {
                return Err(Error::Numerical("zero control".into()));
            }
            if b.len() > 3 {
                return Err(Error::Configuration("too long".into()));
            }
            TestResult::new(self.name(), config, y - x, 0.5, (y - x, y - x))
        }
    }

    /// Needs a covariate on every arm and counts the pairs it was asked to compare.
    struct CountingCovariateTest {
        config: TestConfig,
        calls: Cell<usize>,
    }

    impl Comparison for CountingCovariateTest {
        type Sample = SampleData;

        fn name(&self) -> &'static str {
            "counting"
        }

        fn config(&self) -> &TestConfig {
            &self.config
        }

        fn validate_sample(&self, sample: &SampleData) -> Result<()> {
            sample.require_covariates(self.name())
        }

        fn compare_samples_with(
            &self,
            _a: &SampleData,
            _b: &SampleData,
            config: &TestConfig,
        ) -> Result<TestResult> {
            self.calls.set(self.calls.get() + 1);
            TestResult::new(self.name(), config, 0.0, 1.0, (0.0, 0.0))
        }
    }

    fn sample(v: f64, name: &str) -> SampleData {
        SampleData::new(vec![v]).unwrap().with_name(name)
    }

    #[test]
    fn test_pairwise_indices_order() {
        assert_eq!(
            pairwise_indices(4),
            vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
        );
        assert!(pairwise_indices(1).is_empty());
    }

    #[test]
    fn test_compare_requires_two_samples() {
        let t = FirstValue { config: TestConfig::default() };
        assert!(matches!(
            t.compare(&[sample(1.0, "a")]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_compare_labels_pairs() {
        let t = FirstValue { config: TestConfig::default() };
        let samples = [sample(1.0, "a"), sample(2.0, "b"), sample(4.0, "c")];
        let results = t.compare(&samples).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].left.index, 0);
        assert_eq!(results[1].right.index, 2);
        assert_eq!(results[1].right.name.as_deref(), Some("c"));
        assert_eq!(results[2].effect, 2.0);
    }

    #[test]
    fn test_compare_with_overrides() {
        let t = FirstValue { config: TestConfig::default() };
        let samples = [sample(1.0, "a"), sample(2.0, "b")];
        let results = t.compare_with(&samples, Some(TestType::Absolute), Some(0.6)).unwrap();
        assert_eq!(results[0].alpha, 0.6);
        assert_eq!(results[0].test_type, TestType::Absolute);
        assert!(results[0].reject);
        assert!(t.compare_with(&samples, None, Some(1.5)).is_err());
    }

    #[test]
    fn test_abort_and_isolate_policies() {
        let t = FirstValue { config: TestConfig::default() };
        let samples = [sample(1.0, "a"), sample(0.0, "zero"), sample(3.0, "c")];

        // (0,1) fine, (0,2) fine, (1,2) has zero control
        assert!(matches!(t.compare(&samples), Err(Error::Numerical(_))));

        let each = t.compare_each(&samples).unwrap();
        assert_eq!(each.len(), 3);
        assert!(each[0].is_ok());
        assert!(each[1].is_ok());
        assert!(matches!(each[2], Err(Error::Numerical(_))));
    }

    #[test]
    fn test_isolate_still_aborts_on_configuration() {
        let t = FirstValue { config: TestConfig::default() };
        let long = SampleData::new(vec![1.0; 5]).unwrap();
        let samples = [sample(1.0, "a"), long];
        assert!(matches!(t.compare_each(&samples), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_arm_fails_before_any_pair() {
        let t = CountingCovariateTest { config: TestConfig::default(), calls: Cell::new(0) };
        let with_cov = |v: f64| {
            SampleData::new(vec![v, v + 1.0])
                .unwrap()
                .with_covariate(vec![1.0, 2.0])
                .unwrap()
        };
        let samples = [with_cov(1.0), with_cov(2.0), sample(3.0, "last")];

        assert!(matches!(t.compare(&samples), Err(Error::Configuration(_))));
        assert!(matches!(t.compare_each(&samples), Err(Error::Configuration(_))));
        assert_eq!(t.calls.get(), 0);

        assert_eq!(t.compare(&samples[..2]).unwrap().len(), 1);
        assert_eq!(t.calls.get(), 1);
    }
}
