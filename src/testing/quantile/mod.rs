//! Distributional comparisons: rerun a test on the part of each arm below (or above)
//! a quantile cutoff, or compare the quantiles of the full arms directly.

use crate::data::SampleData;
use crate::error::{Error, Result};
use crate::testing::inference::resampling::{BootstrapTest, ResamplingConfig, Statistic};
use crate::testing::inference::{BatchPolicy, Comparison, arm_ref, pairwise_indices, validate_batch};
use crate::testing::utils::quantile;
use crate::testing::{ArmRef, QuantileTestResult, TestConfig, TestResult};
use tracing::{debug, warn};

/// Which side of the cutoff is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SliceMode {
    /// Observations `<= cutoff`
    #[default]
    Below,
    /// Observations `>= cutoff`
    Above,
}

impl SliceMode {
    fn keeps(&self, value: f64, cutoff: f64) -> bool {
        match self {
            SliceMode::Below => value <= cutoff,
            SliceMode::Above => value >= cutoff,
        }
    }
}

/// Outcome for one `(pair, quantile)` position.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantileOutcome {
    Computed(QuantileTestResult),
    /// The slice was too small for the wrapped test.
    InsufficientData {
        quantile: f64,
        left: ArmRef,
        right: ArmRef,
        sample_size: usize,
        required: usize,
    },
    /// A pair-local failure kept in place under [`BatchPolicy::Isolate`].
    Failed {
        quantile: f64,
        left: ArmRef,
        right: ArmRef,
        error: Error,
    },
}

impl QuantileOutcome {
    pub fn quantile(&self) -> f64 {
        match self {
            QuantileOutcome::Computed(r) => r.quantile,
            QuantileOutcome::InsufficientData { quantile, .. }
            | QuantileOutcome::Failed { quantile, .. } => *quantile,
        }
    }

    pub fn result(&self) -> Option<&QuantileTestResult> {
        match self {
            QuantileOutcome::Computed(r) => Some(r),
            _ => None,
        }
    }
}

/// Runs a wrapped test on quantile slices of every pair of arms.
///
/// # Example
/// ```
/// use single_experiments::data::SampleData;
/// use single_experiments::testing::inference::parametric::TTest;
/// use single_experiments::testing::quantile::QuantileAnalyzer;
///
/// let a = SampleData::new((1..=20).map(f64::from).collect()).unwrap();
/// let b = SampleData::new((3..=22).map(f64::from).collect()).unwrap();
/// let analyzer = QuantileAnalyzer::new(TTest::default(), vec![0.5, 0.9]).unwrap();
/// let outcomes = analyzer.compare(&[a, b]).unwrap();
/// assert_eq!(outcomes.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct QuantileAnalyzer<C> {
    test: C,
    quantiles: Vec<f64>,
    slice: SliceMode,
    policy: BatchPolicy,
}

impl<C> QuantileAnalyzer<C>
where
    C: Comparison<Sample = SampleData>,
{
    pub fn new(test: C, quantiles: Vec<f64>) -> Result<Self> {
        check_levels(&quantiles)?;
        Ok(QuantileAnalyzer {
            test,
            quantiles,
            slice: SliceMode::default(),
            policy: BatchPolicy::default(),
        })
    }

    pub fn with_slice(mut self, slice: SliceMode) -> Self {
        self.slice = slice;
        self
    }

    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    pub fn test(&self) -> &C {
        &self.test
    }

    /// Cut both arms at the `q`-quantile of their pooled data.
    pub fn slice_pair(
        &self,
        a: &SampleData,
        b: &SampleData,
        q: f64,
    ) -> (Vec<usize>, Vec<usize>) {
        let pooled: Vec<f64> = a.data().iter().chain(b.data()).copied().collect();
        let cutoff = quantile(&pooled, q);
        let keep = |s: &SampleData| {
            s.data()
                .iter()
                .enumerate()
                .filter(|&(_, &v)| self.slice.keeps(v, cutoff))
                .map(|(i, _)| i)
                .collect::<Vec<_>>()
        };
        (keep(a), keep(b))
    }

    /// Run the wrapped test on every pair of arms and every quantile level.
    ///
    /// # Arguments
    ///
    /// * `samples` - At least two arms; each must meet the wrapped test's per-arm
    ///   requirements
    ///
    /// # Returns
    ///
    /// One outcome per pair and quantile, pair-major and quantile-minor. Slices smaller
    /// than the test's minimum (and never smaller than one observation) become
    /// [`QuantileOutcome::InsufficientData`] without running the test.
    pub fn compare(&self, samples: &[SampleData]) -> Result<Vec<QuantileOutcome>> {
        validate_batch(&self.test, samples)?;
        let required = self.test.min_sample_size().max(1);
        let mut out = Vec::new();

        for (i, j) in pairwise_indices(samples.len()) {
            let (left, right) = (arm_ref(samples, i), arm_ref(samples, j));
            for &q in &self.quantiles {
                let (idx_a, idx_b) = self.slice_pair(&samples[i], &samples[j], q);
                let sample_size = idx_a.len() + idx_b.len();

                if idx_a.len().min(idx_b.len()) < required {
                    debug!(left = i, right = j, quantile = q, sample_size, "slice too small");
                    out.push(QuantileOutcome::InsufficientData {
                        quantile: q,
                        left: left.clone(),
                        right: right.clone(),
                        sample_size,
                        required,
                    });
                    continue;
                }

                let a = samples[i].select(&idx_a)?;
                let b = samples[j].select(&idx_b)?;
                let outcome = self.test.compare_samples_with(&a, &b, self.test.config());
                out.push(record(outcome, q, (&left, &right), sample_size, self.policy)?);
            }
        }

        Ok(out)
    }
}

/// Turn one `(pair, quantile)` attempt into its outcome, or the error that aborts the batch.
fn record(
    outcome: Result<TestResult>,
    quantile: f64,
    (left, right): (&ArmRef, &ArmRef),
    sample_size: usize,
    policy: BatchPolicy,
) -> Result<QuantileOutcome> {
    match outcome {
        Ok(result) => Ok(QuantileOutcome::Computed(QuantileTestResult {
            result: result.with_arms(left.clone(), right.clone()),
            quantile,
            sample_size,
        })),
        Err(Error::InsufficientData { required, .. }) => Ok(QuantileOutcome::InsufficientData {
            quantile,
            left: left.clone(),
            right: right.clone(),
            sample_size,
            required,
        }),
        Err(e) if policy == BatchPolicy::Isolate && e.is_pair_local() => {
            warn!(
                left = left.index,
                right = right.index,
                quantile,
                error = %e,
                "quantile comparison failed, isolated"
            );
            Ok(QuantileOutcome::Failed {
                quantile,
                left: left.clone(),
                right: right.clone(),
                error: e,
            })
        }
        Err(e) => Err(e),
    }
}

/// Quantile treatment effects: the `q`-quantile of the treatment arm against the
/// `q`-quantile of the control arm, both taken over the full arms, with a bootstrap
/// interval and p-value per level.
///
/// # Example
/// ```
/// use single_experiments::data::SampleData;
/// use single_experiments::testing::inference::resampling::ResamplingConfig;
/// use single_experiments::testing::quantile::QuantileEffectAnalyzer;
/// use single_experiments::testing::{TestConfig, TestType};
///
/// let a = SampleData::new((1..=40).map(f64::from).collect()).unwrap();
/// let b = SampleData::new((5..=44).map(f64::from).collect()).unwrap();
/// let config = TestConfig::new(0.05, TestType::Absolute).unwrap();
/// let resampling = ResamplingConfig::new(1000, 7).unwrap();
/// let analyzer = QuantileEffectAnalyzer::new(config, resampling, vec![0.5]).unwrap();
/// let outcomes = analyzer.compare(&[a, b]).unwrap();
/// assert_eq!(outcomes[0].result().unwrap().effect, 4.0);
/// ```
#[derive(Debug, Clone)]
pub struct QuantileEffectAnalyzer {
    bootstrap: BootstrapTest,
    quantiles: Vec<f64>,
    policy: BatchPolicy,
}

impl QuantileEffectAnalyzer {
    pub fn new(config: TestConfig, resampling: ResamplingConfig, quantiles: Vec<f64>) -> Result<Self> {
        check_levels(&quantiles)?;
        Ok(QuantileEffectAnalyzer {
            bootstrap: BootstrapTest::new(config, resampling),
            quantiles,
            policy: BatchPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    /// Compare the quantiles of every pair of full arms.
    ///
    /// # Arguments
    ///
    /// * `samples` - At least two arms
    ///
    /// # Returns
    ///
    /// One outcome per pair and quantile, pair-major and quantile-minor; `sample_size`
    /// counts both full arms.
    pub fn compare(&self, samples: &[SampleData]) -> Result<Vec<QuantileOutcome>> {
        validate_batch(&self.bootstrap, samples)?;
        let tests = self
            .quantiles
            .iter()
            .map(|&q| -> Result<(f64, BootstrapTest)> {
                Ok((q, self.bootstrap.clone().with_statistic(Statistic::quantile(q)?)))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut out = Vec::with_capacity(tests.len() * samples.len() * (samples.len() - 1) / 2);

        for (i, j) in pairwise_indices(samples.len()) {
            let (left, right) = (arm_ref(samples, i), arm_ref(samples, j));
            let sample_size = samples[i].len() + samples[j].len();
            for (q, test) in &tests {
                let outcome = test.run(QUANTILE_EFFECT_METHOD, &samples[i], &samples[j], test.config());
                out.push(record(outcome, *q, (&left, &right), sample_size, self.policy)?);
            }
        }

        Ok(out)
    }
}

const QUANTILE_EFFECT_METHOD: &str = "quantile-bootstrap";

fn check_levels(quantiles: &[f64]) -> Result<()> {
    if quantiles.is_empty() {
        return Err(Error::Validation(
            "At least one quantile level is required".to_string(),
        ));
    }
    if let Some(q) = quantiles.iter().find(|q| !(**q > 0.0 && **q < 1.0)) {
        return Err(Error::Validation(format!(
            "Quantile levels must lie strictly between 0 and 1, got {}",
            q
        )));
    }
    Ok(())
}
