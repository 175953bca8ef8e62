//! Sample size and minimum detectable effect (MDE) formulas for two-arm experiments.
//!
//! All formulas are two-sided normal approximations with equal allocation, using the
//! same normal quantiles as the z-test: per arm
//! `n = (z_{1-α/2} + z_{power})² · V / δ²` where `V` is the summed per-observation
//! variance of both arms and `δ` the absolute effect.

use crate::data::SampleData;
use crate::error::{Error, Result};
use crate::testing::inference::parametric::normal_quantile;
use crate::testing::{DEFAULT_ALPHA, TestType, utils, validate_alpha};

pub const DEFAULT_POWER: f64 = 0.8;

/// Baseline description of a continuous metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricSummary {
    /// Summary estimated from historical observations.
    FromSample { mean: f64, std: f64, n: usize },
    /// Summary given directly.
    FromParameters { mean: f64, std: f64 },
}

impl MetricSummary {
    pub fn from_sample(sample: &SampleData) -> Result<Self> {
        if sample.len() < 2 {
            return Err(Error::insufficient(2, sample.len(), "metric summary"));
        }
        let summary = MetricSummary::FromSample {
            mean: utils::mean(sample.data()),
            std: utils::variance(sample.data()).max(0.0).sqrt(),
            n: sample.len(),
        };
        summary.check()?;
        Ok(summary)
    }

    pub fn from_parameters(mean: f64, std: f64) -> Result<Self> {
        let summary = MetricSummary::FromParameters { mean, std };
        summary.check()?;
        Ok(summary)
    }

    pub fn mean(&self) -> f64 {
        match *self {
            MetricSummary::FromSample { mean, .. } | MetricSummary::FromParameters { mean, .. } => {
                mean
            }
        }
    }

    pub fn std(&self) -> f64 {
        match *self {
            MetricSummary::FromSample { std, .. } | MetricSummary::FromParameters { std, .. } => std,
        }
    }

    fn check(&self) -> Result<()> {
        let (mean, std) = (self.mean(), self.std());
        if !mean.is_finite() || !std.is_finite() {
            return Err(Error::Validation(format!(
                "Metric summary must be finite, got mean {} and std {}",
                mean, std
            )));
        }
        if std <= 0.0 {
            return Err(Error::Numerical(format!(
                "Metric standard deviation must be positive, got {}",
                std
            )));
        }
        Ok(())
    }

    /// Absolute effect corresponding to `effect` on the given scale.
    fn absolute(&self, effect: f64, test_type: TestType) -> Result<f64> {
        match test_type {
            TestType::Absolute => Ok(effect),
            TestType::Relative if self.mean() == 0.0 => Err(Error::Numerical(
                "Relative effect is undefined for a zero baseline mean".to_string(),
            )),
            TestType::Relative => Ok(effect * self.mean()),
        }
    }
}

/// Significance level and target power of a planned experiment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerConfig {
    alpha: f64,
    power: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        PowerConfig {
            alpha: DEFAULT_ALPHA,
            power: DEFAULT_POWER,
        }
    }
}

impl PowerConfig {
    pub fn new(alpha: f64, power: f64) -> Result<Self> {
        validate_alpha(alpha)?;
        if !(power > 0.0 && power < 1.0) {
            return Err(Error::Validation(format!(
                "power must lie strictly between 0 and 1, got {}",
                power
            )));
        }
        Ok(PowerConfig { alpha, power })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    /// `z_{1-α/2} + z_{power}`
    fn z_sum(&self) -> Result<f64> {
        Ok(normal_quantile(1.0 - self.alpha / 2.0)? + normal_quantile(self.power)?)
    }
}

fn check_effect(effect: f64) -> Result<()> {
    if !effect.is_finite() || effect == 0.0 {
        return Err(Error::Validation(format!(
            "Effect must be finite and non-zero, got {}",
            effect
        )));
    }
    Ok(())
}

fn check_size(n_per_arm: usize) -> Result<()> {
    if n_per_arm < 2 {
        return Err(Error::insufficient(2, n_per_arm, "planned arm size"));
    }
    Ok(())
}

/// Observations per arm needed to detect `mde` on a continuous metric.
///
/// # Arguments
///
/// * `summary` - Baseline mean and standard deviation of the metric
/// * `mde` - Minimum detectable effect on the `test_type` scale
/// * `test_type` - Whether `mde` is relative to the baseline mean or absolute
/// * `config` - Significance level and target power
///
/// # Returns
///
/// Sample size per arm, rounded up.
///
/// # Example
/// ```
/// use single_experiments::planning::{MetricSummary, PowerConfig, sample_size_means};
/// use single_experiments::testing::TestType;
///
/// let summary = MetricSummary::from_parameters(10.0, 1.0).unwrap();
/// let n = sample_size_means(&summary, 0.05, TestType::Relative, &PowerConfig::default()).unwrap();
/// assert_eq!(n, 63);
/// ```
pub fn sample_size_means(
    summary: &MetricSummary,
    mde: f64,
    test_type: TestType,
    config: &PowerConfig,
) -> Result<usize> {
    check_effect(mde)?;
    let delta = summary.absolute(mde, test_type)?;
    let z = config.z_sum()?;
    let n = 2.0 * (z * summary.std() / delta).powi(2);
    Ok(n.ceil() as usize)
}

/// Smallest effect detectable with `n_per_arm` observations per arm, on the `test_type` scale.
///
/// # Arguments
///
/// * `summary` - Baseline mean and standard deviation of the metric
/// * `n_per_arm` - Planned observations per arm, at least 2
/// * `test_type` - Scale of the returned effect
/// * `config` - Significance level and target power
pub fn mde_means(
    summary: &MetricSummary,
    n_per_arm: usize,
    test_type: TestType,
    config: &PowerConfig,
) -> Result<f64> {
    check_size(n_per_arm)?;
    let delta = config.z_sum()? * summary.std() * (2.0 / n_per_arm as f64).sqrt();
    match test_type {
        TestType::Absolute => Ok(delta),
        TestType::Relative => {
            let unit = summary.absolute(1.0, test_type)?;
            Ok(delta / unit.abs())
        }
    }
}

fn check_rate(rate: f64, what: &str) -> Result<()> {
    if !(rate > 0.0 && rate < 1.0) {
        return Err(Error::Validation(format!(
            "{} must lie strictly between 0 and 1, got {}",
            what, rate
        )));
    }
    Ok(())
}

/// Observations per arm needed to move a conversion rate from `baseline_rate` by `mde`.
///
/// # Arguments
///
/// * `baseline_rate` - Control conversion rate, strictly between 0 and 1
/// * `mde` - Change to detect; the target rate must stay strictly between 0 and 1
/// * `test_type` - Whether `mde` is relative to the baseline rate or absolute
/// * `config` - Significance level and target power
///
/// # Returns
///
/// Trials per arm, rounded up.
pub fn sample_size_proportions(
    baseline_rate: f64,
    mde: f64,
    test_type: TestType,
    config: &PowerConfig,
) -> Result<usize> {
    check_rate(baseline_rate, "Baseline rate")?;
    check_effect(mde)?;
    let target = match test_type {
        TestType::Absolute => baseline_rate + mde,
        TestType::Relative => baseline_rate * (1.0 + mde),
    };
    check_rate(target, "Target rate")?;

    let variance = baseline_rate * (1.0 - baseline_rate) + target * (1.0 - target);
    let z = config.z_sum()?;
    let n = z * z * variance / (target - baseline_rate).powi(2);
    Ok(n.ceil() as usize)
}

/// Smallest detectable change of a conversion rate with `n_per_arm` trials per arm,
/// approximating both arms' variance by the baseline's.
pub fn mde_proportions(
    baseline_rate: f64,
    n_per_arm: usize,
    test_type: TestType,
    config: &PowerConfig,
) -> Result<f64> {
    check_rate(baseline_rate, "Baseline rate")?;
    check_size(n_per_arm)?;
    let variance = 2.0 * baseline_rate * (1.0 - baseline_rate);
    let delta = config.z_sum()? * (variance / n_per_arm as f64).sqrt();
    Ok(match test_type {
        TestType::Absolute => delta,
        TestType::Relative => delta / baseline_rate,
    })
}
