use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

pub mod correction;
pub mod effect;
pub mod inference;
pub mod quantile;

pub mod utils;

pub const DEFAULT_ALPHA: f64 = 0.05;

/// How the effect (and its interval) is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestType {
    /// `(treatment - control) / control`, as a fraction.
    #[default]
    Relative,
    /// `treatment - control`, in raw metric units.
    Absolute,
}

impl FromStr for TestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relative" => Ok(TestType::Relative),
            "absolute" => Ok(TestType::Absolute),
            other => Err(Error::Validation(format!("Unknown test_type '{}'", other))),
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestType::Relative => write!(f, "relative"),
            TestType::Absolute => write!(f, "absolute"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TTestType {
    Student, // Equal variance
    #[default]
    Welch, // Unequal variance
}

/// Settings shared by every test: significance level and effect scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestConfig {
    alpha: f64,
    test_type: TestType,
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig {
            alpha: DEFAULT_ALPHA,
            test_type: TestType::default(),
        }
    }
}

impl TestConfig {
    pub fn new(alpha: f64, test_type: TestType) -> Result<Self> {
        validate_alpha(alpha)?;
        Ok(TestConfig { alpha, test_type })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn test_type(&self) -> TestType {
        self.test_type
    }

    /// Copy of this config with per-call overrides applied and validated.
    pub fn overridden(&self, test_type: Option<TestType>, alpha: Option<f64>) -> Result<Self> {
        TestConfig::new(
            alpha.unwrap_or(self.alpha),
            test_type.unwrap_or(self.test_type),
        )
    }
}

pub(crate) fn validate_alpha(alpha: f64) -> Result<()> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(Error::Validation(format!(
            "alpha must lie strictly between 0 and 1, got {}",
            alpha
        )));
    }
    Ok(())
}

/// Position and label of one compared arm.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArmRef {
    pub index: usize,
    pub name: Option<String>,
}

/// Outcome of one pairwise comparison.
///
/// The effect is always "right arm versus left arm": left is the control.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    /// Point estimate of the effect, relative fraction or absolute units
    pub effect: f64,
    /// The p-value of the test, in `[0, 1]`
    pub pvalue: f64,
    /// Whether the null of no effect is rejected at `alpha`
    pub reject: bool,
    pub left_bound: f64,
    pub right_bound: f64,
    pub ci_length: f64,
    pub alpha: f64,
    pub test_type: TestType,
    /// Name of the procedure that produced the result
    pub method: &'static str,
    /// Test statistic (t, z, ...); `None` for resampling tests
    pub statistic: Option<f64>,
    /// Standard error of the effect estimate
    pub standard_error: Option<f64>,
    pub left: ArmRef,
    pub right: ArmRef,
    /// Additional test-specific information
    pub metadata: HashMap<String, f64>,
}

impl TestResult {
    /// Build a result from an effect, p-value and interval.
    ///
    /// # Arguments
    ///
    /// * `method` - Name of the procedure that produced the numbers
    /// * `config` - Scale and significance level the comparison ran with
    /// * `effect` - Point estimate of the treatment effect
    /// * `pvalue` - Two-sided p-value; rounding overshoot past `[0, 1]` is clamped
    /// * `bounds` - Confidence interval as `(left, right)`
    ///
    /// # Returns
    ///
    /// The result with `reject = pvalue < alpha`, or a numerical error when the p-value is
    /// NaN or the bounds are NaN or out of order.
    pub fn new(
        method: &'static str,
        config: &TestConfig,
        effect: f64,
        pvalue: f64,
        bounds: (f64, f64),
    ) -> Result<Self> {
        if pvalue.is_nan() {
            return Err(Error::Numerical(format!("{} produced a NaN p-value", method)));
        }
        let (left_bound, right_bound) = bounds;
        if !(left_bound <= right_bound) {
            return Err(Error::Numerical(format!(
                "{} produced an invalid interval ({}, {})",
                method, left_bound, right_bound
            )));
        }
        let pvalue = pvalue.clamp(0.0, 1.0);
        Ok(TestResult {
            effect,
            pvalue,
            reject: pvalue < config.alpha(),
            left_bound,
            right_bound,
            ci_length: right_bound - left_bound,
            alpha: config.alpha(),
            test_type: config.test_type(),
            method,
            statistic: None,
            standard_error: None,
            left: ArmRef { index: 0, name: None },
            right: ArmRef { index: 1, name: None },
            metadata: HashMap::new(),
        })
    }

    pub fn with_statistic(mut self, statistic: f64) -> Self {
        self.statistic = Some(statistic);
        self
    }

    pub fn with_standard_error(mut self, se: f64) -> Self {
        self.standard_error = Some(se);
        self
    }

    /// Add additional metadata
    pub fn with_metadata(mut self, key: &str, value: f64) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub(crate) fn with_arms(mut self, left: ArmRef, right: ArmRef) -> Self {
        self.left = left;
        self.right = right;
        self
    }

    /// Same result with a corrected p-value. Step procedures reject at the boundary, so
    /// `reject` becomes `adjusted_p <= alpha`.
    pub(crate) fn with_adjusted_pvalue(&self, pvalue: f64) -> Self {
        let mut out = self.clone();
        out.pvalue = pvalue.clamp(0.0, 1.0);
        out.reject = out.pvalue <= out.alpha;
        out
    }

    /// Check if the result is statistically significant at the given threshold
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.pvalue < alpha
    }

    /// Whether `value` lies inside the confidence interval.
    pub fn contains(&self, value: f64) -> bool {
        self.left_bound <= value && value <= self.right_bound
    }

    pub fn metadata(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).copied()
    }
}

/// A [`TestResult`] computed on a quantile slice of the data, or at a quantile level.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileTestResult {
    pub result: TestResult,
    /// Quantile level of the slice cutoff or of the compared quantiles
    pub quantile: f64,
    /// Total observations behind the comparison: both slices, or both full arms for
    /// quantile treatment effects
    pub sample_size: usize,
}

impl Deref for QuantileTestResult {
    type Target = TestResult;

    fn deref(&self) -> &TestResult {
        &self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_parsing() {
        assert_eq!("relative".parse::<TestType>().unwrap(), TestType::Relative);
        assert_eq!(" Absolute ".parse::<TestType>().unwrap(), TestType::Absolute);
        assert!(matches!("ratio".parse::<TestType>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_config_validation() {
        assert!(TestConfig::new(0.05, TestType::Absolute).is_ok());
        assert!(TestConfig::new(0.0, TestType::Absolute).is_err());
        assert!(TestConfig::new(1.0, TestType::Absolute).is_err());
        assert!(TestConfig::new(f64::NAN, TestType::Absolute).is_err());

        let cfg = TestConfig::default();
        let over = cfg.overridden(Some(TestType::Absolute), Some(0.1)).unwrap();
        assert_eq!(over.alpha(), 0.1);
        assert_eq!(over.test_type(), TestType::Absolute);
        assert!(cfg.overridden(None, Some(2.0)).is_err());
    }

    #[test]
    fn test_result_invariants() {
        let cfg = TestConfig::default();
        let r = TestResult::new("t-test", &cfg, 0.1, 1.0 + 1e-12, (-0.1, 0.3)).unwrap();
        assert_eq!(r.left_bound, -0.1);
        assert_eq!(r.right_bound, 0.3);
        assert!((r.ci_length - 0.4).abs() < 1e-12);
        assert_eq!(r.pvalue, 1.0);
        assert!(!r.reject);
        assert!(r.contains(0.0));

        let r = TestResult::new("t-test", &cfg, 0.1, 0.01, (0.05, 0.15)).unwrap();
        assert!(r.reject);
        let adjusted = r.with_adjusted_pvalue(0.2);
        assert!(!adjusted.reject);
        assert_eq!(adjusted.effect, r.effect);
    }

    #[test]
    fn test_result_rejects_broken_inputs() {
        let cfg = TestConfig::default();
        assert!(matches!(
            TestResult::new("t-test", &cfg, 0.1, f64::NAN, (0.0, 0.2)),
            Err(Error::Numerical(_))
        ));
        assert!(matches!(
            TestResult::new("t-test", &cfg, 0.1, 0.5, (0.3, -0.1)),
            Err(Error::Numerical(_))
        ));
        assert!(matches!(
            TestResult::new("t-test", &cfg, 0.1, 0.5, (f64::NAN, 0.2)),
            Err(Error::Numerical(_))
        ));
    }
}
