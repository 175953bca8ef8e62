use crate::error::{Error, Result};
use crate::testing::TestResult;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Multiple testing correction methods to control for false positives
/// when performing many statistical tests simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMethod {
    Bonferroni,
    Holm,
    BenjaminiHochberg,
    Sidak,
    Hommel,
}

impl CorrectionMethod {
    /// Adjust raw p-values with this method.
    pub fn adjust(&self, p_values: &[f64]) -> Result<Vec<f64>> {
        match self {
            CorrectionMethod::Bonferroni => bonferroni_correction(p_values),
            CorrectionMethod::Holm => holm_bonferroni_correction(p_values),
            CorrectionMethod::BenjaminiHochberg => benjamini_hochberg_correction(p_values),
            CorrectionMethod::Sidak => sidak_correction(p_values),
            CorrectionMethod::Hommel => hommel_correction(p_values),
        }
    }
}

impl FromStr for CorrectionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bonferroni" => Ok(CorrectionMethod::Bonferroni),
            "holm" => Ok(CorrectionMethod::Holm),
            "bh" | "fdr_bh" => Ok(CorrectionMethod::BenjaminiHochberg),
            "sidak" => Ok(CorrectionMethod::Sidak),
            "hommel" => Ok(CorrectionMethod::Hommel),
            other => Err(Error::Validation(format!(
                "Unknown correction method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CorrectionMethod::Bonferroni => "bonferroni",
            CorrectionMethod::Holm => "holm",
            CorrectionMethod::BenjaminiHochberg => "bh",
            CorrectionMethod::Sidak => "sidak",
            CorrectionMethod::Hommel => "hommel",
        };
        f.write_str(name)
    }
}

/// Apply a correction to a batch of test results.
///
/// `output[i]` is `results[i]` with the adjusted p-value and `reject` recomputed
/// against the result's own `alpha`; every other field is carried over. All results
/// must share the same `alpha`.
///
/// # Arguments
///
/// * `results` - Results of one family of comparisons, in any order
/// * `method` - Correction procedure
///
/// # Returns
///
/// Corrected results in input order, with `reject = adjusted_p <= alpha`.
///
/// # Example
/// ```
/// use single_experiments::testing::correction::{adjust_pvalues, CorrectionMethod};
///
/// let adjusted = adjust_pvalues(&[], CorrectionMethod::Holm).unwrap();
/// assert!(adjusted.is_empty());
/// ```
pub fn adjust_pvalues(results: &[TestResult], method: CorrectionMethod) -> Result<Vec<TestResult>> {
    let Some(first) = results.first() else {
        return Ok(Vec::new());
    };
    if let Some(other) = results.iter().find(|r| r.alpha != first.alpha) {
        return Err(Error::Validation(format!(
            "Cannot correct results with different alpha levels ({} and {})",
            first.alpha, other.alpha
        )));
    }

    let p_values: Vec<f64> = results.iter().map(|r| r.pvalue).collect();
    let adjusted = method.adjust(&p_values)?;
    debug!(%method, n_tests = results.len(), "adjusted p-values");

    Ok(results
        .iter()
        .zip(adjusted)
        .map(|(r, p)| r.with_adjusted_pvalue(p))
        .collect())
}

fn validate(p_values: &[f64]) -> Result<()> {
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Validation(format!(
                "Invalid p-value at index {}: {}",
                i, p
            )));
        }
    }
    Ok(())
}

/// Indices of `p_values` in ascending p-value order.
fn ascending_order(p_values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Apply Bonferroni correction to p-values
///
/// Bonferroni correction is a simple but conservative method that multiplies
/// each p-value by the number of tests.
///
/// # Example
/// ```
/// use single_experiments::testing::correction::bonferroni_correction;
///
/// let p_values = vec![0.01, 0.03, 0.05];
/// let adjusted = bonferroni_correction(&p_values).unwrap();
/// assert!((adjusted[0] - 0.03).abs() < 1e-12);
/// ```
pub fn bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;
    let n = p_values.len() as f64;

    // Multiply each p-value by n, capping at 1.0
    Ok(p_values.iter().map(|&p| (p * n).min(1.0)).collect())
}

/// Apply Holm-Bonferroni (step-down) method for controlling family-wise error rate
///
/// The `k`-th smallest p-value is scaled by `n - k + 1` and the adjusted values are
/// made non-decreasing along the sorted order. Uniformly more powerful than Bonferroni.
pub fn holm_bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;
    let n = p_values.len();
    let order = ascending_order(p_values);

    let mut adjusted = vec![0.0; n];
    let mut running_max: f64 = 0.0;
    for (rank, &idx) in order.iter().enumerate() {
        let scaled = (p_values[idx] * (n - rank) as f64).min(1.0);
        running_max = running_max.max(scaled);
        adjusted[idx] = running_max;
    }

    Ok(adjusted)
}

/// Apply Benjamini-Hochberg (BH) procedure for controlling false discovery rate
///
/// The BH procedure controls the false discovery rate (FDR), which is the expected
/// proportion of false positives among all rejected null hypotheses.
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;
    let n = p_values.len();
    let order = ascending_order(p_values);

    let mut adjusted = vec![0.0; n];
    let mut current_min: f64 = 1.0;

    // Process from largest to smallest p-value
    for rank in (0..n).rev() {
        let idx = order[rank];
        let scaled = (p_values[idx] * n as f64 / (rank + 1) as f64).min(1.0);
        current_min = current_min.min(scaled);
        adjusted[idx] = current_min;
    }

    Ok(adjusted)
}

/// Apply Šidák correction: `1 - (1 - p)^n`.
///
/// Exact family-wise control for independent tests, slightly less conservative than
/// Bonferroni.
pub fn sidak_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;
    let n = p_values.len() as i32;
    Ok(p_values
        .iter()
        .map(|&p| (1.0 - (1.0 - p).powi(n)).clamp(0.0, 1.0))
        .collect())
}

/// Apply Hochberg's step-up method for controlling family-wise error rate
pub fn hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;
    let n = p_values.len();
    let order = ascending_order(p_values);

    let mut adjusted = vec![0.0; n];
    let mut current_min: f64 = 1.0;
    for rank in (0..n).rev() {
        let idx = order[rank];
        let scaled = (p_values[idx] * (n - rank) as f64).min(1.0);
        current_min = current_min.min(scaled);
        adjusted[idx] = current_min;
    }

    Ok(adjusted)
}

/// Apply Hommel's closed-testing procedure for controlling family-wise error rate.
///
/// For every subset size `m` the adjusted p-value of a hypothesis is the largest Simes
/// p-value over the intersections containing it; the result is never smaller than the
/// raw p-value. With two tests this coincides with Hochberg.
pub fn hommel_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;
    let n = p_values.len();
    if n <= 1 {
        return Ok(p_values.to_vec());
    }
    if n == 2 {
        return hochberg_correction(p_values);
    }

    let order = ascending_order(p_values);
    let p: Vec<f64> = order.iter().map(|&i| p_values[i]).collect();

    let simes = (0..n)
        .map(|k| n as f64 * p[k] / (k + 1) as f64)
        .fold(f64::INFINITY, f64::min);
    let mut pa = vec![simes; n];
    let mut q = vec![simes; n];

    for m in (2..n).rev() {
        let split = n - m + 1;
        let q1 = (0..m - 1)
            .map(|t| m as f64 * p[split + t] / (t + 2) as f64)
            .fold(f64::INFINITY, f64::min);
        for k in 0..split {
            q[k] = (m as f64 * p[k]).min(q1);
        }
        let carried = q[split - 1];
        for qk in q.iter_mut().skip(split) {
            *qk = carried;
        }
        for (a, &b) in pa.iter_mut().zip(&q) {
            *a = a.max(b);
        }
    }

    let mut adjusted = vec![0.0; n];
    for (rank, &idx) in order.iter().enumerate() {
        adjusted[idx] = pa[rank].max(p[rank]).min(1.0);
    }
    Ok(adjusted)
}
