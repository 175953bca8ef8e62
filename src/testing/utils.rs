use crate::error::{Error, Result};
use single_utilities::traits::FloatOps;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Arithmetic mean. Returns NaN for an empty slice.
pub fn mean<T>(x: &[T]) -> f64
where
    T: FloatOps,
{
    if x.is_empty() {
        return f64::NAN;
    }
    let mut sum = T::zero();
    for &val in x {
        sum += val;
    }
    sum.to_f64().unwrap_or(f64::NAN) / x.len() as f64
}

/// Unbiased sample variance computed in two passes around the mean, which avoids
/// the cancellation of the sum / sum-of-squares formula on large offsets.
pub fn variance<T>(x: &[T]) -> f64
where
    T: FloatOps,
{
    covariance(x, x)
}

/// Unbiased sample covariance. Returns NaN with fewer than two observations.
pub fn covariance<T>(x: &[T], y: &[T]) -> f64
where
    T: FloatOps,
{
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    let mut acc = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        let a = a.to_f64().unwrap_or(f64::NAN);
        let b = b.to_f64().unwrap_or(f64::NAN);
        acc += (a - mx) * (b - my);
    }
    acc / (n - 1) as f64
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    out
}

/// Quantile of already sorted data with linear interpolation between order statistics
/// (position `q * (n - 1)`).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn quantile(values: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted(values), q)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Match observations of two arms by identifier.
///
/// Returns `(index_in_a, index_in_b)` pairs in the order of `a`. Identifiers must be
/// unique within each arm and both arms must carry exactly the same set.
pub fn align_pairs(a_ids: &[String], b_ids: &[String]) -> Result<Vec<(usize, usize)>> {
    let index_b = unique_index(b_ids, "right")?;
    // Duplicate check on the left arm as well.
    unique_index(a_ids, "left")?;

    if a_ids.len() != b_ids.len() {
        return Err(Error::Configuration(format!(
            "Paired arms have different lengths: {} vs {}",
            a_ids.len(),
            b_ids.len()
        )));
    }

    a_ids
        .iter()
        .enumerate()
        .map(|(i, id)| match index_b.get(id.as_str()) {
            Some(&j) => Ok((i, j)),
            None => Err(Error::Configuration(format!(
                "Paired id '{}' has no match in the other arm",
                id
            ))),
        })
        .collect()
}

fn unique_index<'a>(ids: &'a [String], side: &str) -> Result<HashMap<&'a str, usize>> {
    let mut index = HashMap::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        if index.insert(id.as_str(), i).is_some() {
            return Err(Error::Configuration(format!(
                "Duplicate paired id '{}' in {} arm",
                id, side
            )));
        }
    }
    Ok(index)
}

/// Group observation indices by stratum label, strata ordered by first appearance.
pub fn group_by_label(labels: &[String]) -> Vec<Vec<usize>> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        let slot = *position.entry(label.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    groups
}
