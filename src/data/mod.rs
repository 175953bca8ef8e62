//! Input value types for the comparison engine.
//!
//! A [`SampleData`] is one arm of a continuous metric together with the optional
//! per-observation fields some tests need (covariates for CUPED and ANCOVA, strata
//! for stratified resampling, pair identifiers for paired tests). A
//! [`ProportionData`] is one arm of a binary metric given as counts.
//!
//! Both types are validated when built and are never mutated afterwards.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Axis};

#[derive(Debug, Clone, PartialEq)]
pub struct SampleData {
    data: Vec<f64>,
    covariates: Option<Array2<f64>>,
    strata: Option<Vec<String>>,
    paired_ids: Option<Vec<String>>,
    cluster_ids: Option<Vec<String>>,
    name: Option<String>,
}

impl SampleData {
    /// Create a sample from raw observations. The data must be non-empty and finite.
    pub fn new(data: Vec<f64>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::insufficient(1, 0, "sample data"));
        }
        if let Some(i) = data.iter().position(|v| !v.is_finite()) {
            return Err(Error::Validation(format!(
                "Non-finite observation at index {}: {}",
                i, data[i]
            )));
        }
        Ok(SampleData {
            data,
            covariates: None,
            strata: None,
            paired_ids: None,
            cluster_ids: None,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a single pre-experiment covariate (stored as an `n x 1` matrix).
    pub fn with_covariate(self, covariate: Vec<f64>) -> Result<Self> {
        let n = covariate.len();
        let matrix = Array1::from(covariate).into_shape_with_order((n, 1)).map_err(|e| {
            Error::Configuration(format!("Cannot reshape covariate vector: {}", e))
        })?;
        self.with_covariates(matrix)
    }

    /// Attach one or more covariates, one row per observation.
    pub fn with_covariates(mut self, covariates: Array2<f64>) -> Result<Self> {
        self.check_len("covariates", covariates.nrows())?;
        if covariates.ncols() == 0 {
            return Err(Error::Configuration(
                "Covariate matrix must have at least one column".to_string(),
            ));
        }
        if covariates.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation(
                "Covariates contain non-finite values".to_string(),
            ));
        }
        self.covariates = Some(covariates);
        Ok(self)
    }

    pub fn with_strata<I, S>(mut self, strata: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let strata: Vec<String> = strata.into_iter().map(|s| s.to_string()).collect();
        self.check_len("strata", strata.len())?;
        self.strata = Some(strata);
        Ok(self)
    }

    pub fn with_paired_ids<I, S>(mut self, ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let ids: Vec<String> = ids.into_iter().map(|s| s.to_string()).collect();
        self.check_len("paired_ids", ids.len())?;
        self.paired_ids = Some(ids);
        Ok(self)
    }

    /// Cluster identifiers are carried through slicing but not used by any test yet.
    pub fn with_cluster_ids<I, S>(mut self, ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let ids: Vec<String> = ids.into_iter().map(|s| s.to_string()).collect();
        self.check_len("cluster_ids", ids.len())?;
        self.cluster_ids = Some(ids);
        Ok(self)
    }

    fn check_len(&self, field: &str, len: usize) -> Result<()> {
        if len != self.data.len() {
            return Err(Error::Configuration(format!(
                "Field '{}' has length {} but data has length {}",
                field,
                len,
                self.data.len()
            )));
        }
        Ok(())
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn covariates(&self) -> Option<&Array2<f64>> {
        self.covariates.as_ref()
    }

    pub fn strata(&self) -> Option<&[String]> {
        self.strata.as_deref()
    }

    pub fn paired_ids(&self) -> Option<&[String]> {
        self.paired_ids.as_deref()
    }

    pub fn cluster_ids(&self) -> Option<&[String]> {
        self.cluster_ids.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of covariate columns, zero when no covariates are attached.
    pub fn n_covariates(&self) -> usize {
        self.covariates.as_ref().map_or(0, |c| c.ncols())
    }

    /// Errors with `Configuration` unless covariates are attached; `method` names the caller.
    pub fn require_covariates(&self, method: &str) -> Result<()> {
        if self.covariates.is_none() {
            return Err(Error::Configuration(format!(
                "{} requires covariates on every sample, '{}' has none",
                method,
                self.name().unwrap_or("unnamed")
            )));
        }
        Ok(())
    }

    pub fn require_paired_ids(&self, method: &str) -> Result<()> {
        if self.paired_ids.is_none() {
            return Err(Error::Configuration(format!(
                "{} requires paired_ids on every sample, '{}' has none",
                method,
                self.name().unwrap_or("unnamed")
            )));
        }
        Ok(())
    }

    /// Keep only the observations at `indices`, filtering every optional field in step.
    ///
    /// Returns `InsufficientData` when `indices` is empty since a sample can never be empty.
    pub fn select(&self, indices: &[usize]) -> Result<SampleData> {
        if indices.is_empty() {
            return Err(Error::insufficient(1, 0, "sample selection"));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.data.len()) {
            return Err(Error::Configuration(format!(
                "Selection index {} out of bounds for sample of length {}",
                bad,
                self.data.len()
            )));
        }
        let pick = |v: &Vec<String>| indices.iter().map(|&i| v[i].clone()).collect::<Vec<_>>();
        Ok(SampleData {
            data: indices.iter().map(|&i| self.data[i]).collect(),
            covariates: self.covariates.as_ref().map(|c| c.select(Axis(0), indices)),
            strata: self.strata.as_ref().map(pick),
            paired_ids: self.paired_ids.as_ref().map(pick),
            cluster_ids: self.cluster_ids.as_ref().map(pick),
            name: self.name.clone(),
        })
    }

    /// Same sample with the metric values replaced (used by variance-reduction transforms).
    pub(crate) fn with_replaced_data(&self, data: Vec<f64>) -> Result<SampleData> {
        self.check_len("replacement data", data.len())?;
        let mut out = self.clone();
        out.data = data;
        Ok(out)
    }
}

/// Binary-metric arm given as success counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProportionData {
    successes: u64,
    trials: u64,
    name: Option<String>,
}

impl ProportionData {
    pub fn new(successes: u64, trials: u64) -> Result<Self> {
        if trials == 0 {
            return Err(Error::insufficient(1, 0, "proportion trials"));
        }
        if successes > trials {
            return Err(Error::Configuration(format!(
                "Successes ({}) exceed trials ({})",
                successes, trials
            )));
        }
        Ok(ProportionData {
            successes,
            trials,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    pub fn rate(&self) -> f64 {
        self.successes as f64 / self.trials as f64
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Arms that carry an optional display name, so batch orchestration can label results.
pub trait Named {
    fn label(&self) -> Option<&str>;
}

impl Named for SampleData {
    fn label(&self) -> Option<&str> {
        self.name()
    }
}

impl Named for ProportionData {
    fn label(&self) -> Option<&str> {
        self.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_empty_sample_rejected() {
        let err = SampleData::new(vec![]).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { required: 1, got: 0, .. }));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            SampleData::new(vec![1.0, f64::NAN]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_optional_field_lengths() {
        let s = SampleData::new(vec![1.0, 2.0, 3.0]).unwrap();
        assert!(s.clone().with_covariate(vec![1.0, 2.0]).is_err());
        assert!(s.clone().with_strata(["a", "b"]).is_err());
        assert!(s.clone().with_paired_ids([1, 2]).is_err());
        assert!(s.clone().with_cluster_ids([1, 2, 3, 4]).is_err());

        let s = s
            .with_covariates(array![[1.0, 0.5], [2.0, 0.1], [3.0, 0.7]])
            .unwrap()
            .with_strata(["a", "b", "a"])
            .unwrap();
        assert_eq!(s.n_covariates(), 2);
        assert_eq!(s.strata().unwrap()[2], "a");
    }

    #[test]
    fn test_select_filters_all_fields() {
        let s = SampleData::new(vec![10.0, 20.0, 30.0, 40.0])
            .unwrap()
            .with_covariate(vec![1.0, 2.0, 3.0, 4.0])
            .unwrap()
            .with_paired_ids(["u1", "u2", "u3", "u4"])
            .unwrap()
            .with_name("control");

        let sub = s.select(&[1, 3]).unwrap();
        assert_eq!(sub.data(), &[20.0, 40.0]);
        assert_eq!(sub.covariates().unwrap().column(0).to_vec(), vec![2.0, 4.0]);
        assert_eq!(sub.paired_ids().unwrap(), &["u2".to_string(), "u4".to_string()]);
        assert_eq!(sub.name(), Some("control"));

        assert!(s.select(&[]).is_err());
        assert!(s.select(&[7]).is_err());
    }

    #[test]
    fn test_proportion_invariants() {
        assert!(ProportionData::new(5, 10).is_ok());
        assert!(matches!(ProportionData::new(11, 10), Err(Error::Configuration(_))));
        assert!(ProportionData::new(0, 0).is_err());
        let p = ProportionData::new(25, 100).unwrap().with_name("B");
        assert_eq!(p.rate(), 0.25);
        assert_eq!(p.label(), Some("B"));
    }
}
